//! Terminal UI layer for interactive chat sessions.
//!
//! - [`chat_loop`]: terminal setup and the event loop that feeds key presses
//!   to the controller and applies its stream events.
//! - [`renderer`]: frame composition from the conversation log.
//! - [`view`]: presentation-only state (input box, status line, redraw flag).
//!
//! Ownership boundary: this layer presents and captures interaction state, while
//! [`crate::core`] owns the conversation and the streaming pipeline.

pub mod chat_loop;
pub mod renderer;
pub mod view;
