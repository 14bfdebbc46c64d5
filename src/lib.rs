//! llamachat is a terminal chat client for a locally hosted LLM inference
//! server.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation log, the streaming HTTP client and the
//!   controller that connects them.
//! - [`ui`] renders the terminal interface and runs the interactive event loop.
//! - [`cli`] parses arguments, resolves configuration and picks a mode.
//! - [`utils`] holds diagnostics setup.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
