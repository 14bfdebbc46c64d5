use std::time::Instant;

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders};
use tui_textarea::TextArea;

use crate::core::controller::ChatObserver;
use crate::core::stream_client::StreamError;

/// Observer that only remembers that something changed and a frame is due.
#[derive(Debug, Default)]
pub struct RedrawFlag {
    dirty: bool,
}

impl RedrawFlag {
    pub fn request(&mut self) {
        self.dirty = true;
    }

    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

impl ChatObserver for RedrawFlag {
    fn fragment_received(&mut self, _text: &str) {
        self.dirty = true;
    }

    fn message_completed(&mut self) {
        self.dirty = true;
    }

    fn error_occurred(&mut self, _error: &StreamError) {
        self.dirty = true;
    }
}

/// Presentation state that the controller knows nothing about.
pub struct ChatView {
    pub textarea: TextArea<'static>,
    /// One-line notice shown under the transcript, cleared on the next submit.
    pub status: Option<String>,
    pub pulse_start: Instant,
}

impl ChatView {
    pub fn new() -> Self {
        Self {
            textarea: empty_input(),
            status: None,
            pulse_start: Instant::now(),
        }
    }

    pub fn input_text(&self) -> String {
        self.textarea.lines().join("\n")
    }

    /// Empties the input box, keeping its current block and cursor style.
    pub fn clear_input(&mut self) {
        self.textarea.select_all();
        self.textarea.cut();
    }

    /// Restyles the input box for the current focus state.
    pub fn set_focus(&mut self, focused: bool) {
        let (title, border) = if focused {
            ("Type your message (Enter to send, Ctrl+C to quit)", Color::Cyan)
        } else {
            ("Waiting for response (Esc to interrupt, Ctrl+C to quit)", Color::DarkGray)
        };
        self.textarea.set_block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        );
        if focused {
            self.textarea
                .set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        } else {
            self.textarea.set_cursor_style(Style::default());
        }
    }
}

fn empty_input() -> TextArea<'static> {
    let mut textarea = TextArea::default();
    textarea.set_placeholder_text("Send a message...");
    textarea.set_cursor_line_style(Style::default());
    textarea
}

impl Default for ChatView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redraw_flag_is_consumed_once() {
        let mut flag = RedrawFlag::default();
        assert!(!flag.take());

        flag.fragment_received("x");
        assert!(flag.take());
        assert!(!flag.take());

        flag.error_occurred(&StreamError::Cancelled);
        assert!(flag.take());
    }

    #[test]
    fn clear_input_drops_typed_text() {
        let mut view = ChatView::new();
        view.textarea.insert_str("hello");
        assert_eq!(view.input_text(), "hello");

        view.clear_input();
        assert_eq!(view.input_text(), "");
    }
}
