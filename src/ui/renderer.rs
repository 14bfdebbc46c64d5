use std::time::Instant;

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Wrap},
    Frame,
};

use crate::core::controller::{ChatController, ChatObserver};
use crate::core::message::{ChatMessage, ConversationLog};
use crate::ui::view::ChatView;

const SENDER_PREFIX: &str = "You: ";
const RECEIVER_PREFIX: &str = "Llama: ";
const INPUT_HEIGHT: u16 = 4;

/// Pulse symbol for a response that has not produced any text yet.
pub fn pulse_symbol(started: Instant) -> &'static str {
    let elapsed = started.elapsed().as_millis() as f32 / 1000.0;
    let pulse_phase = (elapsed * 2.0) % 2.0;
    let pulse_intensity = if pulse_phase < 1.0 {
        pulse_phase
    } else {
        2.0 - pulse_phase
    };

    if pulse_intensity < 0.33 {
        "○"
    } else if pulse_intensity < 0.66 {
        "◐"
    } else {
        "●"
    }
}

pub fn build_display_lines(log: &ConversationLog, pulse: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for msg in log.messages() {
        if msg.role.is_sender() {
            let sender_style = Style::default().fg(Color::Magenta);
            let mut text_lines = msg.text().lines();
            lines.push(Line::from(vec![
                Span::styled(SENDER_PREFIX, sender_style.add_modifier(Modifier::BOLD)),
                Span::styled(text_lines.next().unwrap_or_default().to_string(), sender_style),
            ]));
            lines.extend(
                text_lines.map(|line| Line::from(Span::styled(line.to_string(), sender_style))),
            );
        } else {
            push_receiver_lines(&mut lines, msg, pulse);
        }
        lines.push(Line::from(""));
    }

    lines
}

fn push_receiver_lines(lines: &mut Vec<Line<'static>>, msg: &ChatMessage, pulse: &str) {
    let prefix = Span::styled(
        RECEIVER_PREFIX,
        Style::default()
            .fg(Color::LightYellow)
            .add_modifier(Modifier::BOLD),
    );

    let mut text_lines = msg.text().split('\n');
    let first = text_lines.next().unwrap_or_default();
    let mut head = vec![prefix, Span::raw(first.to_string())];
    if msg.text().is_empty() && !msg.is_complete() {
        head.push(Span::styled(
            pulse.to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::from(head));
    lines.extend(text_lines.map(|line| Line::from(line.to_string())));

    if let Some(error) = msg.error() {
        lines.push(Line::from(Span::styled(
            format!("[error: {error}]"),
            Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
        )));
    }
}

pub fn ui<O: ChatObserver>(f: &mut Frame, controller: &ChatController<O>, view: &ChatView) {
    let status_height = u16::from(view.status.is_some());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(status_height),
            Constraint::Length(INPUT_HEIGHT),
        ])
        .split(f.area());

    let lines = if controller.log().is_empty() {
        vec![
            Line::from("Welcome to the chat room!"),
            Line::from("Type a message and press Enter to send."),
        ]
    } else {
        build_display_lines(controller.log(), pulse_symbol(view.pulse_start))
    };

    let config = controller.client().config();
    let title = format!(
        "llamachat v{} - {} @ {}",
        env!("CARGO_PKG_VERSION"),
        config.model,
        config.endpoint
    );

    // Keep the newest output in view; the paragraph wraps, so this only
    // approximates the bottom for long lines.
    let available_height = chunks[0].height.saturating_sub(1);
    let scroll_offset = (lines.len() as u16).saturating_sub(available_height);

    let messages = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset, 0));
    f.render_widget(messages, chunks[0]);

    if let Some(status) = &view.status {
        f.render_widget(
            Paragraph::new(status.as_str()).style(Style::default().fg(Color::Yellow)),
            chunks[1],
        );
    }

    f.render_widget(&view.textarea, chunks[2]);
}
