//! Interactive chat loop.
//!
//! The loop multiplexes three sources with `tokio::select!`: terminal events
//! forwarded by a reader task, events from the controller's active stream
//! session, and a pulse tick while a response is pending. Network I/O never
//! happens on this task; it only applies events and draws.

pub mod lifecycle;

use std::{error::Error, time::Duration};

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tui_textarea::Input as TAInput;

use crate::core::controller::{ChatController, SubmitRejected};
use crate::core::stream_client::{ClientConfig, StreamClient};
use crate::ui::renderer::ui;
use crate::ui::view::{ChatView, RedrawFlag};

use lifecycle::{restore_terminal, setup_terminal, ChatTerminal};

const PULSE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum UiEvent {
    Crossterm(Event),
}

pub type Controller = ChatController<RedrawFlag>;

pub async fn run_chat(config: ClientConfig) -> Result<(), Box<dyn Error>> {
    let client = StreamClient::new(config)?;
    let mut controller = ChatController::with_observer(client, RedrawFlag::default());
    let mut view = ChatView::new();
    view.set_focus(true);

    let mut terminal = setup_terminal()?;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<UiEvent>();
    let event_reader_handle = spawn_event_reader(event_tx);

    let result = event_loop(&mut terminal, &mut controller, &mut view, &mut event_rx).await;

    controller.cancel();
    event_reader_handle.abort();
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut ChatTerminal,
    controller: &mut Controller,
    view: &mut ChatView,
    event_rx: &mut mpsc::UnboundedReceiver<UiEvent>,
) -> Result<(), Box<dyn Error>> {
    let mut pulse = tokio::time::interval(PULSE_INTERVAL);
    pulse.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    controller.observer_mut().request();

    loop {
        if controller.observer_mut().take() {
            terminal.draw(|f| ui(f, controller, view))?;
        }

        if controller.is_stopped() {
            return Ok(());
        }

        let was_streaming = controller.is_streaming();
        tokio::select! {
            stream_event = controller.next_stream_event() => {
                controller.handle_stream_event(stream_event);
            }
            ui_event = event_rx.recv() => match ui_event {
                Some(UiEvent::Crossterm(ev)) => handle_terminal_event(controller, view, ev),
                None => controller.cancel(),
            },
            _ = pulse.tick(), if controller.is_streaming() => {
                controller.observer_mut().request();
            }
        }

        if was_streaming != controller.is_streaming() {
            view.set_focus(controller.input_enabled());
            controller.observer_mut().request();
        }
    }
}

fn handle_terminal_event(controller: &mut Controller, view: &mut ChatView, ev: Event) {
    match ev {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(controller, view, key),
        Event::Resize(_, _) => controller.observer_mut().request(),
        _ => {}
    }
}

fn handle_key(controller: &mut Controller, view: &mut ChatView, key: KeyEvent) {
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            controller.cancel();
        }
        KeyCode::Esc => {
            if controller.is_streaming() {
                controller.interrupt();
            } else {
                controller.cancel();
            }
        }
        KeyCode::Enter if controller.input_enabled() => submit_input(controller, view),
        _ if controller.input_enabled() => {
            if view.textarea.input(TAInput::from(key)) {
                controller.observer_mut().request();
            }
        }
        _ => {}
    }
}

fn submit_input(controller: &mut Controller, view: &mut ChatView) {
    let prompt = view.input_text();
    match controller.submit(&prompt) {
        Ok(()) => {
            view.clear_input();
            view.status = None;
            view.pulse_start = std::time::Instant::now();
        }
        Err(SubmitRejected::EmptyPrompt) => return,
        Err(rejected) => view.status = Some(rejected.to_string()),
    }
    controller.observer_mut().request();
}

fn spawn_event_reader(event_tx: mpsc::UnboundedSender<UiEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(true) = event::poll(Duration::from_millis(10)) {
                match event::read() {
                    Ok(ev) => {
                        if event_tx.send(UiEvent::Crossterm(ev)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        continue;
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }
        }
    })
}
