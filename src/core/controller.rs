//! Coordination between user commands and stream events.
//!
//! [`ChatController`] is the only writer of the [`ConversationLog`]. It starts
//! at most one [`StreamSession`] at a time and applies that session's events
//! to the log in the order they arrive, reporting each change to a
//! [`ChatObserver`].

use std::fmt;

use tracing::{debug, warn};

use crate::core::message::{ChatMessage, ConversationLog};
use crate::core::stream_client::{
    SessionState, StreamClient, StreamError, StreamEvent, StreamSession,
};

/// Notifications sent to the presentation layer.
pub trait ChatObserver {
    fn fragment_received(&mut self, _text: &str) {}
    fn message_completed(&mut self) {}
    fn error_occurred(&mut self, _error: &StreamError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChatObserver for NoopObserver {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitRejected {
    EmptyPrompt,
    SessionActive,
    Stopped,
}

impl fmt::Display for SubmitRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitRejected::EmptyPrompt => f.write_str("prompt is empty"),
            SubmitRejected::SessionActive => f.write_str("a response is still streaming"),
            SubmitRejected::Stopped => f.write_str("the chat has been closed"),
        }
    }
}

impl std::error::Error for SubmitRejected {}

pub struct ChatController<O: ChatObserver = NoopObserver> {
    client: StreamClient,
    log: ConversationLog,
    session: Option<StreamSession>,
    last_session_state: SessionState,
    last_error: Option<StreamError>,
    stopped: bool,
    observer: O,
}

impl ChatController<NoopObserver> {
    pub fn new(client: StreamClient) -> Self {
        Self::with_observer(client, NoopObserver)
    }
}

impl<O: ChatObserver> ChatController<O> {
    pub fn with_observer(client: StreamClient, observer: O) -> Self {
        Self {
            client,
            log: ConversationLog::new(),
            session: None,
            last_session_state: SessionState::Idle,
            last_error: None,
            stopped: false,
            observer,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn client(&self) -> &StreamClient {
        &self.client
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the user may submit a new prompt right now.
    pub fn input_enabled(&self) -> bool {
        !self.stopped && self.session.is_none()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    /// State of the active session, or of the last one once it has ended.
    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(self.last_session_state, StreamSession::state)
    }

    /// Starts a new exchange for `prompt`.
    ///
    /// Rejected without touching the log when the prompt is blank, when a
    /// response is still streaming, or after [`ChatController::cancel`].
    pub fn submit(&mut self, prompt: &str) -> Result<(), SubmitRejected> {
        if self.stopped {
            return Err(SubmitRejected::Stopped);
        }
        if prompt.trim().is_empty() {
            return Err(SubmitRejected::EmptyPrompt);
        }
        if self.session.is_some() || self.log.has_pending() {
            return Err(SubmitRejected::SessionActive);
        }

        self.log
            .push(ChatMessage::sender(prompt))
            .and_then(|_| self.log.push(ChatMessage::pending_receiver()))
            .map_err(|_| SubmitRejected::SessionActive)?;

        let session = self.client.start(prompt);
        debug!(
            stream_id = session.id(),
            model = %self.client.config().model,
            "started stream session"
        );
        self.session = Some(session);
        self.last_error = None;
        Ok(())
    }

    /// Waits for the next event of the active session.
    ///
    /// Never resolves while no session is active, so it can sit in a
    /// `select!` next to other event sources.
    pub async fn next_stream_event(&mut self) -> StreamEvent {
        if let Some(session) = self.session.as_mut() {
            if let Some(event) = session.next_event().await {
                return event;
            }
        }
        std::future::pending().await
    }

    pub fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Fragment(text) => self.on_fragment(&text),
            StreamEvent::Completed => self.on_completion(),
            StreamEvent::Failed(err) => self.on_error(err),
        }
    }

    /// Drives the active session until it ends. Returns immediately when
    /// nothing is streaming.
    pub async fn finish_active_session(&mut self) {
        while self.session.is_some() {
            let event = self.next_stream_event().await;
            self.handle_stream_event(event);
        }
    }

    pub fn on_fragment(&mut self, text: &str) {
        if self.log.append_to_pending(text) {
            self.observer.fragment_received(text);
        }
    }

    pub fn on_completion(&mut self) {
        let completed = self.log.complete_pending(None);
        self.release_session(SessionState::Completed);
        if completed {
            self.observer.message_completed();
        }
    }

    pub fn on_error(&mut self, err: StreamError) {
        if err.is_cancelled() {
            self.log.complete_pending(None);
            self.release_session(SessionState::Idle);
            return;
        }

        warn!(error = %err, "stream session failed");
        self.log.complete_pending(Some(err.to_string()));
        self.release_session(SessionState::Failed);
        self.observer.error_occurred(&err);
        self.last_error = Some(err);
    }

    /// Stops the active response, keeping whatever text already arrived.
    /// The controller stays usable.
    pub fn interrupt(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(stream_id = session.id(), "interrupting stream session");
            session.cancel();
            self.log.complete_pending(None);
            self.last_session_state = SessionState::Idle;
        }
    }

    /// Tears down any active session and stops the controller. No event from
    /// the torn-down session is observed afterwards.
    pub fn cancel(&mut self) {
        self.interrupt();
        self.stopped = true;
    }

    fn release_session(&mut self, fallback: SessionState) {
        let state = match self.session.take() {
            Some(session) if session.state().is_terminal() => session.state(),
            _ => fallback,
        };
        self.last_session_state = state;
    }
}
