use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn is_sender(self) -> bool {
        self == Role::Sender
    }

    pub fn is_receiver(self) -> bool {
        self == Role::Receiver
    }
}

/// One entry of the conversation.
///
/// A message stays mutable until [`ChatMessage::complete`] is set; after that
/// both its text and its error marker are frozen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    text: String,
    complete: bool,
    error: Option<String>,
}

impl ChatMessage {
    pub fn sender(text: impl Into<String>) -> Self {
        Self {
            role: Role::Sender,
            text: text.into(),
            complete: true,
            error: None,
        }
    }

    pub fn pending_receiver() -> Self {
        Self {
            role: Role::Receiver,
            text: String::new(),
            complete: false,
            error: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Inline error marker shown after any partial text.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn append(&mut self, fragment: &str) -> bool {
        if self.complete {
            return false;
        }
        self.text.push_str(fragment);
        true
    }

    fn finish(&mut self, error: Option<String>) -> bool {
        if self.complete {
            return false;
        }
        self.complete = true;
        self.error = error;
        true
    }
}

/// Error returned when an append would break the single-incomplete invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessageExists;

impl fmt::Display for PendingMessageExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an incomplete message is still being streamed")
    }
}

impl std::error::Error for PendingMessageExists {}

/// Ordered conversation history.
///
/// At most one message is incomplete at a time, and it is always the last one.
#[derive(Debug, Default, Clone)]
pub struct ConversationLog {
    messages: Vec<ChatMessage>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn has_pending(&self) -> bool {
        self.pending().is_some()
    }

    pub fn pending(&self) -> Option<&ChatMessage> {
        self.messages.last().filter(|msg| !msg.complete)
    }

    pub fn push(&mut self, message: ChatMessage) -> Result<(), PendingMessageExists> {
        if self.has_pending() {
            return Err(PendingMessageExists);
        }
        self.messages.push(message);
        Ok(())
    }

    /// Appends to the in-progress message. Returns `false` when none exists.
    pub fn append_to_pending(&mut self, fragment: &str) -> bool {
        self.messages
            .last_mut()
            .is_some_and(|msg| msg.append(fragment))
    }

    /// Marks the in-progress message complete. Returns `false` when none exists.
    pub fn complete_pending(&mut self, error: Option<String>) -> bool {
        self.messages
            .last_mut()
            .is_some_and(|msg| msg.finish(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_refuses_while_pending() {
        let mut log = ConversationLog::new();
        log.push(ChatMessage::sender("hi")).unwrap();
        log.push(ChatMessage::pending_receiver()).unwrap();

        assert_eq!(
            log.push(ChatMessage::sender("again")),
            Err(PendingMessageExists)
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn completed_message_refuses_further_text() {
        let mut log = ConversationLog::new();
        log.push(ChatMessage::pending_receiver()).unwrap();
        assert!(log.append_to_pending("partial"));
        assert!(log.complete_pending(None));

        assert!(!log.append_to_pending(" more"));
        assert!(!log.complete_pending(Some("late".into())));

        let last = log.last().expect("message");
        assert_eq!(last.text(), "partial");
        assert!(last.is_complete());
        assert_eq!(last.error(), None);
        assert!(!log.has_pending());
    }

    #[test]
    fn sender_messages_are_born_complete() {
        let mut log = ConversationLog::new();
        log.push(ChatMessage::sender("hello")).unwrap();

        assert!(!log.append_to_pending("x"));
        assert_eq!(log.messages()[0].text(), "hello");
        assert!(log.messages()[0].role.is_sender());
    }

    #[test]
    fn error_marker_is_kept_beside_partial_text() {
        let mut log = ConversationLog::new();
        log.push(ChatMessage::pending_receiver()).unwrap();
        log.append_to_pending("Hi");
        log.complete_pending(Some("connection reset".into()));

        let last = log.last().unwrap();
        assert_eq!(last.text(), "Hi");
        assert_eq!(last.error(), Some("connection reset"));
    }
}
