use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only message history.
///
/// The only message that may change after it is pushed is the assistant reply
/// currently being streamed; [`Conversation::finish_streaming`] freezes it.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    streaming: Option<usize>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) -> usize {
        self.finish_streaming();
        self.messages.push(ConversationMessage::new(role, text));
        self.messages.len() - 1
    }

    /// Append a streamed delta to the in-progress assistant message, creating
    /// it on the first delta.
    pub fn append_streaming(&mut self, delta: &str) {
        match self.streaming {
            Some(index) => {
                if let Some(message) = self.messages.get_mut(index) {
                    message.text.push_str(delta);
                }
            }
            None => {
                self.messages
                    .push(ConversationMessage::new(Role::Assistant, delta));
                self.streaming = Some(self.messages.len() - 1);
            }
        }
    }

    /// Freeze the in-progress assistant message, returning it if one existed.
    pub fn finish_streaming(&mut self) -> Option<&ConversationMessage> {
        let index = self.streaming.take()?;
        self.messages.get(index)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_deltas_extend_a_single_assistant_message() {
        let mut conversation = Conversation::new();
        conversation.push(Role::User, "hi");
        conversation.append_streaming("Hel");
        conversation.append_streaming("lo");

        assert_eq!(conversation.len(), 2);
        assert!(conversation.is_streaming());
        let finished = conversation.finish_streaming().expect("streamed message");
        assert_eq!(finished.role, Role::Assistant);
        assert_eq!(finished.text, "Hello");
        assert!(!conversation.is_streaming());
    }

    #[test]
    fn pushing_freezes_the_streamed_message() {
        let mut conversation = Conversation::new();
        conversation.append_streaming("first");
        conversation.push(Role::System, "note");
        conversation.append_streaming("second");

        let texts: Vec<_> = conversation
            .messages()
            .iter()
            .map(|m| (m.role, m.text.as_str()))
            .collect();
        assert_eq!(
            texts,
            vec![
                (Role::Assistant, "first"),
                (Role::System, "note"),
                (Role::Assistant, "second"),
            ]
        );
    }

    #[test]
    fn finish_without_stream_is_none() {
        let mut conversation = Conversation::new();
        conversation.push(Role::User, "question");
        assert!(conversation.finish_streaming().is_none());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).expect("serialize");
        assert_eq!(json, "\"assistant\"");
        assert_eq!(Role::System.to_string(), "system");
    }
}
