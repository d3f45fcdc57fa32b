//! Core chat types shared across the bridge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Wire-level role string as vendors expect it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in a conversation.
///
/// Conversation history is passed by value into each adapter call; the bridge
/// never mutates history it did not create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role
    pub role: MessageRole,
    /// Text content
    pub content: String,
}

impl ChatMessage {
    /// Creates a user message
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Creates a system message
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Creates an assistant message
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Opaque message identifier, generator-assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Allocate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The assistant message owned by one in-flight streaming session.
///
/// `content` grows monotonically by append while `streaming` is true. After
/// finalization `streaming` is false and `error` is set iff the stream
/// terminated with an error chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingMessage {
    /// Generator-assigned id
    pub id: MessageId,
    /// Always [`MessageRole::Assistant`]
    pub role: MessageRole,
    /// Accumulated text content
    pub content: String,
    /// Whether the message is still being streamed
    pub streaming: bool,
    /// Human-readable failure description, set on error finalization
    pub error: Option<String>,
}

impl StreamingMessage {
    /// Create the empty placeholder inserted at session start.
    pub fn placeholder(id: MessageId) -> Self {
        Self {
            id,
            role: MessageRole::Assistant,
            content: String::new(),
            streaming: true,
            error: None,
        }
    }
}

/// Partial update applied to a stored message.
///
/// Unset fields leave the stored value unchanged; `append_content` is an
/// append, not a replacement, so repaints only ever see growing content.
#[derive(Debug, Clone, Default)]
pub struct MessagePatch {
    /// Text appended to the stored content
    pub append_content: Option<String>,
    /// New value for the streaming flag
    pub streaming: Option<bool>,
    /// Failure description (error finalization only)
    pub error: Option<String>,
}

impl MessagePatch {
    /// Patch that appends content only.
    pub fn append(delta: impl Into<String>) -> Self {
        Self {
            append_content: Some(delta.into()),
            ..Self::default()
        }
    }

    /// Patch that finalizes the message, optionally with a trailing delta and
    /// an error description.
    pub fn finalize(final_delta: Option<String>, error: Option<String>) -> Self {
        Self {
            append_content: final_delta,
            streaming: Some(false),
            error,
        }
    }
}

/// Per-call generation options.
///
/// A trimmed-down common-parameter set: every field is optional and omitted
/// from vendor request bodies when unset.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum output tokens
    pub max_tokens: Option<u32>,
    /// Bound on the wait for the first byte and between subsequent chunks.
    /// Defaults to [`crate::adapter::DEFAULT_TIMEOUT`] when unset.
    pub timeout: Option<Duration>,
}

impl ChatOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the per-chunk timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn placeholder_starts_empty_and_streaming() {
        let id = MessageId::new();
        let msg = StreamingMessage::placeholder(id);
        assert_eq!(msg.id, id);
        assert!(msg.streaming);
        assert!(msg.content.is_empty());
        assert!(msg.error.is_none());
    }

    #[test]
    fn message_ids_are_unique() {
        assert_ne!(MessageId::new(), MessageId::new());
    }
}
