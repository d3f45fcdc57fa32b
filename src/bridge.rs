//! Chat bridge: the thin orchestrator tying routing, streaming, and session
//! consumption together.
//!
//! `send` resolves the route and opens the (lazy) chunk sequence first, so
//! configuration errors surface synchronously; it then inserts the
//! placeholder message and hands the sequence to a background task. The
//! caller gets the message id back immediately and renders the placeholder
//! while consumption runs.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{ChunkSource, StreamAdapter};
use crate::error::BridgeError;
use crate::router::ModelRouter;
use crate::session::{ChatStreamSession, MessageStore, STREAM_DEBOUNCE};
use crate::types::{ChatMessage, ChatOptions, MessageId};

/// Multi-provider streaming chat bridge.
pub struct ChatBridge {
    router: ModelRouter,
    source: Arc<dyn ChunkSource>,
    store: Arc<dyn MessageStore>,
    default_model: String,
    debounce: Duration,
}

impl ChatBridge {
    /// Create a bridge over a message store with the builtin router and the
    /// production stream adapter.
    pub fn new(store: Arc<dyn MessageStore>, default_model: impl Into<String>) -> Self {
        Self {
            router: ModelRouter::new(),
            source: Arc::new(StreamAdapter::new()),
            store,
            default_model: default_model.into(),
            debounce: STREAM_DEBOUNCE,
        }
    }

    /// Replace the router (custom registries).
    pub fn with_router(mut self, router: ModelRouter) -> Self {
        self.router = router;
        self
    }

    /// Replace the chunk source (tests, alternative transports).
    pub fn with_source(mut self, source: Arc<dyn ChunkSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the repaint debounce window used by sessions.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The router backing this bridge.
    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Send a prompt against the default model.
    pub async fn send(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<MessageId, BridgeError> {
        self.send_with(prompt, history, None, ChatOptions::default())
            .await
    }

    /// Send a prompt, optionally overriding model and options.
    ///
    /// Returns as soon as the placeholder message is inserted; streaming and
    /// consumption continue in a background task. Configuration errors
    /// (unknown model, missing credential) return synchronously and insert
    /// nothing.
    pub async fn send_with(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<MessageId, BridgeError> {
        let model = model.unwrap_or(&self.default_model);
        let route = self.router.route(model)?;
        let messages = build_context(history, prompt);

        // The chunk sequence is lazy: no network I/O happens until the
        // background task polls it, but configuration errors surface here.
        let chunks = self.source.stream(&route, &messages, &options).await?;

        let session = ChatStreamSession::with_debounce(Arc::clone(&self.store), self.debounce);
        let message_id = session.start().await?;

        tracing::debug!(%message_id, model = %route.descriptor.wire_name, "dispatching chat turn");
        tokio::spawn(async move {
            if let Err(error) = session.consume(message_id, chunks).await {
                // Only protocol violations land here; operational faults
                // already finalized the message as failed.
                tracing::error!(%message_id, %error, "chunk consumption aborted");
            }
        });

        Ok(message_id)
    }
}

/// Assemble the conversation context for one turn.
///
/// Appends the prompt as a user message unless the trailing history entry is
/// already that exact message (double-submission guard for callers that
/// pre-populate history). The in-progress placeholder is never part of the
/// context: it does not exist until after the context is built.
fn build_context(history: &[ChatMessage], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = history.to_vec();
    let duplicate = messages
        .last()
        .is_some_and(|last| last.role == crate::types::MessageRole::User && last.content == prompt);
    if !duplicate {
        messages.push(ChatMessage::user(prompt));
    }
    messages
}
