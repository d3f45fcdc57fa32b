//! Client-side streaming session: owns one in-flight assistant message.
//!
//! The session is an explicit state machine (`Idle → Streaming → Finalized`)
//! over a message store. Text deltas accumulate in a pending buffer and are
//! flushed to the store on a debounced schedule, so upstream chunk bursts
//! coalesce into one store mutation per window instead of one per delta.
//! Finalization flushes synchronously: no stale partial render can survive a
//! finished stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::error::BridgeError;
use crate::streaming::{ChunkStream, StreamChunk};
use crate::types::{MessageId, MessagePatch, StreamingMessage};

/// Debounce window for store flushes during streaming.
pub const STREAM_DEBOUNCE: Duration = Duration::from_millis(50);

/// Message placed when a stream produces no terminal chunk at all.
const NO_RESPONSE_ERROR: &str = "no response from provider";

/// Store holding the messages a session renders into.
///
/// Modeled after a UI-side reactive map: synchronous methods with interior
/// mutability. The session serializes all writes for a given message id.
pub trait MessageStore: Send + Sync {
    /// Insert a new message.
    fn insert(&self, message: StreamingMessage);

    /// Apply a partial update to an existing message.
    fn update(&self, id: MessageId, patch: MessagePatch) -> Result<(), BridgeError>;

    /// Fetch a message by id.
    fn get(&self, id: MessageId) -> Option<StreamingMessage>;
}

/// In-memory message store, the default collaborator.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: StdMutex<HashMap<MessageId, StreamingMessage>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.lock().expect("store lock").len()
    }

    /// Whether the store holds no messages.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageStore for InMemoryMessageStore {
    fn insert(&self, message: StreamingMessage) {
        self.messages
            .lock()
            .expect("store lock")
            .insert(message.id, message);
    }

    fn update(&self, id: MessageId, patch: MessagePatch) -> Result<(), BridgeError> {
        let mut messages = self.messages.lock().expect("store lock");
        let message = messages.get_mut(&id).ok_or_else(|| {
            BridgeError::InternalError(format!("update for unknown message id {id}"))
        })?;
        if let Some(delta) = patch.append_content {
            message.content.push_str(&delta);
        }
        if let Some(streaming) = patch.streaming {
            message.streaming = streaming;
        }
        if let Some(error) = patch.error {
            message.error = Some(error);
        }
        Ok(())
    }

    fn get(&self, id: MessageId) -> Option<StreamingMessage> {
        self.messages.lock().expect("store lock").get(&id).cloned()
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Finalized,
}

struct SessionInner {
    state: SessionState,
    message_id: Option<MessageId>,
    pending: String,
    flush_scheduled: bool,
    metadata: HashMap<String, serde_json::Value>,
}

/// State machine driving one in-flight assistant message.
///
/// Single-use: `start` transitions Idle → Streaming exactly once, and after
/// `finish`/`fail` the session stays Finalized. At most one message with
/// `streaming == true` exists per session instance.
pub struct ChatStreamSession {
    store: Arc<dyn MessageStore>,
    debounce: Duration,
    inner: Arc<Mutex<SessionInner>>,
}

impl ChatStreamSession {
    /// Create a session over a store with the default debounce window.
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self::with_debounce(store, STREAM_DEBOUNCE)
    }

    /// Create a session with a custom debounce window. A zero window flushes
    /// every append synchronously.
    pub fn with_debounce(store: Arc<dyn MessageStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                message_id: None,
                pending: String::new(),
                flush_scheduled: false,
                metadata: HashMap::new(),
            })),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Metadata recorded from the stream so far (token usage, finish
    /// reason, response ids).
    pub async fn metadata(&self) -> HashMap<String, serde_json::Value> {
        self.inner.lock().await.metadata.clone()
    }

    /// Allocate a fresh message id and insert the streaming placeholder.
    ///
    /// Valid only in Idle; calling `start` on a session that is already
    /// streaming (or finished) is a contract violation.
    pub async fn start(&self) -> Result<MessageId, BridgeError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Idle {
            return Err(BridgeError::InvalidState(format!(
                "start called in {:?} state",
                inner.state
            )));
        }
        let id = MessageId::new();
        self.store.insert(StreamingMessage::placeholder(id));
        inner.state = SessionState::Streaming;
        inner.message_id = Some(id);
        Ok(id)
    }

    /// Append a text delta to the in-flight message.
    ///
    /// The delta lands in the pending buffer; a debounced flush applies one
    /// coalesced store update per window.
    pub async fn append(&self, id: MessageId, delta: &str) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        self.check_streaming(&inner, id, "append")?;
        inner.pending.push_str(delta);

        if self.debounce.is_zero() {
            return self.flush_locked(&mut inner);
        }
        if !inner.flush_scheduled {
            inner.flush_scheduled = true;
            let session_inner = Arc::clone(&self.inner);
            let store = Arc::clone(&self.store);
            let debounce = self.debounce;
            tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let mut inner = session_inner.lock().await;
                inner.flush_scheduled = false;
                // Finalization already flushed and owns the terminal update.
                if inner.state != SessionState::Streaming || inner.pending.is_empty() {
                    return;
                }
                let Some(id) = inner.message_id else {
                    return;
                };
                let pending = std::mem::take(&mut inner.pending);
                if let Err(error) = store.update(id, MessagePatch::append(pending)) {
                    tracing::warn!(%error, "debounced flush failed");
                }
            });
        }
        Ok(())
    }

    /// Finalize the message successfully, applying an optional trailing
    /// delta and flushing any pending content immediately.
    pub async fn finish(
        &self,
        id: MessageId,
        final_delta: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.finalize(id, final_delta, None).await
    }

    /// Finalize the message as failed; `error` becomes the user-visible
    /// failure description. Partial content already appended is preserved.
    pub async fn fail(&self, id: MessageId, error: &str) -> Result<(), BridgeError> {
        self.finalize(id, None, Some(error.to_string())).await
    }

    /// Drive the whole state machine from an adapter's chunk sequence.
    ///
    /// Routes text deltas to `append`, records metadata, and finalizes on
    /// the terminal chunk. Exactly one of `finish`/`fail` runs, exactly
    /// once, even for an empty sequence (implicit failure): a session is
    /// never left streaming.
    pub async fn consume(
        &self,
        id: MessageId,
        mut chunks: ChunkStream,
    ) -> Result<(), BridgeError> {
        while let Some(chunk) = chunks.next().await {
            match chunk {
                StreamChunk::TextDelta { delta } => self.append(id, &delta).await?,
                StreamChunk::Metadata { fields } => {
                    let mut inner = self.inner.lock().await;
                    self.check_streaming(&inner, id, "metadata")?;
                    inner.metadata.extend(fields);
                }
                StreamChunk::Error { message, kind } => {
                    tracing::debug!(%kind, "stream terminated with error chunk");
                    return self.fail(id, &message).await;
                }
                StreamChunk::End => return self.finish(id, None).await,
            }
        }
        // The sequence ran dry without a terminal chunk; finalize as a
        // failure so the session cannot leak in Streaming state.
        tracing::warn!("chunk sequence ended without a terminal chunk");
        self.fail(id, NO_RESPONSE_ERROR).await
    }

    fn check_streaming(
        &self,
        inner: &SessionInner,
        id: MessageId,
        operation: &str,
    ) -> Result<(), BridgeError> {
        if inner.state != SessionState::Streaming {
            return Err(BridgeError::InvalidState(format!(
                "{operation} called in {:?} state",
                inner.state
            )));
        }
        if inner.message_id != Some(id) {
            return Err(BridgeError::InvalidState(format!(
                "{operation} called with foreign message id {id}"
            )));
        }
        Ok(())
    }

    fn flush_locked(&self, inner: &mut SessionInner) -> Result<(), BridgeError> {
        if inner.pending.is_empty() {
            return Ok(());
        }
        let Some(id) = inner.message_id else {
            return Ok(());
        };
        let pending = std::mem::take(&mut inner.pending);
        self.store.update(id, MessagePatch::append(pending))
    }

    async fn finalize(
        &self,
        id: MessageId,
        final_delta: Option<&str>,
        error: Option<String>,
    ) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        self.check_streaming(&inner, id, "finalize")?;

        if let Some(delta) = final_delta {
            inner.pending.push_str(delta);
        }
        let pending = std::mem::take(&mut inner.pending);
        let trailing = if pending.is_empty() {
            None
        } else {
            Some(pending)
        };
        self.store
            .update(id, MessagePatch::finalize(trailing, error))?;
        inner.state = SessionState::Finalized;
        Ok(())
    }
}
