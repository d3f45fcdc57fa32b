//! Vendor-agnostic stream chunk types.
//!
//! Every provider's native response stream is normalized into a sequence of
//! [`StreamChunk`] values with a strict shape: zero or more `TextDelta` /
//! `Metadata` chunks followed by exactly one terminal chunk (`Error` or
//! `End`), never both, never anything after the terminal.

use std::collections::HashMap;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

/// Error kind carried by terminal error chunks for operational faults
/// (network failure, vendor error response, timeout).
pub const PROVIDER_ERROR: &str = "provider_error";

/// One unit of an incremental streaming response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamChunk {
    /// Incremental text content
    #[serde(rename = "delta")]
    TextDelta {
        /// The incremental text
        delta: String,
    },
    /// Vendor-specific metadata (token usage, finish reason, response ids)
    Metadata {
        /// Metadata fields, keyed by name
        fields: HashMap<String, serde_json::Value>,
    },
    /// Terminal chunk: the stream failed. Operational faults are data, not
    /// exceptions, so the consuming session can always finalize.
    Error {
        /// Human-readable failure description
        message: String,
        /// Fault classification, [`PROVIDER_ERROR`] for operational faults
        kind: String,
    },
    /// Terminal chunk: the stream completed normally.
    End,
}

impl StreamChunk {
    /// Build a provider-error terminal chunk.
    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind: PROVIDER_ERROR.to_string(),
        }
    }

    /// Build a metadata chunk with a single field.
    pub fn metadata_field(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut fields = HashMap::new();
        fields.insert(key.into(), value);
        Self::Metadata { fields }
    }

    /// Whether this chunk terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::End)
    }
}

/// Chunk stream — the uniform interface every adapter call returns.
///
/// One underlying network stream per call; the sequence is not restartable.
/// Dropping the stream before the terminal chunk closes the underlying
/// connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;
