//! Error types for the chat bridge.
//!
//! Errors fall into three buckets with different delivery paths:
//! - Configuration errors (`UnknownModel`, `MissingApiKey`) are raised
//!   synchronously before any network call and are never retried.
//! - Provider/operational faults are *not* surfaced through this type at all;
//!   they travel as a terminal [`StreamChunk::Error`](crate::streaming::StreamChunk)
//!   so the consuming session can always finalize cleanly.
//! - Protocol violations (`InvalidState`) indicate a bug in the caller or the
//!   bridge itself and are raised rather than swallowed.

use thiserror::Error;

/// Main error type for the chat bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The public model name is not present in the provider registry.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A required credential environment variable is unset.
    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    /// General configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An operation was invoked in a state that does not permit it.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid caller-supplied parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Vendor API returned an error response.
    #[error("API error {code}: {message}")]
    ApiError {
        /// HTTP status code
        code: u16,
        /// Error message from the vendor
        message: String,
    },

    /// Stream processing error.
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The vendor did not produce data within the configured timeout.
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Failed to parse a vendor payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl BridgeError {
    /// Whether this error is a configuration/caller mistake (fail-fast class),
    /// as opposed to an operational fault that travels as stream data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownModel(_)
                | Self::MissingApiKey(_)
                | Self::ConfigurationError(_)
                | Self::InvalidParameter(_)
        )
    }

    /// Whether this error indicates a protocol violation (bug), which should
    /// surface loudly during development.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }

    /// HTTP status code, when the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }
}
