//! # Charsiu - A Multi-Provider Streaming Chat Bridge
//!
//! Charsiu routes chat requests to one of several incompatible LLM backends,
//! normalizes model identifiers and per-vendor quirks behind one call
//! signature, converts each backend's native response stream into a uniform
//! chunk sequence, and feeds that sequence into a message object that
//! renders incrementally, survives partial failure, and terminates
//! deterministically.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use charsiu::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(InMemoryMessageStore::new());
//!     let bridge = ChatBridge::new(store.clone(), "gpt-4o-mini");
//!
//!     // Returns immediately with the placeholder id; streaming continues
//!     // in the background and the store updates incrementally.
//!     let id = bridge.send("Hello!", &[]).await?;
//!
//!     loop {
//!         if let Some(message) = store.get(id) {
//!             print!("\r{}", message.content);
//!             if !message.streaming {
//!                 break;
//!             }
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`registry`] maps public model names to vendor routing data;
//! - [`router`] resolves names into per-call route contexts and wires
//!   credentials from the environment once;
//! - [`adapter`] opens one vendor streaming call per send and normalizes it
//!   into [`streaming::StreamChunk`]s;
//! - [`session`] owns the in-flight assistant message as an explicit state
//!   machine with debounced store flushes;
//! - [`bridge`] ties the pieces together behind `send`.

pub mod adapter;
pub mod bridge;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;
pub mod streaming;
pub mod types;

mod providers;

// Convenient top-level re-exports
pub use adapter::{ChunkSource, StreamAdapter};
pub use bridge::ChatBridge;
pub use error::BridgeError;
pub use registry::{GatewayVendor, ModelDescriptor, ProviderFamily, ProviderRegistry};
pub use router::{ModelRouter, RouteContext};
pub use session::{ChatStreamSession, InMemoryMessageStore, MessageStore, SessionState};
pub use streaming::{ChunkStream, StreamChunk};
pub use types::{ChatMessage, ChatOptions, MessageId, MessagePatch, MessageRole, StreamingMessage};

/// Common imports for working with the bridge.
pub mod prelude {
    pub use crate::adapter::{ChunkSource, StreamAdapter, DEFAULT_TIMEOUT};
    pub use crate::bridge::ChatBridge;
    pub use crate::error::BridgeError;
    pub use crate::registry::{
        GatewayVendor, ModelDescriptor, ProviderFamily, ProviderRegistry,
    };
    pub use crate::router::{ModelRouter, RouteContext};
    pub use crate::session::{
        ChatStreamSession, InMemoryMessageStore, MessageStore, SessionState, STREAM_DEBOUNCE,
    };
    pub use crate::streaming::{ChunkStream, StreamChunk, PROVIDER_ERROR};
    pub use crate::types::{
        ChatMessage, ChatOptions, MessageId, MessagePatch, MessageRole, StreamingMessage,
    };
}
