//! Stream adapter: one vendor streaming call per invocation, normalized to a
//! vendor-agnostic chunk sequence.
//!
//! Operational faults (connect failure, non-2xx status, mid-stream failure,
//! timeout) are delivered as a single terminal error chunk, never as a
//! post-return `Err`: from the caller's point of view provider failures are
//! data. Programmer errors (missing credential, malformed arguments) raise
//! synchronously before any network call.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use crate::error::BridgeError;
use crate::providers::anthropic::{self, MessagesChunkConverter};
use crate::providers::gemini::{self, GenerateContentChunkConverter};
use crate::providers::openai_compatible::{self, CompletionsChunkConverter};
use crate::providers::SseChunkConverter;
use crate::registry::ProviderFamily;
use crate::router::RouteContext;
use crate::streaming::{ChunkStream, StreamChunk};
use crate::types::{ChatMessage, ChatOptions};

/// Default bound on the wait for the first byte and between chunks.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of vendor-agnostic chunk sequences.
///
/// The seam between orchestration and vendor I/O: [`StreamAdapter`] is the
/// production implementation; tests substitute scripted sources.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Open one vendor streaming call and return its chunk sequence.
    ///
    /// The sequence is not restartable; dropping it before the terminal
    /// chunk closes the underlying network resource.
    async fn stream(
        &self,
        route: &RouteContext,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChunkStream, BridgeError>;
}

/// Production chunk source speaking each vendor's native streaming protocol.
///
/// Stateless across calls: base URLs and credentials are resolved per call
/// from the [`RouteContext`], so concurrent calls to different vendors share
/// no mutable state.
#[derive(Debug, Clone, Default)]
pub struct StreamAdapter {
    http_client: reqwest::Client,
}

impl StreamAdapter {
    /// Create an adapter with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an adapter over a caller-supplied HTTP client.
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    fn credential(route: &RouteContext) -> Result<SecretString, BridgeError> {
        match std::env::var(route.credential_env_var) {
            Ok(key) if !key.is_empty() => Ok(SecretString::from(key)),
            _ => Err(BridgeError::MissingApiKey(format!(
                "set {} (or the generic {}) to call {} models",
                route.credential_env_var,
                crate::router::GENERIC_API_KEY_ENV,
                route.descriptor.family,
            ))),
        }
    }

    /// Base URL for this call: the per-call override when present, otherwise
    /// the family default.
    fn base_url(route: &RouteContext) -> String {
        if let Some(override_url) = &route.base_url_override {
            return override_url.trim_end_matches('/').to_string();
        }
        let default = match route.descriptor.family {
            ProviderFamily::OpenAiCompatible => openai_compatible::DEFAULT_BASE_URL,
            ProviderFamily::CloudGateway => openai_compatible::GATEWAY_BASE_URL,
            // The router attaches an override for xAI; this arm only serves
            // hand-built route contexts.
            ProviderFamily::Xai => crate::router::XAI_BASE_URL,
            ProviderFamily::Anthropic => anthropic::DEFAULT_BASE_URL,
            ProviderFamily::Gemini => gemini::DEFAULT_BASE_URL,
        };
        default.to_string()
    }

    fn build_request(
        &self,
        route: &RouteContext,
        messages: &[ChatMessage],
        options: &ChatOptions,
        credential: &SecretString,
    ) -> reqwest::RequestBuilder {
        let base_url = Self::base_url(route);
        let endpoint_model = route.descriptor.endpoint_model();

        match route.descriptor.family {
            ProviderFamily::Anthropic => self
                .http_client
                .post(format!("{base_url}/v1/messages"))
                .header("x-api-key", credential.expose_secret())
                .header("anthropic-version", anthropic::API_VERSION)
                .json(&anthropic::request_body(endpoint_model, messages, options)),
            ProviderFamily::Gemini => self
                .http_client
                .post(format!("{base_url}{}", gemini::stream_path(endpoint_model)))
                .query(&[("alt", "sse")])
                .header("x-goog-api-key", credential.expose_secret())
                .json(&gemini::request_body(messages, options)),
            // OpenAI-compatible dialect: direct vendors, xAI, and the cloud
            // gateway differ only in base URL and credential.
            ProviderFamily::OpenAiCompatible
            | ProviderFamily::Xai
            | ProviderFamily::CloudGateway => self
                .http_client
                .post(format!("{base_url}/chat/completions"))
                .bearer_auth(credential.expose_secret())
                .json(&openai_compatible::request_body(
                    endpoint_model,
                    messages,
                    options,
                )),
        }
    }
}

#[async_trait]
impl ChunkSource for StreamAdapter {
    async fn stream(
        &self,
        route: &RouteContext,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChunkStream, BridgeError> {
        if messages.is_empty() {
            return Err(BridgeError::InvalidParameter(
                "conversation context must not be empty".to_string(),
            ));
        }

        // Configuration errors fail fast, before any network call.
        let credential = Self::credential(route)?;
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let request = self.build_request(route, messages, options, &credential);

        tracing::debug!(
            model = %route.descriptor.wire_name,
            family = %route.descriptor.family,
            "opening provider stream"
        );

        let stream = match route.descriptor.family {
            ProviderFamily::Anthropic => {
                sse_chunk_stream(request, MessagesChunkConverter, timeout)
            }
            ProviderFamily::Gemini => {
                sse_chunk_stream(request, GenerateContentChunkConverter, timeout)
            }
            ProviderFamily::OpenAiCompatible
            | ProviderFamily::Xai
            | ProviderFamily::CloudGateway => {
                sse_chunk_stream(request, CompletionsChunkConverter, timeout)
            }
        };
        Ok(stream)
    }
}

/// Drive a streaming HTTP request through a converter, guaranteeing the
/// chunk-sequence shape: zero or more data chunks, exactly one terminal,
/// nothing after it.
fn sse_chunk_stream<C>(
    request: reqwest::RequestBuilder,
    converter: C,
    timeout: Duration,
) -> ChunkStream
where
    C: SseChunkConverter + 'static,
{
    let stream = async_stream::stream! {
        let response = match tokio::time::timeout(timeout, request.send()).await {
            Err(_) => {
                yield StreamChunk::provider_error(format!(
                    "no response within {timeout:?}"
                ));
                return;
            }
            Ok(Err(error)) => {
                yield StreamChunk::provider_error(format!("request failed: {error}"));
                return;
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "provider returned an error status");
            yield StreamChunk::provider_error(format!(
                "provider returned HTTP {}: {}",
                status.as_u16(),
                body.trim()
            ));
            return;
        }

        // eventsource-stream handles UTF-8 boundaries, line buffering, and
        // SSE framing; dropping `events` closes the connection.
        let mut events = response.bytes_stream().eventsource();
        loop {
            match tokio::time::timeout(timeout, events.next()).await {
                Err(_) => {
                    yield StreamChunk::provider_error(format!(
                        "timed out waiting for the next chunk after {timeout:?}"
                    ));
                    return;
                }
                Ok(None) => {
                    yield converter.handle_stream_end();
                    return;
                }
                Ok(Some(Err(error))) => {
                    yield StreamChunk::provider_error(format!("stream failed: {error}"));
                    return;
                }
                Ok(Some(Ok(event))) => {
                    for chunk in converter.convert_event(event) {
                        let terminal = chunk.is_terminal();
                        yield chunk;
                        if terminal {
                            return;
                        }
                    }
                }
            }
        }
    };
    Box::pin(stream)
}
