//! Gemini `streamGenerateContent` wire protocol.
//!
//! Gemini streams SSE-framed JSON objects (`alt=sse`) and has no explicit
//! completion marker: the server closing the stream is the completion
//! signal.

use eventsource_stream::Event;
use serde::Deserialize;
use serde_json::json;

use super::SseChunkConverter;
use crate::streaming::StreamChunk;
use crate::types::{ChatMessage, ChatOptions, MessageRole};

/// Default API root.
pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Streaming endpoint path for a model, relative to the base URL.
pub(crate) fn stream_path(endpoint_model: &str) -> String {
    format!("/v1beta/models/{endpoint_model}:streamGenerateContent")
}

/// Build the streaming request body.
///
/// Gemini has no system role in `contents`; system messages become the
/// `systemInstruction` field, and the assistant role maps to `model`.
pub(crate) fn request_body(messages: &[ChatMessage], options: &ChatOptions) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }

    let mut generation_config = serde_json::Map::new();
    if let Some(temperature) = options.temperature {
        generation_config.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(max_tokens) = options.max_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
    }
    if !generation_config.is_empty() {
        body["generationConfig"] = serde_json::Value::Object(generation_config);
    }
    body
}

/// Stream response structure
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Option<Vec<Candidate>>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    message: Option<String>,
}

/// Event converter for the Gemini SSE dialect.
#[derive(Debug, Clone, Default)]
pub(crate) struct GenerateContentChunkConverter;

impl SseChunkConverter for GenerateContentChunkConverter {
    fn convert_event(&self, event: Event) -> Vec<StreamChunk> {
        let data = event.data.trim();
        if data.is_empty() {
            return vec![];
        }

        let parsed: GenerateContentResponse = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(%error, "skipping unparseable stream event");
                return vec![];
            }
        };

        if let Some(error) = parsed.error {
            let message = error
                .message
                .unwrap_or_else(|| "provider returned an error payload".to_string());
            return vec![StreamChunk::provider_error(message)];
        }

        let mut chunks = Vec::new();
        for candidate in parsed.candidates.unwrap_or_default() {
            for part in candidate
                .content
                .and_then(|c| c.parts)
                .unwrap_or_default()
            {
                if let Some(text) = part.text
                    && !text.is_empty()
                {
                    chunks.push(StreamChunk::TextDelta { delta: text });
                }
            }
            if let Some(finish_reason) = candidate.finish_reason {
                chunks.push(StreamChunk::metadata_field(
                    "finish_reason",
                    json!(finish_reason),
                ));
            }
        }
        if let Some(usage) = parsed.usage_metadata {
            chunks.push(StreamChunk::metadata_field("usage", usage));
        }
        chunks
    }

    fn handle_stream_end(&self) -> StreamChunk {
        // Stream close is the completion signal for this dialect.
        StreamChunk::End
    }
}
