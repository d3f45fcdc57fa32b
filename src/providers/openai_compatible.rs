//! OpenAI-compatible wire protocol.
//!
//! Serves every family that speaks the `chat/completions` SSE dialect: the
//! OpenAI-compatible direct vendors, xAI (same protocol at its own API
//! root), and the managed cloud gateway.

use eventsource_stream::Event;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::SseChunkConverter;
use crate::streaming::StreamChunk;
use crate::types::{ChatMessage, ChatOptions};

/// Default API root for OpenAI-compatible direct vendors.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible endpoint of the managed cloud gateway.
pub(crate) const GATEWAY_BASE_URL: &str =
    "https://bedrock-runtime.us-east-1.amazonaws.com/openai/v1";

/// Completion marker on the SSE data channel.
const DONE_MARKER: &str = "[DONE]";

/// Build the streaming request body.
pub(crate) fn request_body(
    endpoint_model: &str,
    messages: &[ChatMessage],
    options: &ChatOptions,
) -> serde_json::Value {
    let mut body = json!({
        "model": endpoint_model,
        "messages": messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect::<Vec<_>>(),
        "stream": true,
    });
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = options.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// Chat-completions stream event structure
#[derive(Debug, Deserialize, Serialize)]
struct CompletionsStreamEvent {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
    #[serde(default)]
    usage: Option<StreamUsage>,
    #[serde(default)]
    error: Option<WireError>,
}

/// Stream choice structure
#[derive(Debug, Deserialize, Serialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Stream delta structure
#[derive(Debug, Deserialize, Serialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Stream usage structure (present on the final data chunk when the vendor
/// reports it)
#[derive(Debug, Deserialize, Serialize)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

/// Error payload some compatible vendors deliver on the data channel.
#[derive(Debug, Deserialize, Serialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    r#type: Option<String>,
}

/// Event converter for the OpenAI-compatible SSE dialect.
#[derive(Debug, Clone, Default)]
pub(crate) struct CompletionsChunkConverter;

impl SseChunkConverter for CompletionsChunkConverter {
    fn convert_event(&self, event: Event) -> Vec<StreamChunk> {
        let data = event.data.trim();
        if data.is_empty() {
            return vec![];
        }
        if data == DONE_MARKER {
            return vec![StreamChunk::End];
        }

        let parsed: CompletionsStreamEvent = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(error) => {
                // Keepalives and vendor extensions may not parse; skip them
                // rather than killing the stream.
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
        for choice in parsed.choices.unwrap_or_default() {
            if let Some(delta) = choice.delta
                && let Some(content) = delta.content
                && !content.is_empty()
            {
                chunks.push(StreamChunk::TextDelta { delta: content });
            }
            if let Some(finish_reason) = choice.finish_reason {
                chunks.push(StreamChunk::metadata_field(
                    "finish_reason",
                    json!(finish_reason),
                ));
            }
        }
        if let Some(usage) = parsed.usage {
            chunks.push(StreamChunk::metadata_field(
                "usage",
                serde_json::to_value(usage).unwrap_or(serde_json::Value::Null),
            ));
        }
        chunks
    }

    fn handle_stream_end(&self) -> StreamChunk {
        // This dialect terminates with an explicit [DONE]; a silent close is
        // an operational fault.
        StreamChunk::provider_error("stream closed before completion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    fn event(data: &str) -> Event {
        Event {
            event: "message".to_string(),
            data: data.to_string(),
            id: String::new(),
            retry: None,
        }
    }

    #[test]
    fn content_delta_converts_to_text_delta() {
        let converter = CompletionsChunkConverter;
        let chunks = converter.convert_event(event(
            r#"{"choices":[{"delta":{"content":"Hello"},"index":0}]}"#,
        ));
        assert_eq!(
            chunks,
            vec![StreamChunk::TextDelta {
                delta: "Hello".into()
            }]
        );
    }

    #[test]
    fn done_marker_is_end_of_stream() {
        let converter = CompletionsChunkConverter;
        assert_eq!(converter.convert_event(event("[DONE]")), vec![StreamChunk::End]);
    }

    #[test]
    fn finish_reason_and_usage_become_metadata() {
        let converter = CompletionsChunkConverter;
        let chunks = converter.convert_event(event(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":5,"total_tokens":8}}"#,
        ));
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], StreamChunk::Metadata { fields } if fields.contains_key("finish_reason")));
        assert!(matches!(&chunks[1], StreamChunk::Metadata { fields } if fields.contains_key("usage")));
    }

    #[test]
    fn error_payload_is_terminal() {
        let converter = CompletionsChunkConverter;
        let chunks =
            converter.convert_event(event(r#"{"error":{"message":"quota exhausted"}}"#));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_terminal());
    }

    #[test]
    fn unparseable_event_is_skipped() {
        let converter = CompletionsChunkConverter;
        assert!(converter.convert_event(event("not json")).is_empty());
    }

    #[test]
    fn silent_close_is_a_provider_error() {
        let converter = CompletionsChunkConverter;
        assert!(matches!(
            converter.handle_stream_end(),
            StreamChunk::Error { .. }
        ));
    }

    #[test]
    fn request_body_includes_roles_and_options() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ];
        let options = ChatOptions::new().with_temperature(0.25).with_max_tokens(64);
        let body = request_body("gpt-4o", &messages, &options);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], MessageRole::User.as_str());
        assert_eq!(body["temperature"], 0.25);
        assert_eq!(body["max_tokens"], 64);
    }

    #[test]
    fn request_body_omits_unset_options() {
        let body = request_body("gpt-4o", &[ChatMessage::user("hi")], &ChatOptions::new());
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }
}
