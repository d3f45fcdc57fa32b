//! Anthropic Messages wire protocol.

use eventsource_stream::Event;
use serde::Deserialize;
use serde_json::json;

use super::SseChunkConverter;
use crate::streaming::StreamChunk;
use crate::types::{ChatMessage, ChatOptions, MessageRole};

/// Default API root.
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
pub(crate) const API_VERSION: &str = "2023-06-01";

/// The Messages API requires an output cap on every request.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Build the streaming request body.
///
/// System messages are extracted into the top-level `system` field; the
/// Messages API rejects them inside the `messages` array.
pub(crate) fn request_body(
    endpoint_model: &str,
    messages: &[ChatMessage],
    options: &ChatOptions,
) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let turns: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": endpoint_model,
        "messages": turns,
        "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": true,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    if let Some(temperature) = options.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

/// Messages stream event structure; flexible across the event types the SSE
/// channel multiplexes.
#[derive(Debug, Deserialize)]
struct MessagesStreamEvent {
    r#type: String,
    #[serde(default)]
    message: Option<MessageStart>,
    #[serde(default)]
    delta: Option<MessagesDelta>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
    #[serde(default)]
    error: Option<MessagesError>,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct MessagesDelta {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct MessagesError {
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Event converter for the Messages SSE dialect.
#[derive(Debug, Clone, Default)]
pub(crate) struct MessagesChunkConverter;

impl SseChunkConverter for MessagesChunkConverter {
    fn convert_event(&self, event: Event) -> Vec<StreamChunk> {
        let data = event.data.trim();
        if data.is_empty() {
            return vec![];
        }

        let parsed: MessagesStreamEvent = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(%error, "skipping unparseable stream event");
                return vec![];
            }
        };

        match parsed.r#type.as_str() {
            "message_start" => {
                let Some(message) = parsed.message else {
                    return vec![];
                };
                let mut fields = std::collections::HashMap::new();
                fields.insert(
                    "created".to_string(),
                    json!(chrono::Utc::now().to_rfc3339()),
                );
                if let Some(id) = message.id {
                    fields.insert("response_id".to_string(), json!(id));
                }
                if let Some(model) = message.model {
                    fields.insert("model".to_string(), json!(model));
                }
                if let Some(usage) = message.usage {
                    fields.insert(
                        "usage".to_string(),
                        serde_json::to_value(usage).unwrap_or(serde_json::Value::Null),
                    );
                }
                vec![StreamChunk::Metadata { fields }]
            }
            "content_block_delta" => match parsed.delta.and_then(|d| d.text) {
                Some(text) if !text.is_empty() => vec![StreamChunk::TextDelta { delta: text }],
                _ => vec![],
            },
            "message_delta" => {
                let mut chunks = Vec::new();
                if let Some(stop_reason) = parsed.delta.and_then(|d| d.stop_reason) {
                    chunks.push(StreamChunk::metadata_field(
                        "stop_reason",
                        json!(stop_reason),
                    ));
                }
                if let Some(usage) = parsed.usage {
                    chunks.push(StreamChunk::metadata_field(
                        "usage",
                        serde_json::to_value(usage).unwrap_or(serde_json::Value::Null),
                    ));
                }
                chunks
            }
            "message_stop" => vec![StreamChunk::End],
            "error" => {
                let message = parsed
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "provider returned an error event".to_string());
                vec![StreamChunk::provider_error(message)]
            }
            // ping and content block bookkeeping carry no chunk-level data
            _ => vec![],
        }
    }

    fn handle_stream_end(&self) -> StreamChunk {
        // message_stop is the explicit completion signal; a silent close is
        // an operational fault.
        StreamChunk::provider_error("stream closed before completion")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> Event {
        Event {
            event: "message".to_string(),
            data: data.to_string(),
            id: String::new(),
            retry: None,
        }
    }

    #[test]
    fn content_block_delta_converts_to_text_delta() {
        let converter = MessagesChunkConverter;
        let chunks = converter.convert_event(event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
        ));
        assert_eq!(chunks, vec![StreamChunk::TextDelta { delta: "Hi".into() }]);
    }

    #[test]
    fn message_stop_is_end_of_stream() {
        let converter = MessagesChunkConverter;
        assert_eq!(
            converter.convert_event(event(r#"{"type":"message_stop"}"#)),
            vec![StreamChunk::End]
        );
    }

    #[test]
    fn message_start_carries_metadata() {
        let converter = MessagesChunkConverter;
        let chunks = converter.convert_event(event(
            r#"{"type":"message_start","message":{"id":"msg_01","model":"claude-3-5-sonnet-20241022","usage":{"input_tokens":12}}}"#,
        ));
        assert_eq!(chunks.len(), 1);
        let StreamChunk::Metadata { fields } = &chunks[0] else {
            panic!("expected metadata chunk");
        };
        assert_eq!(fields["response_id"], "msg_01");
        assert_eq!(fields["model"], "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn error_event_is_terminal() {
        let converter = MessagesChunkConverter;
        let chunks = converter.convert_event(event(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        ));
        assert_eq!(
            chunks,
            vec![StreamChunk::provider_error("Overloaded")]
        );
    }

    #[test]
    fn ping_is_ignored() {
        let converter = MessagesChunkConverter;
        assert!(
            converter
                .convert_event(event(r#"{"type":"ping"}"#))
                .is_empty()
        );
    }

    #[test]
    fn request_body_extracts_system_and_caps_tokens() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
            ChatMessage::user("again"),
        ];
        let body = request_body(
            "claude-3-5-sonnet-20241022",
            &messages,
            &ChatOptions::new(),
        );
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
    }
}
