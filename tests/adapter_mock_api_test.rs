//! Stream adapter tests against a mock SSE server.

use std::time::Duration;

use futures_util::StreamExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use charsiu::prelude::*;

struct EnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.previous {
            Some(v) => unsafe { std::env::set_var(self.key, v) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

/// Build a route pointing a model at the mock server.
fn mock_route(
    family: ProviderFamily,
    model: &str,
    credential_env_var: &'static str,
    base_url: &str,
) -> RouteContext {
    let gateway_vendor = match family {
        ProviderFamily::CloudGateway => Some(GatewayVendor::Anthropic),
        _ => None,
    };
    RouteContext {
        descriptor: ModelDescriptor::new(model, family, gateway_vendor).unwrap(),
        credential_env_var,
        base_url_override: Some(base_url.to_string()),
    }
}

async fn collect(mut stream: ChunkStream) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }
    chunks
}

fn text_of(chunks: &[StreamChunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn openai_compatible_stream_yields_deltas_then_end() {
    let _key = EnvGuard::set("CHARSIU_TEST_OPENAI_KEY", "test-key");
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"index\":0}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\" there\"},\"index\":0}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":2,\"total_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::OpenAiCompatible,
        "gpt-4o",
        "CHARSIU_TEST_OPENAI_KEY",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &ChatOptions::new())
        .await
        .unwrap();
    let chunks = collect(stream).await;

    assert_eq!(text_of(&chunks), "Hi there");
    assert_eq!(chunks.last(), Some(&StreamChunk::End));
    assert_eq!(
        chunks.iter().filter(|c| c.is_terminal()).count(),
        1,
        "exactly one terminal chunk"
    );
}

#[tokio::test]
async fn anthropic_stream_converts_message_events() {
    let _key = EnvGuard::set("CHARSIU_TEST_ANTHROPIC_KEY", "test-key");
    let server = MockServer::start().await;

    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_01\",\"model\":\"claude-3-5-sonnet-20241022\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":4}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::Anthropic,
        "claude-3-5-sonnet-20241022",
        "CHARSIU_TEST_ANTHROPIC_KEY",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &ChatOptions::new())
        .await
        .unwrap();
    let chunks = collect(stream).await;

    assert_eq!(text_of(&chunks), "Hello");
    assert_eq!(chunks.last(), Some(&StreamChunk::End));
    let metadata_count = chunks
        .iter()
        .filter(|c| matches!(c, StreamChunk::Metadata { .. }))
        .count();
    assert_eq!(metadata_count, 3, "message_start id/model plus stop_reason plus usage");
}

#[tokio::test]
async fn gemini_stream_ends_on_connection_close() {
    let _key = EnvGuard::set("CHARSIU_TEST_GEMINI_KEY", "test-key");
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"Bonjour\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"finishReason\":\"STOP\"}],\"usageMetadata\":{\"totalTokenCount\":7}}\n\n",
    );
    Mock::given(method("POST"))
        .and(path(
            "/v1beta/models/gemini-1.5-pro:streamGenerateContent",
        ))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::Gemini,
        "gemini-1.5-pro",
        "CHARSIU_TEST_GEMINI_KEY",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Salut")], &ChatOptions::new())
        .await
        .unwrap();
    let chunks = collect(stream).await;

    assert_eq!(text_of(&chunks), "Bonjour");
    // No explicit completion marker: the close is the completion signal.
    assert_eq!(chunks.last(), Some(&StreamChunk::End));
}

#[tokio::test]
async fn gateway_request_strips_routing_prefix_from_model() {
    let _key = EnvGuard::set("CHARSIU_TEST_GATEWAY_KEY", "test-key");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw("data: [DONE]\n\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::CloudGateway,
        "claude-instant-v1",
        "CHARSIU_TEST_GATEWAY_KEY",
        &server.uri(),
    );
    assert_eq!(route.descriptor.wire_name, "bedrock/anthropic.claude-instant-v1");

    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &ChatOptions::new())
        .await
        .unwrap();
    let _ = collect(stream).await;

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = requests[0].body_json().unwrap();
    // The gateway endpoint sees the namespaced id without the routing prefix.
    assert_eq!(body["model"], "anthropic.claude-instant-v1");
}

#[tokio::test]
async fn http_error_status_becomes_terminal_error_chunk() {
    let _key = EnvGuard::set("CHARSIU_TEST_OPENAI_KEY_ERR", "test-key");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"error":{"message":"bad key"}}"#),
        )
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::OpenAiCompatible,
        "gpt-4o",
        "CHARSIU_TEST_OPENAI_KEY_ERR",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &ChatOptions::new())
        .await
        .unwrap();
    let chunks = collect(stream).await;

    assert_eq!(chunks.len(), 1);
    match &chunks[0] {
        StreamChunk::Error { message, kind } => {
            assert_eq!(kind, PROVIDER_ERROR);
            assert!(message.contains("401"), "message: {message}");
        }
        other => panic!("expected terminal error chunk, got {other:?}"),
    }
}

#[tokio::test]
async fn first_byte_timeout_becomes_terminal_error_chunk() {
    let _key = EnvGuard::set("CHARSIU_TEST_OPENAI_KEY_SLOW", "test-key");
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw("data: [DONE]\n\n", "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::OpenAiCompatible,
        "gpt-4o",
        "CHARSIU_TEST_OPENAI_KEY_SLOW",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let options = ChatOptions::new().with_timeout(Duration::from_millis(200));
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &options)
        .await
        .unwrap();
    let chunks = collect(stream).await;

    assert_eq!(chunks.len(), 1);
    assert!(matches!(
        &chunks[0],
        StreamChunk::Error { kind, .. } if kind == PROVIDER_ERROR
    ));
}

#[tokio::test]
async fn unknown_model_performs_no_network_call() {
    let server = MockServer::start().await;
    // Nothing mounted: any request would 404 and be counted.
    let router = ModelRouter::new();
    let err = router.route("definitely-unknown").unwrap_err();
    assert!(matches!(err, BridgeError::UnknownModel(_)));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn base_url_override_never_touches_the_environment() {
    // The override travels inside the RouteContext; the process environment
    // stays exactly as it was, whatever the call outcome.
    let _key = EnvGuard::set("CHARSIU_TEST_XAI_KEY", "test-key");
    assert!(std::env::var("OPENAI_BASE_URL").is_err());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw("data: [DONE]\n\n", "text/event-stream"),
        )
        .mount(&server)
        .await;

    let route = mock_route(
        ProviderFamily::Xai,
        "grok-2-latest",
        "CHARSIU_TEST_XAI_KEY",
        &server.uri(),
    );
    let adapter = StreamAdapter::new();
    let stream = adapter
        .stream(&route, &[ChatMessage::user("Hello")], &ChatOptions::new())
        .await
        .unwrap();
    let _ = collect(stream).await;

    assert!(std::env::var("OPENAI_BASE_URL").is_err());
    assert!(std::env::var("XAI_BASE_URL").is_err());
}
