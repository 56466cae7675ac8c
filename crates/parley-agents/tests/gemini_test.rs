use std::sync::Arc;

use parley_agents::{
    ChatMessage, ChatOrchestrator, ContentBlock, CredentialRotator, GeminiProvider, LlmProvider,
    LlmRequest, ToolDispatcher,
};
use parley_common::{ChannelId, Error, MemoryKey, UpstreamErrorKind};
use parley_store::ConversationStore;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/models/gemini-2.5-pro:generateContent";

fn text_response(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 4, "candidatesTokenCount": 2 },
        "modelVersion": "gemini-2.5-pro"
    })
}

fn provider(server: &MockServer, key: &str) -> GeminiProvider {
    GeminiProvider::new(key, "gemini-2.5-pro").with_base_url(server.uri())
}

#[tokio::test]
async fn test_gemini_completion() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "Hello" }] }],
            "systemInstruction": { "parts": [{ "text": "Be kind." }] }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("Hello there!")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = LlmRequest {
        messages: vec![ChatMessage::user("Hello")],
        system: Some("Be kind.".to_string()),
        ..LlmRequest::default()
    };

    let response = provider(&mock_server, "test-key")
        .complete(&request)
        .await
        .unwrap();

    assert_eq!(
        response.content,
        vec![ContentBlock::Text {
            text: "Hello there!".to_string()
        }]
    );
    assert_eq!(response.usage.map(|u| u.output_tokens), Some(2));
}

#[tokio::test]
async fn test_gemini_function_call() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{
                    "functionCall": { "name": "web_search", "args": { "query": "rust 2024" } }
                }]},
                "finishReason": "STOP"
            }]
        })))
        .mount(&mock_server)
        .await;

    let response = provider(&mock_server, "k")
        .complete(&LlmRequest {
            messages: vec![ChatMessage::user("what's new in rust?")],
            ..LlmRequest::default()
        })
        .await
        .unwrap();

    match &response.content[0] {
        ContentBlock::ToolUse { name, input, .. } => {
            assert_eq!(name, "web_search");
            assert_eq!(input["query"], "rust 2024");
        }
        other => panic!("expected tool use, got {other:?}"),
    }
}

#[tokio::test]
async fn test_gemini_error_classification() {
    let cases = [
        (
            429,
            json!({"error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}}),
            UpstreamErrorKind::QuotaExhausted,
        ),
        (
            503,
            json!({"error": {"code": 503, "message": "The model is overloaded", "status": "UNAVAILABLE"}}),
            UpstreamErrorKind::Unavailable,
        ),
        (
            400,
            json!({"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}),
            UpstreamErrorKind::InvalidRequest,
        ),
        (
            403,
            json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}}),
            UpstreamErrorKind::Unauthorized,
        ),
    ];

    for (status, body, expected) in cases {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server, "k")
            .complete(&LlmRequest::default())
            .await
            .expect_err("should fail");
        match err {
            Error::Upstream(upstream) => {
                assert_eq!(upstream.kind, expected, "status {status}");
                assert_eq!(upstream.status, Some(status));
            }
            other => panic!("expected upstream error, got {other}"),
        }
    }
}

#[tokio::test]
async fn test_gemini_malformed_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server, "k")
        .complete(&LlmRequest::default())
        .await
        .expect_err("should fail");
    assert!(matches!(
        err,
        Error::Upstream(ref e) if e.kind == UpstreamErrorKind::MalformedResponse
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rotation_across_real_providers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "exhausted-key"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "fresh-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_response("from the second key")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let providers: Vec<Arc<dyn LlmProvider>> = vec![
        Arc::new(provider(&mock_server, "exhausted-key").with_label("gemini-2.5-pro#1")),
        Arc::new(provider(&mock_server, "fresh-key").with_label("gemini-2.5-pro#2")),
    ];
    let orchestrator = ChatOrchestrator::new(
        CredentialRotator::new(providers).unwrap(),
        Arc::new(ConversationStore::new()),
        ToolDispatcher::new(),
    );

    let key = MemoryKey::channel(&ChannelId::from(7));
    let reply = orchestrator.generate("hi", &key).await.unwrap();

    assert_eq!(reply, "from the second key");
    assert_eq!(orchestrator.store().history(&key).len(), 2);
}

#[tokio::test]
async fn test_gemini_health_check() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/gemini-2.5-pro"))
        .and(header("x-goog-api-key", "good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "models/gemini-2.5-pro"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models/gemini-2.5-pro"))
        .and(header("x-goog-api-key", "bad"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&mock_server)
        .await;

    assert!(provider(&mock_server, "good").health_check().await.unwrap());
    assert!(!provider(&mock_server, "bad").health_check().await.unwrap());
}
