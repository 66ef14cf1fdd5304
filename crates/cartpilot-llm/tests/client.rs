//! Integration tests for `GeminiClient` using wiremock HTTP mocks.

use cartpilot_core::RetryPolicy;
use cartpilot_llm::{parse_decision, Decision, GeminiClient, LanguageModel, LlmError};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn test_client(base_url: &str) -> GeminiClient {
    GeminiClient::with_base_url("test-key", "gemini-1.5-flash", 5, base_url)
        .expect("client construction should not fail")
        .with_retry_policy(RetryPolicy::immediate(2))
}

fn answer(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn generate_content_returns_candidate_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": "pick one"}]}],
            "systemInstruction": {"parts": [{"text": "reply in JSON"}]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n{\"action\": \"select_product\", \"index\": 0}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let text = client
        .generate_content("pick one", "reply in JSON")
        .await
        .expect("should return text");

    assert_eq!(
        parse_decision(&text).unwrap().decision,
        Decision::SelectProduct { index: 0 }
    );
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": {"code": 503, "message": "The model is overloaded."}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("{\"action\": \"completed\"}")))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let text = client.generate_content("p", "s").await.expect("second attempt succeeds");

    assert_eq!(text, "{\"action\": \"completed\"}");
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"code": 400, "message": "API key not valid."}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.generate_content("p", "s").await.unwrap_err();

    match err {
        LlmError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "API key not valid.");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_candidates_are_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let err = client.generate_content("p", "s").await.unwrap_err();

    assert!(matches!(err, LlmError::EmptyResponse), "{err}");
}
