//! HTTP transport against a mock OpenAI-compatible endpoint.

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server};
use scheduling_agent::{
    HttpTransport, ModelClient, ModelRequest, ModelServiceError, ModelTransport, SchedulerConfig,
    TransportError,
};
use serde_json::json;

fn request() -> ModelRequest {
    ModelRequest {
        prompt: "rank these slots".to_string(),
        max_tokens: 128,
        temperature: 0.2,
        top_p: 0.9,
    }
}

fn transport(server: &Server, api_key: Option<&str>) -> HttpTransport {
    HttpTransport::new(
        &format!("{}/openai/v1/", server.url()),
        "test-model",
        api_key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn completion_is_parsed_with_token_counts() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/openai/v1/chat/completions")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({
            "model": "test-model",
            "max_tokens": 128,
            "messages": [{"role": "user", "content": "rank these slots"}]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "chatcmpl-1",
                "model": "test-model-2026",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"ranking\":[]}"}}],
                "usage": {"prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let completion = transport(&server, Some("secret"))
        .complete(&request())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(completion.content, "{\"ranking\":[]}");
    assert_eq!(completion.input_tokens, 1000);
    assert_eq!(completion.output_tokens, 500);
    assert_eq!(completion.model_id, "test-model-2026");
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let cases = [
        (429, r#"{"error":{"message":"slow down"}}"#),
        (401, r#"{"error":{"message":"bad key"}}"#),
        (400, r#"{"error":{"message":"bad request"}}"#),
        (503, "upstream unavailable"),
    ];

    let mut errors = Vec::new();
    for (status, body) in cases {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(status)
            .with_body(body)
            .create_async()
            .await;
        errors.push(transport(&server, None).complete(&request()).await.unwrap_err());
    }

    assert_eq!(errors[0], TransportError::Throttled);
    assert_eq!(errors[1], TransportError::Authentication("bad key".to_string()));
    assert!(matches!(&errors[2], TransportError::MalformedRequest(m) if m.contains("bad request")));
    assert_eq!(
        errors[3],
        TransportError::Unavailable {
            status: 503,
            message: "upstream unavailable".to_string()
        }
    );
}

#[tokio::test]
async fn response_without_usage_is_invalid() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/openai/v1/chat/completions")
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "hi"}}]}).to_string())
        .create_async()
        .await;

    let err = transport(&server, None).complete(&request()).await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidResponse(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn client_retries_server_errors_over_http() {
    let mut server = Server::new_async().await;
    let failing = server
        .mock("POST", "/openai/v1/chat/completions")
        .with_status(502)
        .with_body("bad gateway")
        .expect(3)
        .create_async()
        .await;

    let mut config = SchedulerConfig::default();
    config.model.initial_backoff_ms = 1;
    config.model.max_backoff_ms = 2;
    let client = ModelClient::new(Arc::new(transport(&server, None)), Arc::new(config));

    let err = client.invoke("p", 16, 0.0, 1.0).await.unwrap_err();

    failing.assert_async().await;
    assert!(matches!(
        err,
        ModelServiceError::Exhausted {
            attempts: 3,
            last: TransportError::Unavailable { status: 502, .. }
        }
    ));
}
