use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> OpenAiConfig {
    OpenAiConfig {
        base_url: server.uri(),
        api_key: Some("sk-test".to_string()),
        batch_size: 2,
        ..OpenAiConfig::default()
    }
}

#[test]
fn missing_api_key_is_rejected() {
    let result = OpenAiEmbeddings::new(&OpenAiConfig::default());
    assert!(result.is_err());
}

#[tokio::test]
async fn embeddings_are_reordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "text-embedding-3-small"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbeddings::new(&config_for(&server)).expect("should build embedder");
    let texts = vec!["first".to_string(), "second".to_string()];

    let vectors = tokio::task::spawn_blocking(move || embedder.embed_documents(&texts))
        .await
        .expect("should join blocking task")
        .expect("embedding should succeed");

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
}

#[tokio::test]
async fn embed_query_returns_single_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.25, 0.5, 0.75]}]
        })))
        .mount(&server)
        .await;

    let embedder = OpenAiEmbeddings::new(&config_for(&server)).expect("should build embedder");

    let vector = tokio::task::spawn_blocking(move || embedder.embed_query("powershell"))
        .await
        .expect("should join blocking task")
        .expect("query embedding should succeed");

    assert_eq!(vector, vec![0.25, 0.5, 0.75]);
}

#[tokio::test]
async fn unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OpenAiEmbeddings::new(&config_for(&server))
        .expect("should build embedder")
        .with_backoff_unit(Duration::from_millis(1));

    let result = tokio::task::spawn_blocking(move || embedder.embed_query("anything"))
        .await
        .expect("should join blocking task");

    let message = format!("{:#}", result.expect_err("401 should fail"));
    assert!(message.contains("401"));
}
