use super::*;
use crate::config::OllamaConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let address = server.address();
    Config {
        ollama: OllamaConfig {
            host: address.ip().to_string(),
            port: address.port(),
            embedding_model: "test-embed".to_string(),
            chat_model: "test-chat".to_string(),
            batch_size: 2,
            ..OllamaConfig::default()
        },
        ..Config::default()
    }
}

#[test]
fn client_configuration() {
    let config = Config {
        ollama: OllamaConfig {
            protocol: "http".to_string(),
            host: "test-host".to_string(),
            port: 1234,
            embedding_model: "test-embed".to_string(),
            chat_model: "test-chat".to_string(),
            batch_size: 128,
            timeout_secs: 30,
        },
        ..Config::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.embedding_model, "test-embed");
    assert_eq!(client.chat_model(), "test-chat");
    assert_eq!(client.batch_size, 128);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.probe_attempts, DEFAULT_PROBE_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let client = OllamaClient::new(&Config::default())
        .expect("Failed to create client")
        .with_timeout(Duration::from_secs(60))
        .with_probe_attempts(0);

    assert_eq!(client.probe_attempts, 1);
}

#[tokio::test]
async fn embed_splits_requests_by_batch_size() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"model": "test-embed", "input": ["a", "b"]})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"embeddings": [[1.0, 0.0], [0.0, 1.0]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[0.5, 0.5]]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let embeddings = client.embed(&texts).await.expect("embedding should succeed");

    assert_eq!(
        embeddings,
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]
    );
}

#[tokio::test]
async fn embed_count_mismatch_is_an_embedding_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0]]})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let texts = vec!["a".to_string(), "b".to_string()];
    let result = client.embed(&texts).await;

    assert!(
        matches!(&result, Err(ManualError::Embedding(message)) if message.contains("Mismatch")),
        "unexpected result: {:?}",
        result
    );
}

#[tokio::test]
async fn embed_empty_input_makes_no_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let embeddings = client.embed(&[]).await.expect("empty input should succeed");
    assert!(embeddings.is_empty());
}

#[tokio::test]
async fn chat_sends_prompts_and_sampling_options() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "test-chat",
            "stream": false,
            "messages": [
                {"role": "system", "content": "persona"},
                {"role": "user", "content": "question"}
            ],
            "options": {"num_predict": 500, "top_k": 20, "num_ctx": 2048}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test-chat",
            "message": {"role": "assistant", "content": "\n  Меняйте масло каждые 10000 км.  \n"},
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let answer = client
        .complete("persona", "question")
        .await
        .expect("completion should succeed");

    assert_eq!(answer, "Меняйте масло каждые 10000 км.");
}

#[tokio::test]
async fn chat_server_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let result = client.complete("persona", "question").await;

    assert!(matches!(result, Err(ManualError::Completion(_))));
}

#[tokio::test]
async fn chat_without_message_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": true})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server)).expect("client");
    let result = client.complete("persona", "question").await;

    assert!(matches!(result, Err(ManualError::Completion(message)) if message.contains("no message")));
}

#[tokio::test]
async fn health_check_requires_both_models() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{"name": "test-embed"}]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server))
        .expect("client")
        .with_probe_attempts(1);

    let result = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("task should join");

    let error = result.expect_err("chat model is missing");
    assert!(error.to_string().contains("test-chat"));
}

#[tokio::test]
async fn model_listing_ignores_extra_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                {
                    "name": "test-embed",
                    "size": 274302450,
                    "digest": "0a109f422b47",
                    "details": {"family": "nomic-bert", "parameter_size": "137M"}
                },
                {"name": "test-chat", "modified_at": "2025-01-01T00:00:00Z"}
            ]
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&config_for(&server))
        .expect("client")
        .with_probe_attempts(1);

    let (models, health) = tokio::task::spawn_blocking(move || (client.list_models(), client.health_check()))
        .await
        .expect("task should join");

    let names: Vec<String> = models
        .expect("listing should parse")
        .into_iter()
        .map(|model| model.name)
        .collect();
    assert_eq!(names, vec!["test-embed", "test-chat"]);
    health.expect("both models are present");
}
