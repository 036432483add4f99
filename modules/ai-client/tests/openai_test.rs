use ai_client::{ChatModel, OpenAi, TextEmbedder};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn chat_returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\":true}"}}]
        })))
        .mount(&server)
        .await;

    let client = OpenAi::new("test-key", "test-model").with_base_url(&server.uri());
    let out = client.complete("system", "user").await.unwrap();
    assert_eq!(out, "{\"ok\":true}");
}

#[tokio::test]
async fn provider_5xx_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = OpenAi::new("test-key", "test-model").with_base_url(&server.uri());
    let err = client.complete("system", "user").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn provider_4xx_is_not_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let client = OpenAi::new("bad-key", "test-model").with_base_url(&server.uri());
    let err = client.complete("system", "user").await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn embed_returns_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        })))
        .mount(&server)
        .await;

    let client = OpenAi::new("test-key", "test-model").with_base_url(&server.uri());
    let vec = client.embed("hello").await.unwrap();
    assert_eq!(vec.len(), 3);
}
