use citeflow_core::providers::{
    CompletionProvider, CompletionRequest, GeminiClient, SearchDepth, SearchProvider,
    SearchRequest, TavilyClient,
};
use citeflow_core::{ProviderError, SecretValue};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_request() -> SearchRequest {
    SearchRequest {
        query: "rust async runtimes".to_string(),
        depth: SearchDepth::Advanced,
        max_results: 5,
    }
}

fn completion_request() -> CompletionRequest {
    CompletionRequest {
        model: "gemini-1.5-flash".to_string(),
        prompt: "Say hello".to_string(),
    }
}

fn tavily(server: &MockServer) -> TavilyClient {
    TavilyClient::new(SecretValue::new("tvly-test")).with_base_url(server.uri())
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::new(SecretValue::new("gemini-test"))
        .expect("client builds")
        .with_base_url(server.uri())
}

#[tokio::test]
async fn tavily_sends_depth_and_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("authorization", "Bearer tvly-test"))
        .and(body_partial_json(json!({
            "query": "rust async runtimes",
            "search_depth": "advanced",
            "max_results": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": "rust async runtimes",
            "results": [
                {"title": "Tokio", "url": "https://tokio.rs", "content": "An async runtime", "score": 0.9},
                {"title": "smol", "url": "https://github.com/smol-rs/smol", "content": "A small runtime", "score": 0.7}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let results = tavily(&server).search(&search_request()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].title, "Tokio");
    assert_eq!(results[1].url, "https://github.com/smol-rs/smol");
    assert_eq!(results[0].score, Some(0.9));
}

#[tokio::test]
async fn tavily_maps_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .mount(&server)
        .await;

    let err = tavily(&server).search(&search_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn tavily_malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = tavily(&server).search(&search_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Parse(_)));
}

#[tokio::test]
async fn gemini_returns_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .and(header("x-goog-api-key", "gemini-test"))
        .and(body_partial_json(json!({
            "contents": [{"role": "user", "parts": [{"text": "Say hello"}]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello"}, {"text": " there"}]},
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = gemini(&server).complete(&completion_request()).await.unwrap();
    assert_eq!(text, "Hello there");
}

#[tokio::test]
async fn gemini_rate_limit_is_transient_with_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "12")
                .set_body_string("quota exceeded"),
        )
        .mount(&server)
        .await;

    let err = gemini(&server)
        .complete(&completion_request())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
}

#[tokio::test]
async fn gemini_server_error_is_transient_and_bad_request_is_not() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-1.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/unknown-model:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown model"))
        .mount(&server)
        .await;

    let client = gemini(&server);

    let err = client.complete(&completion_request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::Server(503, _)));
    assert!(err.is_transient());

    let request = CompletionRequest {
        model: "unknown-model".to_string(),
        prompt: "Say hello".to_string(),
    };
    let err = client.complete(&request).await.unwrap_err();
    assert!(matches!(err, ProviderError::BadRequest(_)));
    assert!(!err.is_transient());
}
