//! Google Gemini `generateContent` adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{CompletionProvider, CompletionRequest, retry_after_header};
use crate::{ProviderError, SecretValue};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client for the Gemini API. The key travels in the `x-goog-api-key` header
/// so it never appears in request URLs.
pub struct GeminiClient {
    api_key: SecretValue,
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: SecretValue) -> Result<Self, ProviderError> {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_key: SecretValue, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|err| ProviderError::Setup(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            api_key,
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [GenerateContent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct GenerateContent<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenate the text parts of the first candidate.
    fn into_text(self) -> Result<String, ProviderError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("response contained no candidates".into()))?;

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(text)
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    #[instrument(name = "gemini.complete", skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = GenerateRequest {
            contents: [GenerateContent {
                role: "user",
                parts: [TextPart {
                    text: &request.prompt,
                }],
            }],
        };

        debug!(prompt_chars = request.prompt.len(), "sending gemini completion request");

        let response = self
            .client
            .post(self.endpoint_url(&request.model))
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text, retry_after));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Parse(err.to_string()))?;

        parsed.into_text()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<String, ProviderError> {
        serde_json::from_value::<GenerateResponse>(value)
            .expect("valid shape")
            .into_text()
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let text = parse(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn missing_candidates_is_a_parse_error() {
        let err = parse(json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn blocked_candidate_is_an_empty_completion() {
        let err = parse(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap_err();
        assert!(matches!(err, ProviderError::EmptyCompletion));
    }

    #[test]
    fn endpoint_includes_model_but_not_key() {
        let client = GeminiClient::new(SecretValue::new("secret-key"))
            .unwrap()
            .with_base_url("http://localhost:9999/v1beta/");
        let url = client.endpoint_url("gemini-1.5-flash");
        assert_eq!(
            url,
            "http://localhost:9999/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!url.contains("secret-key"));
    }
}
