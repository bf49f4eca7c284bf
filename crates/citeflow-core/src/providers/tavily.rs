//! Tavily web search adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{RawSearchResult, SearchProvider, SearchRequest, retry_after_header};
use crate::{ProviderError, SecretValue};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for the Tavily Search API.
///
/// Performs a single request per call; retry decisions belong to the caller.
pub struct TavilyClient {
    api_key: SecretValue,
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl TavilyClient {
    pub fn new(api_key: SecretValue) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: u32,
    search_depth: &'static str,
    topic: &'static str,
    include_answer: bool,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

impl From<TavilyResult> for RawSearchResult {
    fn from(result: TavilyResult) -> Self {
        Self {
            title: result.title,
            url: result.url,
            content: result.content,
            score: result.score,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    #[instrument(
        name = "tavily.search",
        skip(self, request),
        fields(depth = request.depth.as_str(), max_results = request.max_results)
    )]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawSearchResult>, ProviderError> {
        let body = TavilyRequest {
            query: &request.query,
            max_results: request.max_results,
            search_depth: request.depth.as_str(),
            topic: "general",
            include_answer: false,
            include_raw_content: false,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(self.api_key.expose())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_header(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text, retry_after));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Parse(err.to_string()))?;

        debug!(results = parsed.results.len(), "tavily search returned");

        Ok(parsed.results.into_iter().map(RawSearchResult::from).collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}
