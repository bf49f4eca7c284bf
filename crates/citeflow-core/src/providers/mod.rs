//! Narrow capability interfaces onto the external search and model services.
//!
//! The workflow only ever talks to [`SearchProvider`] and
//! [`CompletionProvider`]; the HTTP adapters in this module are the default
//! implementations and tests substitute deterministic fakes.

mod gemini;
mod tavily;

pub use gemini::GeminiClient;
pub use tavily::TavilyClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Search depth requested from the search provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub depth: SearchDepth,
    pub max_results: u32,
}

/// One result as delivered by the provider; `content` is uncapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawSearchResult>, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce a single text completion for the prompt.
    ///
    /// Errors must be classified so that [`ProviderError::is_transient`]
    /// separates retryable failures from permanent ones.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Parse a `Retry-After` header given in whole seconds.
pub(crate) fn retry_after_header(
    headers: &reqwest::header::HeaderMap,
) -> Option<std::time::Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(std::time::Duration::from_secs)
}
