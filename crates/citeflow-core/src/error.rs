use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Core error type for Citeflow.
///
/// Only configuration problems and internal defects surface through this type.
/// Failures of the external search and model services are absorbed by the
/// workflow stages and never reach the caller as an `Err`.
#[derive(Debug, Error)]
pub enum CiteflowError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("workflow state violation: {0}")]
    StateViolation(String),
    #[error("workflow execution failed: {0}")]
    Workflow(String),
}

impl CiteflowError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure reported by an external search or completion provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unauthorized - check API key")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error ({0}): {1}")]
    Server(u16, String),

    #[error("HTTP error ({0}): {1}")]
    Http(u16, String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("provider returned an empty completion")]
    EmptyCompletion,

    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::Connection(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Server(_, _)
        )
    }

    /// Map a non-success HTTP status to an error class.
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ProviderError::Unauthorized,
            408 => ProviderError::Timeout,
            429 => ProviderError::RateLimited { retry_after },
            400 => ProviderError::BadRequest(body),
            500..=599 => ProviderError::Server(status, body),
            _ => ProviderError::Http(status, body),
        }
    }

    /// Delay the provider asked us to wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Connection(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}
