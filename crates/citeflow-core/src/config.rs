use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::providers::SearchDepth;
use crate::retry::RetryPolicy;
use crate::{CiteflowError, SecretValue, require_env};

const DEFAULT_CONFIG_PATH: &str = "citeflow.toml";
const CONFIG_PATH_ENV: &str = "CITEFLOW_CONFIG";

/// Upper bound Tavily accepts for `max_results`.
const MAX_SEARCH_RESULTS: u32 = 20;

/// Top-level configuration structure.
///
/// Secrets never live in the file; the `api_key_env` fields name the
/// environment variables that hold them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub research: ResearchConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the search provider secret (from environment only).
    pub fn search_api_key(&self) -> Result<SecretValue, CiteflowError> {
        require_env(&self.search.api_key_env)
    }

    /// Resolve the model provider secret (from environment only).
    pub fn model_api_key(&self) -> Result<SecretValue, CiteflowError> {
        require_env(&self.model.api_key_env)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.backoff_base_ms),
            Duration::from_millis(self.retry.backoff_max_ms),
        )
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `CITEFLOW_CONFIG` environment variable.
    /// 3. `citeflow.toml` in the current working directory.
    ///
    /// Only the implicit default file may be absent, in which case the
    /// built-in defaults apply.
    pub fn load(path: Option<PathBuf>) -> Result<Config, CiteflowError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| CiteflowError::config_io(candidate.clone(), err))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Config, CiteflowError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| CiteflowError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), CiteflowError> {
        if config.search.api_key_env.trim().is_empty() {
            return Err(invalid("search.api_key_env must reference an environment variable"));
        }
        if config.model.api_key_env.trim().is_empty() {
            return Err(invalid("model.api_key_env must reference an environment variable"));
        }
        if config.model.name.trim().is_empty() {
            return Err(invalid("model.name must not be empty"));
        }
        if !(1..=MAX_SEARCH_RESULTS).contains(&config.search.max_results) {
            return Err(invalid(format!(
                "search.max_results must be between 1 and {MAX_SEARCH_RESULTS}"
            )));
        }
        if config.research.content_truncation_length == 0 {
            return Err(invalid("research.content_truncation_length must be positive"));
        }
        if config.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if config.retry.backoff_max_ms < config.retry.backoff_base_ms {
            return Err(invalid("retry.backoff_max_ms must not be below retry.backoff_base_ms"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> CiteflowError {
    CiteflowError::InvalidConfiguration(message.into())
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key_env: String,
    pub max_results: u32,
    pub depth: SearchDepth,
    pub timeout_secs: u64,
    pub base_url: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "TAVILY_API_KEY".to_string(),
            max_results: 5,
            depth: SearchDepth::Advanced,
            timeout_secs: 30,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key_env: String,
    pub name: String,
    pub timeout_secs: u64,
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GOOGLE_API_KEY".to_string(),
            name: "gemini-1.5-flash".to_string(),
            timeout_secs: 120,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub content_truncation_length: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            content_truncation_length: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.depth, SearchDepth::Advanced);
        assert_eq!(config.research.content_truncation_length, 1000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.model.name, "gemini-1.5-flash");
        ConfigLoader::validate(&config).expect("defaults are valid");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ConfigLoader::from_toml(
            r#"
            [model]
            name = "gemini-1.5-pro"

            [retry]
            backoff_base_ms = 250
            "#,
        )
        .expect("config parses");

        assert_eq!(config.model.name, "gemini-1.5-pro");
        assert_eq!(config.model.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.retry.backoff_base_ms, 250);
        assert_eq!(config.retry.max_attempts, 3);

        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = ConfigLoader::from_toml("[search]\nmax_results = 0\n").unwrap_err();
        assert!(matches!(err, CiteflowError::InvalidConfiguration(_)));

        let err = ConfigLoader::from_toml("[retry]\nmax_attempts = 0\n").unwrap_err();
        assert!(matches!(err, CiteflowError::InvalidConfiguration(_)));

        let err =
            ConfigLoader::from_toml("[research]\ncontent_truncation_length = 0\n").unwrap_err();
        assert!(matches!(err, CiteflowError::InvalidConfiguration(_)));

        let err = ConfigLoader::from_toml("[search]\ndepth = \"deep\"\n").unwrap_err();
        assert!(matches!(err, CiteflowError::InvalidConfiguration(_)));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nmax_results = 3\ndepth = \"basic\"").unwrap();

        let config = ConfigLoader::load(Some(file.path().to_path_buf())).expect("loads");
        assert_eq!(config.search.max_results, 3);
        assert_eq!(config.search.depth, SearchDepth::Basic);
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = ConfigLoader::load(Some(PathBuf::from("/nonexistent/citeflow.toml")))
            .unwrap_err();
        assert!(matches!(err, CiteflowError::ConfigIo { .. }));
    }
}
