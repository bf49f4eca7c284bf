//! Citeflow core: a two-stage research workflow built on top of `graph_flow`.
//!
//! A run searches the web for the query, then asks a language model to draft
//! a concise answer citing the collected sources. Failures of either external
//! service degrade the result instead of aborting the run.

mod config;
mod error;
mod prompt;
pub mod providers;
mod retry;
mod security;
mod state;
mod tasks;
mod telemetry;
mod trace;
mod workflow;

pub use config::{
    Config, ConfigLoader, LoggingConfig, ModelConfig, ResearchConfig, RetryConfig, SearchConfig,
};
pub use error::{CiteflowError, ProviderError};
pub use prompt::drafting_prompt;
pub use retry::{RetryFailure, RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
pub use security::{SecretValue, require_env};
pub use state::{ResearchItem, WorkflowState, truncate_chars};
pub use tasks::{DRAFT_ERROR_FALLBACK, DraftTask, NO_RESEARCH_FALLBACK, ResearchTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{RunTrace, TraceEvent, persist_trace};
pub use workflow::{ResearchWorkflow, RunReport, WorkflowStage};
