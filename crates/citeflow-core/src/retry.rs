//! Bounded sequential retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::ProviderError;

/// Attempt budget and backoff schedule for a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay before retry number `retry` (1 for the first retry):
    /// `base * 2^(retry - 1)`, capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn delay_after(&self, retry: u32, error: &ProviderError) -> Duration {
        let backoff = self.delay_for(retry);
        match error.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

/// Source of the waits between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Real-time waits on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// The error that ended a retry loop.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub attempts: u32,
    pub error: ProviderError,
}

impl std::fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plural = if self.attempts == 1 { "" } else { "s" };
        write!(f, "{} (after {} attempt{plural})", self.error, self.attempts)
    }
}

impl std::error::Error for RetryFailure {}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. `operation` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1;

    loop {
        debug!(attempt, max_attempts = policy.max_attempts, "invoking provider");

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt, &error);
                warn!(
                    attempt,
                    error = %error,
                    backoff_ms = delay.as_millis() as u64,
                    "transient provider failure, retrying"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                warn!(
                    attempt,
                    transient = error.is_transient(),
                    error = %error,
                    "provider call failed permanently"
                );
                return Err(RetryFailure {
                    attempts: attempt,
                    error,
                });
            }
        }
    }
}
