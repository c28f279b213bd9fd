//! Bounded retry with exponential backoff for banking gateway calls.

use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Same attempt budget with millisecond backoffs, for tests and local runs.
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let backoff = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = backoff.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Runs `f` until it succeeds, fails with a non-retryable fault, or the budget is spent.
    pub async fn run<F, Fut, T>(&self, operation: &str, f: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation, attempt, "gateway call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    warn!(operation, error = %err, "gateway call failed with permanent error");
                    return Err(err);
                }
                Err(err) if attempt >= max_attempts => {
                    warn!(operation, attempt, error = %err, "gateway call failed after max attempts");
                    return Err(err);
                }
                Err(err) => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "gateway call failed, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
