use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{error, warn};

use crate::error::AppError;

/// Bounded exponential backoff for remote calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Wait before the `retry`-th retry (1-based): `base_delay * 2^(retry-1)`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(2u32.saturating_pow(exponent))
    }
}

/// Failures that may succeed when the same call is repeated.
pub trait Retryable: fmt::Display {
    fn is_retryable(&self) -> bool;

    /// Server-requested wait that replaces the backoff delay.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for AppError {
    fn is_retryable(&self) -> bool {
        AppError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Parses a `Retry-After` header given in seconds.
pub fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Authorization failures return at once.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, description: &str, mut op: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.backoff_delay(attempt));
                warn!(
                    "Retry {}/{} for {}: {} (waiting {:?})",
                    attempt, attempts, description, err, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    error!("All retries failed for {}: {}", description, err);
                }
                return Err(err);
            }
        }
    }
}
