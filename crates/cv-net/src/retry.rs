//! Bounded retry with linear backoff

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

/// Retry policy for recoverable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before attempt `n` is `n * backoff_ms`
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, backoff_ms: 0 }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// The last error is returned on exhaustion.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    let delay = self.delay_for(attempt);
                    tracing::debug!("attempt {}/{} failed: {}; retrying in {:?}", attempt, attempts, err, delay);
                    if !delay.is_zero() {
                        smol::Timer::after(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!("giving up after {} attempts: {}", attempts, err);
                    return Err(err);
                }
            }
        }
    }
}
