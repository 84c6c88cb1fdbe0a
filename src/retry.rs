//! Retry with backoff for idempotent forge requests.

use crate::error::{ChurnError, ChurnResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Longest single wait; a rate-limit reset further out than this is not waited for
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), or `None` to give up.
    pub fn delay_for(&self, attempt: u32, err: &ChurnError) -> Option<Duration> {
        if attempt >= self.max_retries || !err.is_retryable() {
            return None;
        }

        let delay = match err.retry_after() {
            Some(wait) => wait,
            None => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        };

        if delay > self.max_wait {
            if err.is_rate_limited() {
                return None;
            }
            return Some(self.max_wait);
        }
        Some(delay)
    }

    /// Runs `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> ChurnResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChurnResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.delay_for(attempt, &err) {
                    Some(delay) => {
                        warn!(
                            request = what,
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying request"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        debug!(request = what, attempts = attempt + 1, "Giving up on request");
                        return Err(err);
                    }
                },
            }
        }
    }
}
