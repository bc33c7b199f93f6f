//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;
use crate::signal::{AbortReason, AbortSignal};

/// How often and how patiently a chunk request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; later delays grow linearly.
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

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryError {
    /// The abort signal fired; the in-flight attempt was dropped.
    Aborted(AbortReason),
    /// A non-transient error, or the last transient one.
    Failed { attempts: u32, source: ApiError },
}

impl RetryPolicy {
    /// Delay after the failed attempt number `attempt` (0-based):
    /// `base_delay * (attempt + 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Runs `op` until it succeeds, fails permanently, runs out of attempts
    /// or `signal` fires. `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, signal: &AbortSignal, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if let Some(reason) = signal.reason() {
                return Err(RetryError::Aborted(reason));
            }

            let result = tokio::select! {
                biased;
                reason = signal.aborted() => return Err(RetryError::Aborted(reason)),
                r = op(attempt) => r,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_transient() || attempt + 1 >= max_attempts {
                return Err(RetryError::Failed {
                    attempts: attempt + 1,
                    source: err,
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );
            tokio::select! {
                biased;
                reason = signal.aborted() => return Err(RetryError::Aborted(reason)),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
