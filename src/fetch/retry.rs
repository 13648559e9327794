//! Shared retry-with-backoff logic for `FetchPipeline`.
//!
//! Adapted from the teacher's `hls::retry` module: same `RetryAction`/
//! `retry_with_backoff` shape and cancellation-aware sleep, but linear
//! backoff (`base * attempt`) instead of exponential, per spec §4.2 and the
//! Open Question resolution in SPEC_FULL.md §9.

use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::FetchError;

/// Linear backoff policy: delay for attempt `n` (1-indexed) is `base * n`,
/// with optional jitter of `[0, base/2)` to avoid thundering herds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts after the first before giving up.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt.max(1));
        if !self.jitter {
            return linear;
        }
        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(0) / 2;
        if jitter_range_ms == 0 {
            return linear;
        }
        let jitter_ms = rand::rng().random_range(0..jitter_range_ms);
        linear + Duration::from_millis(jitter_ms)
    }
}

/// Result of a single attempt.
pub enum RetryAction<T> {
    Success(T),
    Retry(FetchError),
    Fail(FetchError),
}

/// Execute an async operation with retry-and-backoff, observing cancellation
/// between attempts (spec §5: cancellation is idempotent and immediate).
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    for attempt in 1..=(policy.max_retries + 1) {
        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                if attempt > policy.max_retries {
                    return Err(FetchError::Transient {
                        reason: err.to_string(),
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, max = policy.max_retries, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient error");
                tokio::select! {
                    _ = token.cancelled() => return Err(FetchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    unreachable!("loop covers attempts 1..=max_retries+1 and returns on the last Retry")
}
