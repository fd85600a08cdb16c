//! Bounded retry with increasing backoff.
//!
//! Used identically for page fetches and notification sends. The operation
//! decides which errors are transient through the `retryable` predicate.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Clamped to at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Added to the delay for every further retry.
    pub step: Duration,
}

impl RetryPolicy {
    /// Policy used for page fetches: 4s, 6s, 8s, ...
    #[must_use]
    pub const fn fetch(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(4),
            step: Duration::from_secs(2),
        }
    }

    /// Policy used for channel sends: flat 2s.
    #[must_use]
    pub const fn send(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_secs(2),
            step: Duration::ZERO,
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            step: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay + self.step * attempt.saturating_sub(1)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// budget is exhausted. The last error is returned.
pub async fn with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && retryable(&err) => {
                let delay = policy.backoff(attempt);
                warn!(%label, attempt, max_attempts, error = %err, ?delay, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
