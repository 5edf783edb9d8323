//! Exponential backoff with additive jitter.
//!
//! [`retry_with_backoff`] re-runs an operation while it fails with a
//! retryable [`EngineError`], sleeping `base_delay * 2^attempts_used` plus
//! a random jitter between attempts. Non-retryable errors return at once.

use std::future::Future;
use std::time::Duration;

use atelier_core::redaction::Redactor;
use rand::Rng;

use crate::error::EngineError;

/// Tunable parameters for one call site's retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry (before jitter).
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random additive jitter.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Smaller budget for best-effort auxiliary calls (prompt enhancement).
    pub fn auxiliary() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(500),
            ..Self::default()
        }
    }

    /// Same policy with jitter disabled.
    pub fn without_jitter(self) -> Self {
        Self {
            max_jitter: Duration::ZERO,
            ..self
        }
    }

    /// Deterministic part of the delay after `attempts_used` failures
    /// (0-based): `base_delay * 2^attempts_used`.
    pub fn backoff_delay(&self, attempts_used: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempts_used))
    }

    /// Backoff delay plus a uniform jitter in `[0, max_jitter)`.
    pub fn delay_with_jitter(&self, attempts_used: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        self.backoff_delay(attempts_used) + jitter
    }
}

/// Run `op` under `policy`. `op` receives the 1-based attempt number.
///
/// Returns the first success, the first non-retryable error, or the last
/// retryable error once the budget is exhausted. Every error is passed
/// through `redactor` before it is logged or returned.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    redactor: &Redactor,
    operation: &str,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let e = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e.redact(redactor),
        };

        if !e.is_retryable() {
            return Err(e);
        }
        if attempt >= max_attempts {
            tracing::warn!(
                operation,
                attempts = attempt,
                error = %e,
                "Retry budget exhausted",
            );
            return Err(e);
        }

        let delay = policy.delay_with_jitter(attempt - 1);
        tracing::warn!(
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "Transient failure, backing off",
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
