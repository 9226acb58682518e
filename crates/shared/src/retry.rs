//! Retry helpers with exponential backoff.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first try).
    pub max_attempts: u32,
    /// Base delay for backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter ratio as percentage (0..=100).
    pub jitter_ratio_pct: u32,
}

impl RetryPolicy {
    /// Doubling backoff without jitter: `base, 2*base, 4*base, ...`.
    ///
    /// `retries` counts the attempts after the first one.
    #[must_use]
    pub const fn exponential(retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay_ms,
            max_delay_ms: u64::MAX,
            jitter_ratio_pct: 0,
        }
    }

    /// Delay slept after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(self, attempt: u32) -> Duration {
        let pow = attempt.saturating_sub(1).min(30);
        let base = self.base_delay_ms.saturating_mul(1u64 << pow);
        let capped = base.min(self.max_delay_ms);
        let jitter_pct = u64::from(self.jitter_ratio_pct.min(100));
        if jitter_pct == 0 {
            return Duration::from_millis(capped);
        }

        let jitter_range =
            i64::try_from(capped.saturating_mul(jitter_pct) / 100).unwrap_or(i64::MAX);
        let unit = i64::try_from(jitter_seed(attempt) % 1000).unwrap_or(0) - 500;
        let offset = jitter_range.saturating_mul(unit) / 500;
        let capped_i64 = i64::try_from(capped).unwrap_or(i64::MAX);
        let max_i64 = i64::try_from(self.max_delay_ms).unwrap_or(i64::MAX);
        let jittered = capped_i64.saturating_add(offset).clamp(0, max_i64);
        Duration::from_millis(u64::try_from(jittered).unwrap_or(0))
    }
}

/// Retry a fallible async operation with backoff.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _, _| {}).await
}

/// Retry with a callback invoked before each backoff sleep.
///
/// The observer receives the failed attempt number, its error and the delay
/// about to be slept. Non-retriable errors and the final attempt's error are
/// returned without notifying the observer.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &'static str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope, Duration),
{
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retriable() || attempt >= policy.max_attempts {
                    return Err(error.with_metadata("attempts", attempt.to_string()));
                }

                let delay = policy.delay_after(attempt);
                on_retry(attempt, &error, delay);
                sleep_with_cancellation(ctx, delay, operation).await?;
            },
        }
    }
}

fn jitter_seed(attempt: u32) -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| u64::from(duration.subsec_nanos()));
    nanos ^ u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

async fn sleep_with_cancellation(
    ctx: &RequestContext,
    delay: Duration,
    operation: &'static str,
) -> Result<()> {
    tokio::select! {
        () = ctx.cancelled() => {
            let error = ErrorEnvelope::cancelled("operation cancelled");
            Err(error.with_metadata("operation", operation))
        }
        () = tokio::time::sleep(delay) => Ok(()),
    }
}
