//! Bounded retry with exponential backoff and jitter
//!
//! Transient provider errors (timeout, 429, 5xx, network) are retried a
//! bounded number of times; exhausted retries escalate to
//! `ProviderUnavailable`. Malformed responses and cancellations are never
//! retried. The loop is explicit, with no recursion, and every sleep races
//! the run-scoped cancellation token, so tests can drive it under paused
//! time.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_util::sync::CancellationToken;

const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(10);

/// Backoff delay sequence: exponential from `base`, jittered, capped at
/// ten seconds, `retries` entries long.
pub fn backoff_delays(base: Duration, retries: u32) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(base.as_millis().max(1) as u64)
        .factor(2)
        .max_delay(MAX_BACKOFF_DELAY)
        .map(jitter)
        .take(retries as usize)
}

/// Drive `op` until it succeeds, fails terminally, exhausts its retries,
/// or the token is cancelled.
pub async fn retry_transient<T, F, Fut>(
    delays: impl IntoIterator<Item = Duration>,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut delays = delays.into_iter();
    loop {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        // Dropping the in-flight future on cancellation aborts the call.
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            outcome = op() => outcome,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => match delays.next() {
                Some(delay) => {
                    tracing::debug!(?delay, error = %err, "transient provider error, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    return Err(ProviderError::Unavailable(format!(
                        "retries exhausted: {}",
                        err
                    )))
                }
            },
            Err(err) => return Err(err),
        }
    }
}
