//! Shared token-bucket rate limiter
//!
//! One instance gates every outbound provider call, across all addresses
//! syncing concurrently: global backpressure, not per-connection. Tokens
//! refill lazily from elapsed time using integer nanosecond math. The lock
//! protects only the token count; it is never held across a sleep.

use crate::error::ProviderError;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Token bucket with a bounded acquire wait.
pub struct RateLimiter {
    /// Tokens added per second; 0 disables limiting entirely.
    rate: u32,
    /// Bucket capacity (burst allowance).
    capacity: u64,
    /// Longest a caller may wait for a token before `RateLimited`.
    max_wait: Duration,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter granting `rate` tokens per second with `burst`
    /// capacity. A rate of 0 means unlimited throughput.
    pub fn new(rate: u32, burst: u32, max_wait: Duration) -> Self {
        let capacity = u64::from(burst.max(1));
        Self {
            rate,
            capacity,
            max_wait,
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Unlimited limiter, for tests and un-throttled configurations.
    pub fn unlimited() -> Self {
        Self::new(0, 1, Duration::ZERO)
    }

    /// Acquire one token, waiting up to the configured bound.
    pub async fn acquire(&self) -> Result<(), ProviderError> {
        if self.rate == 0 {
            return Ok(());
        }
        let deadline = Instant::now() + self.max_wait;
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    return Ok(());
                }
                let per_token = Duration::from_nanos(NANOS_PER_SEC / u64::from(self.rate));
                (bucket.last_refill + per_token).saturating_duration_since(Instant::now())
            };
            if Instant::now() + wait > deadline {
                return Err(ProviderError::RateLimited);
            }
            tokio::time::sleep(wait).await;
        }
    }

    /// Add whole tokens earned since the last refill. The refill anchor
    /// advances only by the time those tokens account for, so fractional
    /// progress is never discarded.
    fn refill(&self, bucket: &mut Bucket) {
        let elapsed = bucket.last_refill.elapsed().as_nanos() as u64;
        let earned = elapsed * u64::from(self.rate) / NANOS_PER_SEC;
        if earned == 0 {
            return;
        }
        bucket.tokens = (bucket.tokens + earned).min(self.capacity);
        bucket.last_refill += Duration::from_nanos(earned * NANOS_PER_SEC / u64::from(self.rate));
    }
}
