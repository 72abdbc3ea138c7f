//! Circuit breaker for provider calls
//!
//! Opens after a configured number of consecutive failures, short-circuits
//! calls while open, and allows a single half-open probe once the cooldown
//! elapses. Instances are injected (`Arc`) rather than process-global so
//! concurrent runs share one breaker and tests can isolate their own.

use crate::error::ProviderError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    /// Gate a call. While open, fails fast with `ProviderUnavailable`;
    /// after the cooldown the first caller through becomes the half-open
    /// probe.
    pub fn check(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            State::Closed { .. } | State::HalfOpen => Ok(()),
            State::Open { until } => {
                if Instant::now() >= until {
                    *state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(ProviderError::Unavailable("circuit breaker open".into()))
                }
            }
        }
    }

    /// Record a successful call: closes the breaker and resets the
    /// failure count.
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        *state = State::Closed { failures: 0 };
    }

    /// Record a failed call. A failed half-open probe re-opens immediately.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        match *state {
            State::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    *state = State::Open {
                        until: Instant::now() + self.cooldown,
                    };
                } else {
                    *state = State::Closed { failures };
                }
            }
            State::HalfOpen => {
                *state = State::Open {
                    until: Instant::now() + self.cooldown,
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Whether the breaker is currently open (for logging/reporting).
    pub fn is_open(&self) -> bool {
        matches!(
            *self.state.lock().expect("breaker lock poisoned"),
            State::Open { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        for _ in 0..4 {
            breaker.record_failure();
            assert!(breaker.check().is_ok());
        }
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(matches!(
            breaker.check().unwrap_err(),
            ProviderError::Unavailable(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        // Still below threshold because of the reset.
        assert!(breaker.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        assert!(breaker.check().is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        // Cooldown elapsed: one probe allowed.
        assert!(breaker.check().is_ok());
        breaker.record_success();
        assert!(breaker.check().is_ok());
        assert!(!breaker.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(10));
        breaker.record_failure();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(breaker.check().is_ok());
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(breaker.check().is_err());
    }
}
