//! Consecutive-failure circuit breaker for third-party integrations.
//!
//! Unlike the windowed agent breaker, this one counts *consecutive retryable*
//! failures: a 4xx (non-retryable) passes through without moving the counter,
//! and any success resets it to zero. While open, calls fast-fail; after
//! `reset_timeout_ms` a half-open probe is allowed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

use crate::breaker::{BreakerState, CircuitOpen};

/// Tunables for the integration breaker.
#[derive(Debug, Clone, Copy)]
pub struct IntegrationBreakerConfig {
    /// Consecutive retryable failures that open the circuit.
    pub failure_threshold: u32,
    /// Time open before a probe is allowed.
    pub reset_timeout_ms: i64,
}

impl Default for IntegrationBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
}

/// Consecutive-failure breaker for Slack/PagerDuty style integrations.
#[derive(Debug)]
pub struct IntegrationCircuitBreaker {
    name: String,
    config: IntegrationBreakerConfig,
    inner: Mutex<Inner>,
}

impl IntegrationCircuitBreaker {
    pub fn new(name: impl Into<String>, config: IntegrationBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Ask permission to make a call. Open circuits fast-fail.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let recovered = inner.opened_at.is_some_and(|at| {
                    Utc::now() - at >= ChronoDuration::milliseconds(self.config.reset_timeout_ms)
                });
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    tracing::info!(breaker = %self.name, "integration circuit half-open");
                    Ok(())
                } else {
                    Err(CircuitOpen {
                        name: self.name.clone(),
                    })
                }
            }
        }
    }

    /// Record a successful call; resets the consecutive counter.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state != BreakerState::Closed {
            tracing::info!(breaker = %self.name, "integration circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.opened_at = None;
    }

    /// Record a failed call.
    ///
    /// Only retryable failures count toward the threshold — a deterministic
    /// 4xx will fail every time regardless of circuit state, so it neither
    /// opens the circuit nor resets the counter.
    pub fn record_failure(&self, retryable: bool) {
        if !retryable {
            return;
        }
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            BreakerState::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            BreakerState::HalfOpen => true,
            BreakerState::Open => false,
        };
        if should_open {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Utc::now());
            tracing::warn!(
                breaker = %self.name,
                consecutive = inner.consecutive_failures,
                "integration circuit opened"
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> IntegrationCircuitBreaker {
        IntegrationCircuitBreaker::new(
            "slack",
            IntegrationBreakerConfig {
                failure_threshold: threshold,
                reset_timeout_ms: 60_000,
            },
        )
    }

    #[test]
    fn test_only_retryable_failures_count() {
        let b = breaker(3);

        for _ in 0..10 {
            b.record_failure(false);
        }
        assert_eq!(b.state(), BreakerState::Closed);

        b.record_failure(true);
        b.record_failure(true);
        b.record_failure(true);
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_resets_counter() {
        let b = breaker(3);

        b.record_failure(true);
        b.record_failure(true);
        b.record_success();
        b.record_failure(true);
        b.record_failure(true);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_open_fast_fails() {
        let b = breaker(1);

        b.record_failure(true);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(b.try_acquire().is_err());
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let b = IntegrationCircuitBreaker::new(
            "pagerduty",
            IntegrationBreakerConfig {
                failure_threshold: 1,
                reset_timeout_ms: 0,
            },
        );

        b.record_failure(true);
        assert_eq!(b.state(), BreakerState::Open);

        assert!(b.try_acquire().is_ok());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let b = IntegrationCircuitBreaker::new(
            "pagerduty",
            IntegrationBreakerConfig {
                failure_threshold: 2,
                reset_timeout_ms: 0,
            },
        );

        b.record_failure(true);
        b.record_failure(true);
        assert!(b.try_acquire().is_ok());

        b.record_failure(true);
        assert_eq!(b.state(), BreakerState::Open);
    }
}
