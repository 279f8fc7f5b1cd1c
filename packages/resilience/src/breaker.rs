//! Time-windowed circuit breaker for agent and tool calls.
//!
//! Failure timestamps are kept in a sliding window; entries older than the
//! window are pruned on every touch. The breaker opens once the window holds
//! `failure_threshold` failures, and after `recovery_ms` admits exactly one
//! probe — concurrent probers beyond the first fast-fail until the probe
//! settles. Successes while closed do not clear recorded failures; only
//! window aging does.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Tunables for the windowed breaker.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Sliding window for counting failures.
    pub window_ms: i64,
    /// Failures within the window that open the circuit.
    pub failure_threshold: usize,
    /// Time open before a single probe is allowed.
    pub recovery_ms: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_ms: 300_000,
            failure_threshold: 3,
            recovery_ms: 60_000,
        }
    }
}

/// Refused call: the circuit is open.
#[derive(Debug, Clone, thiserror::Error)]
#[error("circuit breaker {name} is open")]
pub struct CircuitOpen {
    pub name: String,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: Vec<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Sliding-window circuit breaker.
#[derive(Debug)]
pub struct AgentCircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl AgentCircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: Vec::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Ask permission to make a call.
    ///
    /// In `Open`, once `recovery_ms` has elapsed the first caller becomes the
    /// probe and is admitted; everyone else keeps fast-failing until the
    /// probe reports back.
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock();
        self.prune(&mut inner);

        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(self.open_error())
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
            BreakerState::Open => {
                let recovered = inner.opened_at.is_some_and(|at| {
                    Utc::now() - at >= ChronoDuration::milliseconds(self.config.recovery_ms)
                });
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(breaker = %self.name, "circuit half-open, admitting probe");
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
        }
    }

    /// Record the outcome of an admitted call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures.clear();
                inner.opened_at = None;
                inner.probe_in_flight = false;
                tracing::info!(breaker = %self.name, "circuit closed after successful probe");
            }
            // Closed successes do not erase windowed failures; aging does.
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Utc::now();
        inner.failures.push(now);
        self.prune(&mut inner);

        match inner.state {
            BreakerState::Closed => {
                if inner.failures.len() >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failures.len(),
                        window_ms = self.config.window_ms,
                        "circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
                tracing::warn!(breaker = %self.name, "circuit reopened, probe failed");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        self.prune(&mut inner);
        inner.state
    }

    fn prune(&self, inner: &mut BreakerInner) {
        let cutoff = Utc::now() - ChronoDuration::milliseconds(self.config.window_ms);
        inner.failures.retain(|t| *t > cutoff);
    }

    fn open_error(&self) -> CircuitOpen {
        CircuitOpen {
            name: self.name.clone(),
        }
    }
}
