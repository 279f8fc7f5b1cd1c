//! Generic retry with backoff, timeout, and cancellation.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed { delay_ms: u64 },
    /// `base_ms * 2^(attempt-1)`, capped at `max_ms`.
    Exponential { base_ms: u64, max_ms: u64 },
}

/// Retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Per-attempt timeout. On expiry the attempt's token is cancelled
    /// before the failure is recorded.
    pub timeout_ms: Option<u64>,
    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay_ms },
            timeout_ms: None,
            jitter: false,
        }
    }

    pub fn exponential(max_attempts: u32, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base_ms, max_ms },
            timeout_ms: None,
            jitter: true,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Delay before the next attempt, given the 1-based attempt that failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed { delay_ms } => delay_ms,
            Backoff::Exponential { base_ms, max_ms } => {
                let shift = attempt.saturating_sub(1).min(16);
                base_ms.saturating_mul(1u64 << shift).min(max_ms)
            }
        };
        let jittered = if self.jitter && base > 0 {
            use rand::Rng;
            base + rand::rng().random_range(0..=base / 10)
        } else {
            base
        };
        Duration::from_millis(jittered)
    }
}

/// Retry failure.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("all {attempts} attempts failed: {source}")]
    Exhausted { attempts: u32, source: E },

    #[error("attempt timed out after {timeout_ms}ms on all {attempts} attempts")]
    TimedOut { attempts: u32, timeout_ms: u64 },

    #[error("retry cancelled")]
    Cancelled,
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// Each attempt receives a fresh child of `parent` so an aborted attempt
/// cannot poison the next one; aborts are observed both inside attempts
/// (via the token) and during backoff sleeps.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    parent: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(CancellationToken, u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_timeout = false;
    let mut last_error: Option<E> = None;

    for attempt in 1..=policy.max_attempts {
        if parent.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let attempt_token = parent.child_token();
        let outcome = match policy.timeout_ms {
            Some(timeout_ms) => {
                let attempt_future = op(attempt_token.clone(), attempt);
                tokio::pin!(attempt_future);
                tokio::select! {
                    result = &mut attempt_future => Some(result),
                    _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                        // Abort the in-flight attempt and let it observe the
                        // signal before anything else sees the failure.
                        attempt_token.cancel();
                        let _ = tokio::time::timeout(
                            Duration::from_millis(50),
                            &mut attempt_future,
                        )
                        .await;
                        None
                    }
                }
            }
            None => Some(op(attempt_token.clone(), attempt).await),
        };

        match outcome {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                tracing::debug!(attempt, error = %e, "retry attempt failed");
                last_timeout = false;
                last_error = Some(e);
            }
            None => {
                tracing::debug!(attempt, "retry attempt timed out");
                last_timeout = true;
                last_error = None;
            }
        }

        if attempt < policy.max_attempts {
            let delay = policy.delay_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = parent.cancelled() => return Err(RetryError::Cancelled),
            }
        }
    }

    match last_error {
        Some(source) => Err(RetryError::Exhausted {
            attempts: policy.max_attempts,
            source,
        }),
        None if last_timeout => Err(RetryError::TimedOut {
            attempts: policy.max_attempts,
            timeout_ms: policy.timeout_ms.unwrap_or(0),
        }),
        None => Err(RetryError::Cancelled),
    }
}
