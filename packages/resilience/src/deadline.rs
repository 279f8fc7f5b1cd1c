//! Deadline race helper.
//!
//! The Executor and Verifier both run their work under a wall-clock budget:
//! the operation races a timer, and when the timer wins the operation's
//! cancellation token is cancelled *before* the synthetic deadline error is
//! returned. Non-deadline errors from the operation pass through unchanged so
//! callers can tell "ran out of time" from "actually broke".

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Outcome of a deadline race that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum DeadlineError<E> {
    #[error("{context} deadline exceeded after {deadline_ms}ms")]
    Elapsed { context: String, deadline_ms: u64 },

    #[error(transparent)]
    Inner(E),
}

impl<E> DeadlineError<E> {
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::Elapsed { .. })
    }
}

/// Race `op` against `deadline_ms`.
///
/// `op` receives a token it must observe at its own suspension points; the
/// token is cancelled the moment the deadline fires.
pub async fn run_with_deadline<T, E, F, Fut>(
    deadline_ms: u64,
    context: &str,
    op: F,
) -> Result<T, DeadlineError<E>>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let token = CancellationToken::new();
    let op_future = op(token.clone());

    tokio::select! {
        result = op_future => result.map_err(DeadlineError::Inner),
        _ = tokio::time::sleep(Duration::from_millis(deadline_ms)) => {
            token.cancel();
            tracing::warn!(context, deadline_ms, "operation hit deadline");
            Err(DeadlineError::Elapsed {
                context: context.to_string(),
                deadline_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result: Result<u32, DeadlineError<&str>> =
            run_with_deadline(1000, "fast op", |_| async { Ok(7) }).await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_deadline_fires_and_cancels() {
        let result: Result<(), DeadlineError<&str>> =
            run_with_deadline(20, "slow op", |token| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                // Unreachable within the test, but the select drops us anyway.
                assert!(token.is_cancelled());
                Ok(())
            })
            .await;

        match result {
            Err(DeadlineError::Elapsed {
                context,
                deadline_ms,
            }) => {
                assert_eq!(context, "slow op");
                assert_eq!(deadline_ms, 20);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_inner_error_reported_distinctly() {
        let result: Result<(), DeadlineError<&str>> =
            run_with_deadline(1000, "broken op", |_| async { Err("boom") }).await;

        match result {
            Err(DeadlineError::Inner(e)) => assert_eq!(e, "boom"),
            other => panic!("deadline mislabeled a real error: {:?}", other),
        }
    }
}
