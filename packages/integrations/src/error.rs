//! Integration error with retry classification.

/// A third-party call failed.
///
/// `retryable` drives both the caller's retry decision and the integration
/// circuit breaker, which only counts retryable failures.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{integration}: {message}")]
pub struct IntegrationError {
    pub integration: &'static str,
    pub message: String,
    pub retryable: bool,
    /// Server-requested delay before retrying, in seconds.
    pub retry_after: Option<u64>,
}

impl IntegrationError {
    pub fn permanent(integration: &'static str, message: impl Into<String>) -> Self {
        Self {
            integration,
            message: message.into(),
            retryable: false,
            retry_after: None,
        }
    }

    pub fn transient(integration: &'static str, message: impl Into<String>) -> Self {
        Self {
            integration,
            message: message.into(),
            retryable: true,
            retry_after: None,
        }
    }

    pub fn rate_limited(
        integration: &'static str,
        message: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        Self {
            integration,
            message: message.into(),
            retryable: true,
            retry_after,
        }
    }
}
