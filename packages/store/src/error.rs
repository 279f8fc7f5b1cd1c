//! Storage error taxonomy.

/// Errors surfaced by the storage client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document {id} not found in {index}")]
    NotFound { index: String, id: String },

    /// Conditional write lost the race; re-read and reconcile.
    #[error("version conflict writing {id} in {index}")]
    VersionConflict { index: String, id: String },

    #[error("storage request failed with status {status}: {reason}")]
    Request { status: u16, reason: String },

    #[error("storage transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed storage response: {0}")]
    Malformed(String),

    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether retrying the same request can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Request { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
