//! Executor errors.

use vigil_contracts::ContractValidationError;
use vigil_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Envelope or plan shape wrong; nothing was executed.
    #[error(transparent)]
    Validation(#[from] ContractValidationError),

    /// The approval-response index could not be polled three times in a row.
    #[error("approval polling failed for action {action_id}: {reason}")]
    ApprovalPolling { action_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
