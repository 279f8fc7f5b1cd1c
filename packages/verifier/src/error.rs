//! Verifier errors.

use vigil_contracts::ContractValidationError;
use vigil_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// Request shape wrong; verification never starts.
    #[error(transparent)]
    Validation(#[from] ContractValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
