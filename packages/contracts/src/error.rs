//! Contract validation error.

/// All violations found while validating one payload against one contract.
///
/// Validators never short-circuit: `errors` carries every problem found in a
/// single pass so the offending agent gets the full picture at once.
#[derive(Debug, Clone, thiserror::Error)]
#[error("contract {contract} validation failed: {}", .errors.join("; "))]
pub struct ContractValidationError {
    /// Which contract was being validated (e.g. `triage_response`).
    pub contract: &'static str,
    /// One message per violation.
    pub errors: Vec<String>,
}

impl ContractValidationError {
    pub fn new(contract: &'static str, errors: Vec<String>) -> Self {
        Self { contract, errors }
    }
}

/// Accumulator used by the validators.
///
/// Collects violations and only converts to an error at the end, so one
/// validation pass reports everything wrong with the payload.
#[derive(Debug)]
pub struct Violations {
    contract: &'static str,
    errors: Vec<String>,
}

impl Violations {
    pub fn new(contract: &'static str) -> Self {
        Self {
            contract,
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the accumulator: `Ok(())` when clean, the full error otherwise.
    pub fn finish(self) -> Result<(), ContractValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ContractValidationError::new(self.contract, self.errors))
        }
    }
}
