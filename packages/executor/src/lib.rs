//! Vigil Executor
//!
//! Runs a remediation plan one action at a time under a wall-clock deadline.
//! Approval-gated actions wait on the human decision before dispatch; a
//! failed action stops everything after it; actions cut off by the deadline
//! are recorded as skipped. Every attempted action leaves an append-only
//! audit record.

pub mod actions;
pub mod approval;
pub mod audit;
pub mod error;
pub mod handler;
pub mod http;

pub use actions::{action_category, derive_severity, ActionCategory};
pub use error::ExecutorError;
pub use handler::{Executor, ExecutorConfig};
