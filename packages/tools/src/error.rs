//! Tool executor errors.

use vigil_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool {tool} not found")]
    NotFound { tool: String },

    #[error("tool {tool} definition unreadable: {reason}")]
    Definition { tool: String, reason: String },

    #[error("tool {tool}: required parameter {name} missing")]
    MissingParameter { tool: String, name: String },

    #[error("tool {tool}: parameter {name} invalid: {reason}")]
    InvalidParameter {
        tool: String,
        name: String,
        reason: String,
    },

    /// The engine rejected the query for reasons other than an unsupported
    /// lookup command.
    #[error("tool {tool} query failed with status {status}: {reason}")]
    Query {
        tool: String,
        status: u16,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
