//! A2A error taxonomy.

use vigil_contracts::ContractValidationError;

/// Failures on the agent-to-agent path.
#[derive(Debug, thiserror::Error)]
pub enum A2aError {
    /// Envelope was malformed; nothing was transmitted.
    #[error(transparent)]
    Envelope(#[from] ContractValidationError),

    #[error("agent card unavailable for {agent_id}: {reason}")]
    CardUnavailable { agent_id: String, reason: String },

    /// The resolved card does not advertise the requested task. Hard error —
    /// the message is never sent.
    #[error("agent {agent_id} does not support task {task}")]
    CapabilityMissing { agent_id: String, task: String },

    #[error("agent {agent_id} timed out after {timeout_ms}ms")]
    AgentTimeout { agent_id: String, timeout_ms: u64 },

    /// The agent responded with an error status (after the retry for 5xx).
    #[error("agent {agent_id} responded with status {status}")]
    Agent {
        agent_id: String,
        status: u16,
        body: Option<String>,
    },

    #[error("transport error calling {agent_id}: {message}")]
    Transport { agent_id: String, message: String },
}

impl A2aError {
    /// Whether the failure is plausibly transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AgentTimeout { .. } | Self::Transport { .. } => true,
            Self::Agent { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
