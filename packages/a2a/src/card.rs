//! Agent cards.

use serde::{Deserialize, Serialize};

/// Well-known agent ids in the Vigil runtime.
pub mod agents {
    pub const TRIAGE: &str = "triage";
    pub const INVESTIGATOR: &str = "investigator";
    pub const THREAT_HUNTER: &str = "threat-hunter";
    pub const COMMANDER: &str = "commander";
    pub const EXECUTOR: &str = "executor";
    pub const VERIFIER: &str = "verifier";
    pub const SENTINEL: &str = "sentinel";
    pub const APPROVAL_WORKFLOW: &str = "approval-workflow";
    pub const NOTIFICATION_WORKFLOW: &str = "notification-workflow";
    pub const REPORTING_WORKFLOW: &str = "reporting-workflow";
    pub const ANALYST: &str = "analyst";

    /// Default discovery set.
    pub const ALL: &[&str] = &[
        TRIAGE,
        INVESTIGATOR,
        THREAT_HUNTER,
        COMMANDER,
        EXECUTOR,
        VERIFIER,
        SENTINEL,
        APPROVAL_WORKFLOW,
        NOTIFICATION_WORKFLOW,
        REPORTING_WORKFLOW,
        ANALYST,
    ];
}

/// One advertised capability. Cards from older agents list bare task names;
/// newer ones attach a schema description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capability {
    Name(String),
    Detailed {
        task: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Capability {
    pub fn task(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Detailed { task, .. } => task,
        }
    }
}

/// An agent's self-description, fetched at discovery time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub agent_id: String,
    pub name: String,
    pub version: String,
    /// Absent means the card does not gate tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<Capability>>,
    /// Relative path, joined with the runtime base URL.
    pub endpoint: String,
}

impl AgentCard {
    /// Whether the agent can handle `task`.
    ///
    /// A card without a capability set accepts everything; the gate only
    /// applies when the agent declares what it speaks.
    pub fn supports(&self, task: &str) -> bool {
        match &self.capabilities {
            None => true,
            Some(capabilities) => capabilities.iter().any(|c| c.task() == task),
        }
    }
}
