//! The incident document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Incident lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Detected,
    Triaged,
    Suppressed,
    Investigating,
    ThreatHunting,
    Planning,
    AwaitingApproval,
    Executing,
    Verifying,
    Reflecting,
    Resolved,
    Escalated,
}

impl IncidentStatus {
    /// Wire/document form of the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Triaged => "triaged",
            Self::Suppressed => "suppressed",
            Self::Investigating => "investigating",
            Self::ThreatHunting => "threat_hunting",
            Self::Planning => "planning",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Reflecting => "reflecting",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Suppressed | Self::Escalated)
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The central incident document, keyed by `incident_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDoc {
    pub incident_id: String,
    pub status: IncidentStatus,
    /// `security` or `operational`.
    pub incident_type: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_score: Option<f64>,
    pub alert_ids: Vec<String>,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<String>,
    /// One entry per verify call; reflection appends.
    #[serde(default)]
    pub verification_results: Vec<serde_json::Value>,
    #[serde(default)]
    pub reflection_count: u32,
    /// Latch: once true, no further escalation notifications go out.
    #[serde(default)]
    pub escalation_triggered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    /// Written by the approval webhook, polled by the Coordinator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// First-entry timestamp per state; never overwritten on re-entry.
    #[serde(rename = "_state_timestamps", default)]
    pub state_timestamps: BTreeMap<String, DateTime<Utc>>,
}

impl IncidentDoc {
    /// Fresh incident in `detected`, with its first state timestamp set.
    pub fn new(
        incident_id: impl Into<String>,
        incident_type: impl Into<String>,
        severity: impl Into<String>,
        alert_ids: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let mut state_timestamps = BTreeMap::new();
        state_timestamps.insert(IncidentStatus::Detected.as_str().to_string(), now);

        Self {
            incident_id: incident_id.into(),
            status: IncidentStatus::Detected,
            incident_type: incident_type.into(),
            severity: severity.into(),
            priority_score: None,
            alert_ids,
            affected_services: Vec::new(),
            investigation_summary: None,
            remediation_plan: None,
            verification_results: Vec::new(),
            reflection_count: 0,
            escalation_triggered: false,
            escalation_reason: None,
            approval_status: None,
            resolution_type: None,
            resolved_at: None,
            created_at: now,
            state_timestamps,
        }
    }
}
