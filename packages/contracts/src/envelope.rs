//! Message envelope and the tagged task payload union.
//!
//! A single transport shape wraps every inter-agent payload. The `task` tag
//! inside the payload names the capability being invoked; the correlation id
//! persists across reflection iterations (the incident id is the natural
//! correlation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ContractValidationError, Violations};
use crate::types::{
    ExecuteRequest, InvestigateRequest, PlanRequest, ThreatHuntRequest, TriageRequest,
    VerifyRequest,
};

/// Wire envelope for every A2A message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: String,
    pub payload: TaskPayload,
}

impl Envelope {
    /// Wrap a payload, stamping a fresh message id and the current time.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        correlation_id: impl Into<String>,
        payload: TaskPayload,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            timestamp: Utc::now(),
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Check the envelope is complete before transmission.
    ///
    /// Accumulates every missing field rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ContractValidationError> {
        let mut violations = Violations::new("envelope");

        if self.message_id.is_empty() {
            violations.push("message_id must not be empty");
        }
        if self.from_agent.is_empty() {
            violations.push("from_agent must not be empty");
        }
        if self.to_agent.is_empty() {
            violations.push("to_agent must not be empty");
        }
        if self.correlation_id.is_empty() {
            violations.push("correlation_id must not be empty");
        }
        if self.payload.task_name().is_empty() {
            violations.push("payload.task must not be empty");
        }

        violations.finish()
    }

    /// Validate an incoming wire value has the envelope shape.
    pub fn validate_value(value: &serde_json::Value) -> Result<(), ContractValidationError> {
        let mut violations = Violations::new("envelope");

        for field in [
            "message_id",
            "from_agent",
            "to_agent",
            "timestamp",
            "correlation_id",
        ] {
            if value.get(field).map_or(true, serde_json::Value::is_null) {
                violations.push(format!("missing field {}", field));
            }
        }
        match value.get("payload") {
            None => violations.push("missing field payload"),
            Some(payload) => {
                if payload.get("task").and_then(serde_json::Value::as_str).is_none() {
                    violations.push("payload.task must be a string");
                }
            }
        }

        violations.finish()
    }
}

/// Payload for a workflow-agent task that carries free-form arguments
/// (approval requests, notifications, report triggers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPayload {
    #[serde(flatten)]
    pub args: serde_json::Value,
}

/// The capability being invoked, tagged into the payload as `task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskPayload {
    Triage(TriageRequest),
    Investigate(InvestigateRequest),
    ThreatHunt(ThreatHuntRequest),
    PlanRemediation(PlanRequest),
    ExecutePlan(ExecuteRequest),
    VerifyResolution(VerifyRequest),
    ExecuteAction(WorkflowPayload),
    RequestApproval(WorkflowPayload),
    Notify(WorkflowPayload),
    GenerateReport(WorkflowPayload),
    RunRetrospective(WorkflowPayload),
}

impl TaskPayload {
    /// The wire value of the `task` tag.
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Triage(_) => "triage",
            Self::Investigate(_) => "investigate",
            Self::ThreatHunt(_) => "threat_hunt",
            Self::PlanRemediation(_) => "plan_remediation",
            Self::ExecutePlan(_) => "execute_plan",
            Self::VerifyResolution(_) => "verify_resolution",
            Self::ExecuteAction(_) => "execute_action",
            Self::RequestApproval(_) => "request_approval",
            Self::Notify(_) => "notify",
            Self::GenerateReport(_) => "generate_report",
            Self::RunRetrospective(_) => "run_retrospective",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::build_triage_request;

    fn sample_envelope() -> Envelope {
        Envelope::new(
            "coordinator",
            "triage",
            "INC-2026-A1B2C",
            TaskPayload::Triage(build_triage_request(
                "a-1",
                "rule-7",
                "high",
                serde_json::json!({"source_ip": "10.0.0.4"}),
            )),
        )
    }

    #[test]
    fn test_envelope_roundtrip_preserves_payload() {
        let envelope = sample_envelope();
        let wire = serde_json::to_value(&envelope).unwrap();
        let back: Envelope = serde_json::from_value(wire.clone()).unwrap();

        assert_eq!(wire["payload"]["task"], "triage");
        assert_eq!(
            serde_json::to_value(&back.payload).unwrap(),
            wire["payload"]
        );
    }

    #[test]
    fn test_task_tag_matches_task_name() {
        let envelope = sample_envelope();
        let wire = serde_json::to_value(&envelope).unwrap();

        assert_eq!(wire["payload"]["task"], envelope.payload.task_name());
    }

    #[test]
    fn test_validate_accumulates_all_missing_fields() {
        let result = Envelope::validate_value(&serde_json::json!({
            "message_id": "m-1",
            "payload": {"no_task": true}
        }));

        let err = result.unwrap_err();
        // from_agent, to_agent, timestamp, correlation_id, payload.task
        assert_eq!(err.errors.len(), 5);
    }

    #[test]
    fn test_validate_complete_envelope() {
        assert!(sample_envelope().validate().is_ok());
    }

    #[test]
    fn test_correlation_id_survives_rewrap() {
        let first = sample_envelope();
        let second = Envelope::new(
            "coordinator",
            "investigator",
            first.correlation_id.clone(),
            TaskPayload::Investigate(crate::types::build_investigate_request(
                "INC-2026-A1B2C",
                vec!["a-1".into()],
                "security",
                None,
                Some("Host still reachable".into()),
            )),
        );

        assert_eq!(first.correlation_id, second.correlation_id);
        assert_ne!(first.message_id, second.message_id);
    }
}
