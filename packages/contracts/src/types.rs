//! Request/response contract types for the six specialist agents.
//!
//! Builders produce exactly the fields the validators require; optional
//! fields are omitted from the wire form when absent.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Triage
// ---------------------------------------------------------------------------

/// Request to the Triage agent: score and disposition a raw alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageRequest {
    pub alert_id: String,
    pub rule_id: String,
    pub severity_original: String,
    /// Full alert source for context (source_ip, source_user, asset).
    pub alert: serde_json::Value,
}

/// Build a triage request from a claimed alert document.
pub fn build_triage_request(
    alert_id: impl Into<String>,
    rule_id: impl Into<String>,
    severity_original: impl Into<String>,
    alert: serde_json::Value,
) -> TriageRequest {
    TriageRequest {
        alert_id: alert_id.into(),
        rule_id: rule_id.into(),
        severity_original: severity_original.into(),
        alert,
    }
}

/// Triage verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResponse {
    /// 0.0–1.0; below the suppress threshold the incident never opens.
    pub priority_score: f64,
    /// `investigate` | `queue` | `suppress`.
    pub disposition: String,
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

// ---------------------------------------------------------------------------
// Investigate
// ---------------------------------------------------------------------------

/// Request to the Investigator.
///
/// On reflection iterations `previous_failure_analysis` carries the most
/// recent Verifier failure so the re-investigation starts from what went
/// wrong, not from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigateRequest {
    pub incident_id: String,
    pub alert_ids: Vec<String>,
    pub incident_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_services: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_failure_analysis: Option<String>,
}

pub fn build_investigate_request(
    incident_id: impl Into<String>,
    alert_ids: Vec<String>,
    incident_type: impl Into<String>,
    affected_services: Option<Vec<String>>,
    previous_failure_analysis: Option<String>,
) -> InvestigateRequest {
    InvestigateRequest {
        incident_id: incident_id.into(),
        alert_ids,
        incident_type: incident_type.into(),
        affected_services,
        previous_failure_analysis,
    }
}

/// Investigator findings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigateResponse {
    pub investigation_summary: String,
    /// Assets the Investigator believes are impacted.
    #[serde(default)]
    pub blast_radius: Vec<String>,
    /// Services the incident touches, used for planning and verification.
    #[serde(default)]
    pub affected_services: Vec<String>,
    /// `plan_remediation` | `threat_hunt` | `escalate`.
    pub recommended_next: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

// ---------------------------------------------------------------------------
// Threat hunt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatHuntRequest {
    pub incident_id: String,
    /// Assets to sweep, seeded from the Investigator's blast radius.
    pub blast_radius: Vec<String>,
}

pub fn build_threat_hunt_request(
    incident_id: impl Into<String>,
    blast_radius: Vec<String>,
) -> ThreatHuntRequest {
    ThreatHuntRequest {
        incident_id: incident_id.into(),
        blast_radius,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatHuntResponse {
    /// Assets with confirmed compromise indicators.
    #[serde(default)]
    pub confirmed_compromised: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub findings: Option<String>,
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub incident_id: String,
    pub incident_type: String,
    pub severity: String,
    pub investigation_summary: String,
    pub affected_services: Vec<String>,
}

pub fn build_plan_request(
    incident_id: impl Into<String>,
    incident_type: impl Into<String>,
    severity: impl Into<String>,
    investigation_summary: impl Into<String>,
    affected_services: Vec<String>,
) -> PlanRequest {
    PlanRequest {
        incident_id: incident_id.into(),
        incident_type: incident_type.into(),
        severity: severity.into(),
        investigation_summary: investigation_summary.into(),
        affected_services,
    }
}

/// One planned remediation action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedAction {
    pub action_type: String,
    pub description: String,
    pub target_system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_asset: Option<String>,
    /// Execution position; the Executor sorts ascending.
    pub order: i64,
    pub approval_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Operator for a success criterion threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionOperator {
    Lte,
    Gte,
    Eq,
}

impl CriterionOperator {
    /// Apply the operator to `(current, threshold)`.
    pub fn evaluate(self, current: f64, threshold: f64) -> bool {
        match self {
            Self::Lte => current <= threshold,
            Self::Gte => current >= threshold,
            Self::Eq => (current - threshold).abs() < f64::EPSILON,
        }
    }
}

/// A measurable condition the Verifier checks after remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessCriterion {
    pub metric: String,
    pub operator: CriterionOperator,
    pub threshold: f64,
    pub service_name: String,
}

/// Commander output: the remediation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<String>,
    pub actions: Vec<PlannedAction>,
    pub success_criteria: Vec<SuccessCriterion>,
}

impl PlanResponse {
    /// Whether any action needs the human approval gate.
    pub fn requires_approval(&self) -> bool {
        self.actions.iter().any(|a| a.approval_required)
    }
}

// ---------------------------------------------------------------------------
// Execute
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub incident_id: String,
    pub actions: Vec<PlannedAction>,
}

pub fn build_execute_request(
    incident_id: impl Into<String>,
    actions: Vec<PlannedAction>,
) -> ExecuteRequest {
    ExecuteRequest {
        incident_id: incident_id.into(),
        actions,
    }
}

/// Terminal state of one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one action attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action_id: String,
    pub action_type: String,
    pub execution_status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// Executor output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// `completed` | `partial_failure` | `failed`.
    pub status: String,
    pub actions_completed: u32,
    pub action_results: Vec<ActionResult>,
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub incident_id: String,
    pub affected_services: Vec<String>,
    pub success_criteria: Vec<SuccessCriterion>,
}

pub fn build_verify_request(
    incident_id: impl Into<String>,
    affected_services: Vec<String>,
    success_criteria: Vec<SuccessCriterion>,
) -> VerifyRequest {
    VerifyRequest {
        incident_id: incident_id.into(),
        affected_services,
        success_criteria,
    }
}

/// Per-criterion verdict with the observed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionResult {
    pub metric: String,
    pub service_name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_value: Option<f64>,
}

/// Verifier output.
///
/// `passed = false` always carries a `failure_analysis` — that string seeds
/// the next reflection iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub passed: bool,
    /// 0.0–1.0, fraction of criteria that passed.
    pub health_score: f64,
    pub criteria_results: Vec<CriterionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_analysis: Option<String>,
    /// 1-based verification attempt (`reflection_count + 1`).
    pub iteration: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_evaluate() {
        assert!(CriterionOperator::Lte.evaluate(0.01, 0.05));
        assert!(!CriterionOperator::Lte.evaluate(0.1, 0.05));
        assert!(CriterionOperator::Gte.evaluate(120.0, 100.0));
        assert!(CriterionOperator::Eq.evaluate(1.0, 1.0));
        assert!(!CriterionOperator::Eq.evaluate(1.0, 1.1));
    }

    #[test]
    fn test_plan_requires_approval() {
        let plan = PlanResponse {
            remediation_plan: None,
            actions: vec![
                PlannedAction {
                    action_type: "restart_service".into(),
                    description: "Restart checkout".into(),
                    target_system: "kubernetes".into(),
                    target_asset: None,
                    order: 1,
                    approval_required: false,
                    parameters: None,
                },
                PlannedAction {
                    action_type: "isolate_host".into(),
                    description: "Isolate web-42".into(),
                    target_system: "network".into(),
                    target_asset: Some("web-42".into()),
                    order: 2,
                    approval_required: true,
                    parameters: None,
                },
            ],
            success_criteria: vec![],
        };

        assert!(plan.requires_approval());
    }

    #[test]
    fn test_optional_fields_omitted_on_wire() {
        let request = build_investigate_request("INC-2026-A1B2C", vec!["a-1".into()], "security", None, None);
        let wire = serde_json::to_value(&request).unwrap();

        assert!(wire.get("previous_failure_analysis").is_none());
        assert!(wire.get("affected_services").is_none());
    }
}
