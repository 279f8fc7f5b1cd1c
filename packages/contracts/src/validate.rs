//! Strict validators for the six contract pairs.
//!
//! Each validator inspects the wire value field by field, accumulating every
//! violation, and only deserializes into the typed struct once the shape is
//! clean. Incoming agent responses are JSON from another process; serde's
//! fail-fast deserialization would report one problem per round-trip, so the
//! field walk happens first.

use serde_json::Value;

use crate::error::{ContractValidationError, Violations};
use crate::types::{
    ExecuteRequest, ExecuteResponse, InvestigateRequest, InvestigateResponse, PlanRequest,
    PlanResponse, ThreatHuntRequest, ThreatHuntResponse, TriageRequest, TriageResponse,
    VerifyRequest, VerifyResponse,
};

const DISPOSITIONS: &[&str] = &["investigate", "queue", "suppress"];
const RECOMMENDED_NEXT: &[&str] = &["plan_remediation", "threat_hunt", "escalate"];
const EXECUTE_STATUSES: &[&str] = &["completed", "partial_failure", "failed"];
const EXECUTION_STATUSES: &[&str] = &["completed", "failed", "skipped"];
const OPERATORS: &[&str] = &["lte", "gte", "eq"];

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn require_str<'a>(v: &mut Violations, value: &'a Value, field: &str) -> Option<&'a str> {
    match value.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Some(s),
        Some(_) => {
            v.push(format!("{} must not be empty", field));
            None
        }
        None => {
            v.push(format!("{} must be a string", field));
            None
        }
    }
}

fn require_f64(v: &mut Violations, value: &Value, field: &str) -> Option<f64> {
    match value.get(field).and_then(Value::as_f64) {
        Some(n) => Some(n),
        None => {
            v.push(format!("{} must be a number", field));
            None
        }
    }
}

fn require_unit_interval(v: &mut Violations, value: &Value, field: &str) -> Option<f64> {
    let n = require_f64(v, value, field)?;
    if !(0.0..=1.0).contains(&n) {
        v.push(format!("{} must be within [0, 1], got {}", field, n));
        return None;
    }
    Some(n)
}

fn require_bool(v: &mut Violations, value: &Value, field: &str) -> Option<bool> {
    match value.get(field).and_then(Value::as_bool) {
        Some(b) => Some(b),
        None => {
            v.push(format!("{} must be a boolean", field));
            None
        }
    }
}

fn require_array<'a>(
    v: &mut Violations,
    value: &'a Value,
    field: &str,
    non_empty: bool,
) -> Option<&'a Vec<Value>> {
    match value.get(field).and_then(Value::as_array) {
        Some(items) => {
            if non_empty && items.is_empty() {
                v.push(format!("{} must not be empty", field));
                None
            } else {
                Some(items)
            }
        }
        None => {
            v.push(format!("{} must be an array", field));
            None
        }
    }
}

fn require_one_of(v: &mut Violations, value: &Value, field: &str, allowed: &[&str]) {
    if let Some(s) = value.get(field).and_then(Value::as_str) {
        if !allowed.contains(&s) {
            v.push(format!("{} must be one of {:?}, got {:?}", field, allowed, s));
        }
    } else {
        v.push(format!("{} must be one of {:?}", field, allowed));
    }
}

fn check_criterion(v: &mut Violations, item: &Value, label: &str) {
    if !item.is_object() {
        v.push(format!("{} must be an object", label));
        return;
    }
    if item.get("metric").and_then(Value::as_str).is_none() {
        v.push(format!("{}.metric must be a string", label));
    }
    if item.get("service_name").and_then(Value::as_str).is_none() {
        v.push(format!("{}.service_name must be a string", label));
    }
    if item.get("threshold").and_then(Value::as_f64).is_none() {
        v.push(format!("{}.threshold must be a number", label));
    }
    match item.get("operator").and_then(Value::as_str) {
        Some(op) if OPERATORS.contains(&op) => {}
        _ => v.push(format!("{}.operator must be one of {:?}", label, OPERATORS)),
    }
}

fn check_action(v: &mut Violations, item: &Value, label: &str) {
    if !item.is_object() {
        v.push(format!("{} must be an object", label));
        return;
    }
    if item.get("action_type").and_then(Value::as_str).is_none() {
        v.push(format!("{}.action_type must be a string", label));
    }
    if item.get("description").and_then(Value::as_str).is_none() {
        v.push(format!("{}.description must be a string", label));
    }
    if item.get("target_system").and_then(Value::as_str).is_none() {
        v.push(format!("{}.target_system must be a string", label));
    }
    if item.get("order").and_then(Value::as_i64).is_none() {
        v.push(format!("{}.order must be a number", label));
    }
    if item.get("approval_required").and_then(Value::as_bool).is_none() {
        v.push(format!("{}.approval_required must be a boolean", label));
    }
}

fn deserialize_clean<T: serde::de::DeserializeOwned>(
    contract: &'static str,
    value: &Value,
) -> Result<T, ContractValidationError> {
    serde_json::from_value(value.clone()).map_err(|e| {
        ContractValidationError::new(contract, vec![format!("deserialization failed: {}", e)])
    })
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn validate_triage_request(value: &Value) -> Result<TriageRequest, ContractValidationError> {
    let mut v = Violations::new("triage_request");
    let _ = require_str(&mut v, value, "alert_id");
    let _ = require_str(&mut v, value, "rule_id");
    let _ = require_str(&mut v, value, "severity_original");
    if value.get("alert").is_none() {
        v.push("alert must be present");
    }
    v.finish()?;
    deserialize_clean("triage_request", value)
}

pub fn validate_investigate_request(
    value: &Value,
) -> Result<InvestigateRequest, ContractValidationError> {
    let mut v = Violations::new("investigate_request");
    let _ = require_str(&mut v, value, "incident_id");
    let _ = require_str(&mut v, value, "incident_type");
    if let Some(ids) = require_array(&mut v, value, "alert_ids", true) {
        if ids.iter().any(|i| !i.is_string()) {
            v.push("alert_ids must contain only strings");
        }
    }
    v.finish()?;
    deserialize_clean("investigate_request", value)
}

pub fn validate_threat_hunt_request(
    value: &Value,
) -> Result<ThreatHuntRequest, ContractValidationError> {
    let mut v = Violations::new("threat_hunt_request");
    let _ = require_str(&mut v, value, "incident_id");
    let _ = require_array(&mut v, value, "blast_radius", false);
    v.finish()?;
    deserialize_clean("threat_hunt_request", value)
}

pub fn validate_plan_request(value: &Value) -> Result<PlanRequest, ContractValidationError> {
    let mut v = Violations::new("plan_request");
    let _ = require_str(&mut v, value, "incident_id");
    let _ = require_str(&mut v, value, "incident_type");
    let _ = require_str(&mut v, value, "severity");
    let _ = require_str(&mut v, value, "investigation_summary");
    let _ = require_array(&mut v, value, "affected_services", false);
    v.finish()?;
    deserialize_clean("plan_request", value)
}

pub fn validate_execute_request(value: &Value) -> Result<ExecuteRequest, ContractValidationError> {
    let mut v = Violations::new("execute_request");
    let _ = require_str(&mut v, value, "incident_id");
    if let Some(actions) = require_array(&mut v, value, "actions", true) {
        for (i, action) in actions.iter().enumerate() {
            check_action(&mut v, action, &format!("actions[{}]", i));
        }
    }
    v.finish()?;
    deserialize_clean("execute_request", value)
}

pub fn validate_verify_request(value: &Value) -> Result<VerifyRequest, ContractValidationError> {
    let mut v = Violations::new("verify_request");
    let _ = require_str(&mut v, value, "incident_id");
    if let Some(services) = require_array(&mut v, value, "affected_services", true) {
        if services.iter().any(|s| !s.is_string()) {
            v.push("affected_services must contain only strings");
        }
    }
    if let Some(criteria) = require_array(&mut v, value, "success_criteria", true) {
        for (i, criterion) in criteria.iter().enumerate() {
            check_criterion(&mut v, criterion, &format!("success_criteria[{}]", i));
        }
    }
    v.finish()?;
    deserialize_clean("verify_request", value)
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

pub fn validate_triage_response(value: &Value) -> Result<TriageResponse, ContractValidationError> {
    let mut v = Violations::new("triage_response");
    let _ = require_unit_interval(&mut v, value, "priority_score");
    require_one_of(&mut v, value, "disposition", DISPOSITIONS);
    let _ = require_str(&mut v, value, "severity");
    v.finish()?;
    deserialize_clean("triage_response", value)
}

pub fn validate_investigate_response(
    value: &Value,
) -> Result<InvestigateResponse, ContractValidationError> {
    let mut v = Violations::new("investigate_response");
    let _ = require_str(&mut v, value, "investigation_summary");
    require_one_of(&mut v, value, "recommended_next", RECOMMENDED_NEXT);
    v.finish()?;
    deserialize_clean("investigate_response", value)
}

pub fn validate_threat_hunt_response(
    value: &Value,
) -> Result<ThreatHuntResponse, ContractValidationError> {
    let mut v = Violations::new("threat_hunt_response");
    if let Some(assets) = value.get("confirmed_compromised") {
        if !assets.is_array() {
            v.push("confirmed_compromised must be an array");
        }
    }
    v.finish()?;
    deserialize_clean("threat_hunt_response", value)
}

pub fn validate_plan_response(value: &Value) -> Result<PlanResponse, ContractValidationError> {
    let mut v = Violations::new("plan_response");
    if let Some(actions) = require_array(&mut v, value, "actions", false) {
        for (i, action) in actions.iter().enumerate() {
            check_action(&mut v, action, &format!("actions[{}]", i));
        }
    }
    if let Some(criteria) = require_array(&mut v, value, "success_criteria", false) {
        for (i, criterion) in criteria.iter().enumerate() {
            check_criterion(&mut v, criterion, &format!("success_criteria[{}]", i));
        }
    }
    v.finish()?;
    deserialize_clean("plan_response", value)
}

pub fn validate_execute_response(
    value: &Value,
) -> Result<ExecuteResponse, ContractValidationError> {
    let mut v = Violations::new("execute_response");
    require_one_of(&mut v, value, "status", EXECUTE_STATUSES);
    if value.get("actions_completed").and_then(Value::as_u64).is_none() {
        v.push("actions_completed must be a non-negative number");
    }
    if let Some(results) = require_array(&mut v, value, "action_results", false) {
        for (i, result) in results.iter().enumerate() {
            let label = format!("action_results[{}]", i);
            if result.get("action_id").and_then(Value::as_str).is_none() {
                v.push(format!("{}.action_id must be a string", label));
            }
            if result.get("action_type").and_then(Value::as_str).is_none() {
                v.push(format!("{}.action_type must be a string", label));
            }
            require_one_of(&mut v, result, "execution_status", EXECUTION_STATUSES);
        }
    }
    v.finish()?;
    deserialize_clean("execute_response", value)
}

pub fn validate_verify_response(value: &Value) -> Result<VerifyResponse, ContractValidationError> {
    let mut v = Violations::new("verify_response");
    let passed = require_bool(&mut v, value, "passed");
    let _ = require_unit_interval(&mut v, value, "health_score");
    let _ = require_array(&mut v, value, "criteria_results", false);
    if value.get("iteration").and_then(Value::as_u64).is_none() {
        v.push("iteration must be a non-negative number");
    }
    if passed == Some(false) {
        match value.get("failure_analysis").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => v.push("failure_analysis is required when passed is false"),
        }
    }
    v.finish()?;
    deserialize_clean("verify_response", value)
}
