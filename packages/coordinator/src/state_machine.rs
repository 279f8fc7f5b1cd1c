//! Guarded state transitions with optimistic concurrency.
//!
//! A transition is a conditional write: read the incident with its tokens,
//! run the guard, merge the new status plus a first-write-wins state
//! timestamp, and write back conditioned on `(if_seq_no, if_primary_term)`.
//! Losing the race means re-reading once — if the other writer already
//! reached the target state the transition is an idempotent success.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use vigil_store::{indices, EsClient, StoreError};

use crate::incident::{IncidentDoc, IncidentStatus};

use IncidentStatus::*;

/// Context the guards evaluate against.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardContext {
    pub suppress_threshold: f64,
    pub max_reflections: u32,
    /// Outcome of the most recent verification, when deciding
    /// `verifying → resolved`.
    pub verification_passed: Option<bool>,
}

/// Guard verdict. A denied transition may name a redirect the caller must
/// honor instead of synthesizing its own.
#[derive(Debug, Clone)]
pub struct GuardDecision {
    pub allowed: bool,
    pub redirect_to: Option<IncidentStatus>,
    pub reason: Option<String>,
}

impl GuardDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            redirect_to: None,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            redirect_to: None,
            reason: Some(reason.into()),
        }
    }

    fn redirect(to: IncidentStatus, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            redirect_to: Some(to),
            reason: Some(reason.into()),
        }
    }
}

/// Transition failure.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("transition {from} -> {to} denied: {reason}")]
    Denied {
        from: IncidentStatus,
        to: IncidentStatus,
        reason: String,
        redirect_to: Option<IncidentStatus>,
    },

    #[error("incident {incident_id} lost the write race twice")]
    Contention { incident_id: String },

    #[error("incident document malformed: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Merge a partial update the way the store's partial-doc update does:
/// objects merge recursively, everything else overwrites.
fn merge_partial(target: &mut Value, partial: &Value) {
    match (target, partial) {
        (Value::Object(target), Value::Object(partial)) => {
            for (key, value) in partial {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_partial(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, partial) => *target = partial.clone(),
    }
}

/// Allowed targets per state. Terminal states have none.
pub fn allowed_targets(from: IncidentStatus) -> &'static [IncidentStatus] {
    match from {
        Detected => &[Triaged, Suppressed, Escalated],
        Triaged => &[Investigating, Suppressed, Escalated],
        Investigating => &[ThreatHunting, Planning, Escalated],
        ThreatHunting => &[Planning, Escalated],
        Planning => &[Executing, AwaitingApproval, Escalated],
        AwaitingApproval => &[Executing, Escalated],
        Executing => &[Verifying, Escalated],
        Verifying => &[Resolved, Reflecting, Escalated],
        Reflecting => &[Investigating, Escalated],
        Resolved | Suppressed | Escalated => &[],
    }
}

/// Evaluate the guard for `from → to` against the current document.
pub fn evaluate_guard(
    doc: &IncidentDoc,
    from: IncidentStatus,
    to: IncidentStatus,
    ctx: &GuardContext,
) -> GuardDecision {
    if doc.status != from {
        return GuardDecision::deny(format!(
            "document is in {}, not {}",
            doc.status, from
        ));
    }
    if !allowed_targets(from).contains(&to) {
        return GuardDecision::deny(format!("{} -> {} is not a legal transition", from, to));
    }

    match (from, to) {
        // Suppression requires the triage score to actually sit below the
        // threshold; a missing score cannot justify dropping an incident.
        (Detected, Suppressed) | (Triaged, Suppressed) => match doc.priority_score {
            Some(score) if score < ctx.suppress_threshold => GuardDecision::allow(),
            Some(score) => GuardDecision::deny(format!(
                "priority_score {} is not below suppress threshold {}",
                score, ctx.suppress_threshold
            )),
            None => GuardDecision::deny("no priority_score on document"),
        },

        (AwaitingApproval, Executing) => match doc.approval_status.as_deref() {
            Some("approved") => GuardDecision::allow(),
            other => GuardDecision::deny(format!(
                "approval_status is {:?}, not approved",
                other
            )),
        },

        (Verifying, Resolved) => match ctx.verification_passed {
            Some(true) => GuardDecision::allow(),
            Some(false) => GuardDecision::redirect(Reflecting, "verification failed"),
            None => GuardDecision::deny("no verification outcome available"),
        },

        // Entering `reflecting` already counted this attempt, so the Nth
        // reflection carries reflection_count == max and must still run its
        // full cycle; only a count past the cap redirects. The Coordinator's
        // pre-reflection check is the primary limit — this is the backstop.
        (Reflecting, Investigating) => {
            if doc.reflection_count <= ctx.max_reflections {
                GuardDecision::allow()
            } else {
                GuardDecision::redirect(
                    Escalated,
                    format!(
                        "reflection_count {} exceeds the limit {}",
                        doc.reflection_count, ctx.max_reflections
                    ),
                )
            }
        }

        _ => GuardDecision::allow(),
    }
}

/// Read-guard-merge-write one transition, honoring concurrency tokens.
///
/// `extra_fields` is merged into the document alongside the status change
/// (resolution metadata, approval bookkeeping). Entering `reflecting`
/// increments `reflection_count` as part of the same write.
pub async fn transition(
    store: &Arc<EsClient>,
    incident_id: &str,
    from: IncidentStatus,
    to: IncidentStatus,
    ctx: &GuardContext,
    extra_fields: Option<Value>,
) -> Result<IncidentDoc, TransitionError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let raw = store.get_doc(indices::INCIDENTS, incident_id).await?;
        let doc: IncidentDoc = serde_json::from_value(raw.source.clone())
            .map_err(|e| TransitionError::Malformed(e.to_string()))?;

        // The other worker already got us there: idempotent success.
        if doc.status == to {
            tracing::debug!(incident_id, status = %to, "transition already applied");
            return Ok(doc);
        }

        let decision = evaluate_guard(&doc, from, to, ctx);
        if !decision.allowed {
            return Err(TransitionError::Denied {
                from,
                to,
                reason: decision
                    .reason
                    .unwrap_or_else(|| "guard refused".to_string()),
                redirect_to: decision.redirect_to,
            });
        }

        let mut partial = serde_json::json!({ "status": to.as_str() });
        // First write wins: re-entry never refreshes a state timestamp.
        if !doc.state_timestamps.contains_key(to.as_str()) {
            partial["_state_timestamps"] = serde_json::json!({ to.as_str(): Utc::now() });
        }
        if to == Reflecting {
            partial["reflection_count"] = serde_json::json!(doc.reflection_count + 1);
        }
        if let Some(Value::Object(extra)) = extra_fields.clone() {
            for (key, value) in extra {
                partial[key] = value;
            }
        }

        match store
            .update_doc(indices::INCIDENTS, incident_id, &partial, Some(raw.token()))
            .await
        {
            Ok(()) => {
                tracing::info!(incident_id, from = %from, to = %to, "incident transitioned");
                // Reconstruct what the store now holds.
                let mut merged = raw.source;
                merge_partial(&mut merged, &partial);
                let updated: IncidentDoc = serde_json::from_value(merged)
                    .map_err(|e| TransitionError::Malformed(e.to_string()))?;
                return Ok(updated);
            }
            Err(StoreError::VersionConflict { .. }) if attempts < 2 => {
                tracing::debug!(incident_id, "transition write conflicted, re-reading");
                continue;
            }
            Err(StoreError::VersionConflict { .. }) => {
                return Err(TransitionError::Contention {
                    incident_id: incident_id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_in(status: IncidentStatus) -> IncidentDoc {
        let mut doc = IncidentDoc::new("INC-2026-A1B2C", "security", "high", vec!["a-1".into()]);
        doc.status = status;
        doc
    }

    fn ctx() -> GuardContext {
        GuardContext {
            suppress_threshold: 0.4,
            max_reflections: 3,
            verification_passed: None,
        }
    }

    #[test]
    fn test_legal_transition_table() {
        assert!(allowed_targets(Detected).contains(&Triaged));
        assert!(allowed_targets(Verifying).contains(&Reflecting));
        assert!(allowed_targets(Resolved).is_empty());
        assert!(!allowed_targets(Executing).contains(&Resolved));
    }

    #[test]
    fn test_illegal_transition_denied() {
        let decision = evaluate_guard(&doc_in(Detected), Detected, Executing, &ctx());
        assert!(!decision.allowed);
        assert!(decision.redirect_to.is_none());
    }

    #[test]
    fn test_stale_from_state_denied() {
        let decision = evaluate_guard(&doc_in(Planning), Detected, Triaged, &ctx());
        assert!(!decision.allowed);
    }

    #[test]
    fn test_suppression_requires_low_score() {
        let mut doc = doc_in(Detected);
        doc.priority_score = Some(0.2);
        assert!(evaluate_guard(&doc, Detected, Suppressed, &ctx()).allowed);

        doc.priority_score = Some(0.9);
        assert!(!evaluate_guard(&doc, Detected, Suppressed, &ctx()).allowed);

        doc.priority_score = None;
        assert!(!evaluate_guard(&doc, Detected, Suppressed, &ctx()).allowed);
    }

    #[test]
    fn test_approval_gate_guard() {
        let mut doc = doc_in(AwaitingApproval);
        assert!(!evaluate_guard(&doc, AwaitingApproval, Executing, &ctx()).allowed);

        doc.approval_status = Some("approved".into());
        assert!(evaluate_guard(&doc, AwaitingApproval, Executing, &ctx()).allowed);

        doc.approval_status = Some("rejected".into());
        assert!(!evaluate_guard(&doc, AwaitingApproval, Executing, &ctx()).allowed);
    }

    #[test]
    fn test_failed_verification_redirects_to_reflecting() {
        let doc = doc_in(Verifying);
        let decision = evaluate_guard(
            &doc,
            Verifying,
            Resolved,
            &GuardContext {
                verification_passed: Some(false),
                ..ctx()
            },
        );

        assert!(!decision.allowed);
        assert_eq!(decision.redirect_to, Some(Reflecting));
    }

    #[test]
    fn test_reflection_below_cap_allowed() {
        let mut doc = doc_in(Reflecting);
        doc.reflection_count = 2;
        assert!(evaluate_guard(&doc, Reflecting, Investigating, &ctx()).allowed);
    }

    #[test]
    fn test_final_reflection_allowed_at_cap() {
        // The count was bumped on entry to `reflecting`, so the third and
        // final reflection runs with reflection_count == 3.
        let mut doc = doc_in(Reflecting);
        doc.reflection_count = 3;
        assert!(evaluate_guard(&doc, Reflecting, Investigating, &ctx()).allowed);
    }

    #[test]
    fn test_reflection_past_cap_redirects_to_escalated() {
        let mut doc = doc_in(Reflecting);
        doc.reflection_count = 4;
        let decision = evaluate_guard(&doc, Reflecting, Investigating, &ctx());

        assert!(!decision.allowed);
        assert_eq!(decision.redirect_to, Some(Escalated));
    }
}
