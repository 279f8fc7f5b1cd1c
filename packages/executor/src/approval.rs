//! Per-action approval gate.
//!
//! Dispatches a `request_approval` envelope to the approval workflow, then
//! polls the approval-response index for the human decision. `more_info`
//! keeps polling; silence until the timeout is a timeout. Three consecutive
//! poll failures abort the gate — a single blip does not.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vigil_a2a::{agents, A2aRouter, SendOptions};
use vigil_contracts::{Envelope, PlannedAction, TaskPayload, WorkflowPayload};
use vigil_store::{indices, EsClient};

use crate::actions::derive_severity;
use crate::error::ExecutorError;

/// Decision from the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    TimedOut,
}

const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 3;

pub struct ApprovalGate {
    store: Arc<EsClient>,
    router: Arc<A2aRouter>,
    poll_interval: Duration,
    timeout: Duration,
}

impl ApprovalGate {
    pub fn new(
        store: Arc<EsClient>,
        router: Arc<A2aRouter>,
        poll_interval_ms: u64,
        timeout_minutes: u64,
    ) -> Self {
        Self {
            store,
            router,
            poll_interval: Duration::from_millis(poll_interval_ms),
            timeout: Duration::from_secs(timeout_minutes * 60),
        }
    }

    /// Request approval for one action and wait for the decision.
    pub async fn wait_for_approval(
        &self,
        incident_id: &str,
        action_id: &str,
        action: &PlannedAction,
        cancel: &CancellationToken,
    ) -> Result<ApprovalOutcome, ExecutorError> {
        self.dispatch_request(incident_id, action_id, action).await;

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut consecutive_failures = 0u32;

        loop {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(incident_id, action_id, "approval gate timed out");
                return Ok(ApprovalOutcome::TimedOut);
            }
            if cancel.is_cancelled() {
                return Ok(ApprovalOutcome::TimedOut);
            }

            match self.poll_decision(incident_id, action_id).await {
                Ok(Some(decision)) => match decision.as_str() {
                    "approve" | "approved" => {
                        tracing::info!(incident_id, action_id, "action approved");
                        return Ok(ApprovalOutcome::Approved);
                    }
                    "reject" | "rejected" => {
                        tracing::info!(incident_id, action_id, "action rejected");
                        return Ok(ApprovalOutcome::Rejected);
                    }
                    // The approver asked a question; keep waiting.
                    "more_info" => consecutive_failures = 0,
                    other => {
                        tracing::warn!(incident_id, action_id, decision = other, "ignoring unknown approval decision");
                        consecutive_failures = 0;
                    }
                },
                Ok(None) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        incident_id,
                        action_id,
                        consecutive_failures,
                        error = %e,
                        "approval poll failed"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                        return Err(ExecutorError::ApprovalPolling {
                            action_id: action_id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Ok(ApprovalOutcome::TimedOut),
            }
        }
    }

    async fn dispatch_request(&self, incident_id: &str, action_id: &str, action: &PlannedAction) {
        let envelope = Envelope::new(
            agents::EXECUTOR,
            agents::APPROVAL_WORKFLOW,
            incident_id,
            TaskPayload::RequestApproval(WorkflowPayload {
                args: serde_json::json!({
                    "incident_id": incident_id,
                    "action_id": action_id,
                    "action_type": action.action_type,
                    "description": action.description,
                    "target_system": action.target_system,
                    "target_asset": action.target_asset,
                    "severity": derive_severity(&action.action_type),
                }),
            }),
        );

        // The human can still approve through other channels; a failed
        // request dispatch downgrades to a poll-until-timeout.
        if let Err(e) = self
            .router
            .send(agents::APPROVAL_WORKFLOW, &envelope, SendOptions::default())
            .await
        {
            tracing::warn!(incident_id, action_id, error = %e, "approval request dispatch failed");
        }
    }

    async fn poll_decision(
        &self,
        incident_id: &str,
        action_id: &str,
    ) -> Result<Option<String>, ExecutorError> {
        let query = serde_json::json!({
            "size": 1,
            "sort": [{"timestamp": {"order": "desc"}}],
            "query": {"bool": {"must": [
                {"term": {"incident_id": incident_id}},
                {"term": {"action_id": action_id}}
            ]}}
        });

        let results = self.store.search(indices::APPROVAL_RESPONSES, &query).await?;
        Ok(results
            .hits
            .first()
            .and_then(|hit| hit.source.get("decision"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}
