//! Plan execution.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use vigil_a2a::{A2aRouter, SendOptions};
use vigil_contracts::{
    generate_action_id, ActionResult, ContractValidationError, Envelope, ExecuteRequest,
    ExecuteResponse, ExecutionStatus, PlannedAction, TaskPayload, WorkflowPayload,
};
use vigil_resilience::{run_with_deadline, DeadlineError};
use vigil_store::{indices, EsClient};

use crate::actions::{action_category, rollback_available};
use crate::approval::{ApprovalGate, ApprovalOutcome};
use crate::audit::{write_record, ActionRecord};
use crate::error::ExecutorError;

/// Message attached to actions cut off by the deadline.
const DEADLINE_MESSAGE: &str = "Execution deadline exceeded";

/// Executor tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub deadline_ms: u64,
    pub approval_poll_interval_ms: u64,
    pub approval_timeout_minutes: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 50_000,
            approval_poll_interval_ms: 5_000,
            approval_timeout_minutes: 15,
        }
    }
}

/// Outcome of one action, result plus its audit record.
#[derive(Debug, Clone)]
struct ActionOutcome {
    result: ActionResult,
    record: ActionRecord,
}

/// The Executor sub-core.
pub struct Executor {
    store: Arc<EsClient>,
    gate: ApprovalGate,
    router: Arc<A2aRouter>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(store: Arc<EsClient>, router: Arc<A2aRouter>, config: ExecutorConfig) -> Self {
        let gate = ApprovalGate::new(
            store.clone(),
            router.clone(),
            config.approval_poll_interval_ms,
            config.approval_timeout_minutes,
        );
        Self {
            store,
            gate,
            router,
            config,
        }
    }

    /// Execute a remediation plan.
    ///
    /// Actions run strictly in `order`. A failed action stops dispatch; a
    /// rejected or timed-out approval stops dispatch; the deadline marks the
    /// current and remaining actions skipped. Every input action appears in
    /// `action_results` exactly once.
    pub async fn handle_execute_plan(
        &self,
        envelope: &Envelope,
    ) -> Result<ExecuteResponse, ExecutorError> {
        envelope.validate()?;
        let request = match &envelope.payload {
            TaskPayload::ExecutePlan(request) => request.clone(),
            other => {
                return Err(ContractValidationError::new(
                    "execute_request",
                    vec![format!(
                        "payload.task must be execute_plan, got {}",
                        other.task_name()
                    )],
                )
                .into())
            }
        };
        reject_unknown_action_types(&request)?;

        // Idempotency guard: a prior attempt for this incident means the
        // plan already ran (or is running) — never re-execute.
        if self.has_prior_actions(&request.incident_id).await? {
            tracing::info!(
                incident_id = %request.incident_id,
                "prior action records exist, skipping re-execution"
            );
            return Ok(ExecuteResponse {
                status: "completed".into(),
                actions_completed: 0,
                action_results: Vec::new(),
            });
        }

        let mut actions = request.actions.clone();
        actions.sort_by_key(|a| a.order);

        let outcomes: Arc<Mutex<Vec<ActionOutcome>>> = Arc::new(Mutex::new(Vec::new()));
        let race = run_with_deadline(self.config.deadline_ms, "plan execution", |token| {
            self.run_actions(&request.incident_id, &actions, outcomes.clone(), token)
        })
        .await;

        let mut outcomes = {
            let mut guard = outcomes.lock();
            std::mem::take(&mut *guard)
        };

        let deadline_hit = matches!(&race, Err(DeadlineError::Elapsed { .. }));
        if deadline_hit {
            tracing::warn!(
                incident_id = %request.incident_id,
                deadline_ms = self.config.deadline_ms,
                "plan execution hit deadline"
            );
        }
        if let Err(DeadlineError::Inner(e)) = race {
            // Approval polling collapsed; audit what ran, then surface.
            for outcome in &outcomes {
                write_record(self.store.clone(), outcome.record.clone());
            }
            return Err(e);
        }

        // Cover actions that never produced a result: the one in flight when
        // the deadline fired and everything after an early stop.
        for action in actions.iter().skip(outcomes.len()) {
            let message = if deadline_hit {
                DEADLINE_MESSAGE
            } else {
                "Execution stopped before this action"
            };
            outcomes.push(self.skipped_outcome(&request.incident_id, action, message, None));
        }

        for outcome in &outcomes {
            write_record(self.store.clone(), outcome.record.clone());
        }

        let action_results: Vec<ActionResult> =
            outcomes.into_iter().map(|o| o.result).collect();
        let actions_completed = action_results
            .iter()
            .filter(|r| r.execution_status == ExecutionStatus::Completed)
            .count() as u32;
        let status = overall_status(actions_completed, action_results.len());

        Ok(ExecuteResponse {
            status: status.to_string(),
            actions_completed,
            action_results,
        })
    }

    async fn run_actions(
        &self,
        incident_id: &str,
        actions: &[PlannedAction],
        outcomes: Arc<Mutex<Vec<ActionOutcome>>>,
        cancel: CancellationToken,
    ) -> Result<(), ExecutorError> {
        for action in actions {
            if cancel.is_cancelled() {
                break;
            }
            let action_id = generate_action_id();

            let mut approval_status = None;
            if action.approval_required {
                let outcome = self
                    .gate
                    .wait_for_approval(incident_id, &action_id, action, &cancel)
                    .await?;
                match outcome {
                    ApprovalOutcome::Approved => approval_status = Some("approved".to_string()),
                    ApprovalOutcome::Rejected => {
                        outcomes.lock().push(self.skipped_outcome(
                            incident_id,
                            action,
                            "Approval rejected",
                            Some("rejected".into()),
                        ));
                        break;
                    }
                    ApprovalOutcome::TimedOut => {
                        outcomes.lock().push(self.skipped_outcome(
                            incident_id,
                            action,
                            "Approval timed out",
                            Some("timeout".into()),
                        ));
                        break;
                    }
                }
            }

            let started = Instant::now();
            let started_at = Utc::now();
            let dispatch = self.dispatch_action(incident_id, &action_id, action).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let completed_at = Utc::now();

            match dispatch {
                Ok(workflow_id) => {
                    tracing::info!(
                        incident_id,
                        action_id = %action_id,
                        action_type = %action.action_type,
                        duration_ms,
                        "action completed"
                    );
                    outcomes.lock().push(ActionOutcome {
                        result: ActionResult {
                            action_id: action_id.clone(),
                            action_type: action.action_type.clone(),
                            execution_status: ExecutionStatus::Completed,
                            error_message: None,
                            duration_ms: Some(duration_ms),
                            workflow_id: workflow_id.clone(),
                        },
                        record: ActionRecord {
                            action_id,
                            incident_id: incident_id.to_string(),
                            action_type: action.action_type.clone(),
                            target_system: action.target_system.clone(),
                            target_asset: action.target_asset.clone(),
                            approval_required: action.approval_required,
                            approval_status,
                            execution_status: ExecutionStatus::Completed,
                            started_at,
                            completed_at,
                            duration_ms,
                            error_message: None,
                            rollback_available: rollback_available(&action.action_type),
                            workflow_id,
                        },
                    });
                }
                Err(message) => {
                    tracing::error!(
                        incident_id,
                        action_id = %action_id,
                        action_type = %action.action_type,
                        error = %message,
                        "action failed, stopping plan"
                    );
                    outcomes.lock().push(ActionOutcome {
                        result: ActionResult {
                            action_id: action_id.clone(),
                            action_type: action.action_type.clone(),
                            execution_status: ExecutionStatus::Failed,
                            error_message: Some(message.clone()),
                            duration_ms: Some(duration_ms),
                            workflow_id: None,
                        },
                        record: ActionRecord {
                            action_id,
                            incident_id: incident_id.to_string(),
                            action_type: action.action_type.clone(),
                            target_system: action.target_system.clone(),
                            target_asset: action.target_asset.clone(),
                            approval_required: action.approval_required,
                            approval_status,
                            execution_status: ExecutionStatus::Failed,
                            started_at,
                            completed_at,
                            duration_ms,
                            error_message: Some(message),
                            rollback_available: rollback_available(&action.action_type),
                            workflow_id: None,
                        },
                    });
                    break;
                }
            }
        }
        Ok(())
    }

    /// Send the action to the workflow agent implied by its target system.
    async fn dispatch_action(
        &self,
        incident_id: &str,
        action_id: &str,
        action: &PlannedAction,
    ) -> Result<Option<String>, String> {
        let workflow_agent = format!("{}-workflow", action.target_system);
        let envelope = Envelope::new(
            vigil_a2a::agents::EXECUTOR,
            workflow_agent.clone(),
            incident_id,
            TaskPayload::ExecuteAction(WorkflowPayload {
                args: serde_json::json!({
                    "incident_id": incident_id,
                    "action_id": action_id,
                    "action_type": action.action_type,
                    "description": action.description,
                    "target_asset": action.target_asset,
                    "parameters": action.parameters,
                }),
            }),
        );

        self.router
            .send(&workflow_agent, &envelope, SendOptions::default())
            .await
            .map(|body| {
                body.get("workflow_id")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            })
            .map_err(|e| e.to_string())
    }

    fn skipped_outcome(
        &self,
        incident_id: &str,
        action: &PlannedAction,
        message: &str,
        approval_status: Option<String>,
    ) -> ActionOutcome {
        let action_id = generate_action_id();
        let now = Utc::now();
        ActionOutcome {
            result: ActionResult {
                action_id: action_id.clone(),
                action_type: action.action_type.clone(),
                execution_status: ExecutionStatus::Skipped,
                error_message: Some(message.to_string()),
                duration_ms: None,
                workflow_id: None,
            },
            record: ActionRecord {
                action_id,
                incident_id: incident_id.to_string(),
                action_type: action.action_type.clone(),
                target_system: action.target_system.clone(),
                target_asset: action.target_asset.clone(),
                approval_required: action.approval_required,
                approval_status,
                execution_status: ExecutionStatus::Skipped,
                started_at: now,
                completed_at: now,
                duration_ms: 0,
                error_message: Some(message.to_string()),
                rollback_available: rollback_available(&action.action_type),
                workflow_id: None,
            },
        }
    }

    async fn has_prior_actions(&self, incident_id: &str) -> Result<bool, ExecutorError> {
        let query = serde_json::json!({
            "size": 1,
            "query": {"term": {"incident_id": incident_id}}
        });
        let results = self.store.search(indices::ACTIONS, &query).await?;
        Ok(results.total > 0)
    }
}

fn reject_unknown_action_types(request: &ExecuteRequest) -> Result<(), ContractValidationError> {
    let unknown: Vec<String> = request
        .actions
        .iter()
        .filter(|a| action_category(&a.action_type).is_none())
        .map(|a| format!("unknown action_type {:?}", a.action_type))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ContractValidationError::new("execute_request", unknown))
    }
}

fn overall_status(completed: u32, total: usize) -> &'static str {
    if total > 0 && completed as usize == total {
        "completed"
    } else if completed == 0 {
        "failed"
    } else {
        "partial_failure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_a2a::{AgentCard, AgentDirectory, Capability};
    use vigil_contracts::build_execute_request;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_store_defaults(server: &MockServer, prior_actions: u64) {
        Mock::given(method("POST"))
            .and(path("/actions/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {"total": {"value": prior_actions}, "hits": []}
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/actions/_doc"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "r-1", "result": "created"})),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agent-telemetry/_doc"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "t-1", "result": "created"})),
            )
            .mount(server)
            .await;
    }

    async fn executor_with_config(server: &MockServer, config: ExecutorConfig) -> Executor {
        let store = Arc::new(EsClient::new(server.uri(), "dGVzdA==").unwrap());
        let directory = AgentDirectory::new(server.uri());
        for agent in ["kubernetes-workflow", "network-workflow", "approval-workflow"] {
            directory
                .register(AgentCard {
                    agent_id: agent.into(),
                    name: agent.into(),
                    version: "1.0.0".into(),
                    capabilities: Some(vec![
                        Capability::Name("execute_action".into()),
                        Capability::Name("request_approval".into()),
                    ]),
                    endpoint: format!("/agents/{}/invoke", agent),
                })
                .await;
        }
        let router = Arc::new(A2aRouter::new(directory, store.clone(), server.uri()));
        Executor::new(store, router, config)
    }

    fn action(action_type: &str, target_system: &str, order: i64, approval: bool) -> PlannedAction {
        PlannedAction {
            action_type: action_type.into(),
            description: format!("{} on {}", action_type, target_system),
            target_system: target_system.into(),
            target_asset: None,
            order,
            approval_required: approval,
            parameters: None,
        }
    }

    fn plan_envelope(actions: Vec<PlannedAction>) -> Envelope {
        Envelope::new(
            "coordinator",
            "executor",
            "INC-2026-A1B2C",
            TaskPayload::ExecutePlan(build_execute_request("INC-2026-A1B2C", actions)),
        )
    }

    #[tokio::test]
    async fn test_unknown_action_type_rejected_before_execution() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        let executor = executor_with_config(&server, ExecutorConfig::default()).await;

        let result = executor
            .handle_execute_plan(&plan_envelope(vec![action("format_the_disk", "kubernetes", 1, false)]))
            .await;

        assert!(matches!(result, Err(ExecutorError::Validation(_))));
    }

    #[tokio::test]
    async fn test_idempotency_guard_returns_without_executing() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 3).await;
        let executor = executor_with_config(&server, ExecutorConfig::default()).await;

        let response = executor
            .handle_execute_plan(&plan_envelope(vec![action("restart_service", "kubernetes", 1, false)]))
            .await
            .unwrap();

        assert_eq!(response.actions_completed, 0);
        assert!(response.action_results.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_success() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/agents/kubernetes-workflow/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "workflow_id": "wf-99"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let executor = executor_with_config(&server, ExecutorConfig::default()).await;
        // Supplied out of order; the executor sorts by `order`.
        let response = executor
            .handle_execute_plan(&plan_envelope(vec![
                action("scale_service", "kubernetes", 2, false),
                action("restart_service", "kubernetes", 1, false),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status, "completed");
        assert_eq!(response.actions_completed, 2);
        assert_eq!(response.action_results[0].action_type, "restart_service");
        assert_eq!(response.action_results[1].action_type, "scale_service");
        assert_eq!(response.action_results[0].workflow_id.as_deref(), Some("wf-99"));
    }

    #[tokio::test]
    async fn test_failure_stops_further_dispatch() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        // First action's workflow 4xx-fails (no retry); the second workflow
        // must never be called.
        Mock::given(method("POST"))
            .and(path("/agents/network-workflow/invoke"))
            .respond_with(ResponseTemplate::new(422))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/kubernetes-workflow/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let executor = executor_with_config(&server, ExecutorConfig::default()).await;
        let response = executor
            .handle_execute_plan(&plan_envelope(vec![
                action("block_ip", "network", 1, false),
                action("restart_service", "kubernetes", 2, false),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status, "failed");
        assert_eq!(response.actions_completed, 0);
        assert_eq!(
            response.action_results[0].execution_status,
            ExecutionStatus::Failed
        );
        assert_eq!(
            response.action_results[1].execution_status,
            ExecutionStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_deadline_skips_all_actions() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/agents/kubernetes-workflow/invoke"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let executor = executor_with_config(
            &server,
            ExecutorConfig {
                deadline_ms: 50,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let response = executor
            .handle_execute_plan(&plan_envelope(vec![
                action("restart_service", "kubernetes", 1, false),
                action("scale_service", "kubernetes", 2, false),
                action("apply_patch", "kubernetes", 3, false),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status, "failed");
        assert_eq!(response.actions_completed, 0);
        assert_eq!(response.action_results.len(), 3);
        for result in &response.action_results {
            assert_eq!(result.execution_status, ExecutionStatus::Skipped);
            assert_eq!(result.error_message.as_deref(), Some(DEADLINE_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_approved_action_dispatches() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/agents/approval-workflow/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/approval-responses/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {"total": {"value": 1}, "hits": [
                    {"_id": "ar-1", "_source": {"decision": "approve"}}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/network-workflow/invoke"))
            .and(body_partial_json(serde_json::json!({
                "payload": {"task": "execute_action", "action_type": "isolate_host"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let executor = executor_with_config(
            &server,
            ExecutorConfig {
                approval_poll_interval_ms: 10,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let response = executor
            .handle_execute_plan(&plan_envelope(vec![action("isolate_host", "network", 1, true)]))
            .await
            .unwrap();

        assert_eq!(response.status, "completed");
        assert_eq!(response.actions_completed, 1);
    }

    #[tokio::test]
    async fn test_rejected_action_skipped() {
        let server = MockServer::start().await;
        mount_store_defaults(&server, 0).await;
        Mock::given(method("POST"))
            .and(path("/agents/approval-workflow/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/approval-responses/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {"total": {"value": 1}, "hits": [
                    {"_id": "ar-1", "_source": {"decision": "rejected"}}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/network-workflow/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let executor = executor_with_config(
            &server,
            ExecutorConfig {
                approval_poll_interval_ms: 10,
                ..ExecutorConfig::default()
            },
        )
        .await;

        let response = executor
            .handle_execute_plan(&plan_envelope(vec![action("isolate_host", "network", 1, true)]))
            .await
            .unwrap();

        assert_eq!(response.status, "failed");
        assert_eq!(
            response.action_results[0].execution_status,
            ExecutionStatus::Skipped
        );
        assert_eq!(
            response.action_results[0].error_message.as_deref(),
            Some("Approval rejected")
        );
    }
}
