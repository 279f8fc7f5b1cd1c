//! Verification entry point.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use vigil_contracts::validate::validate_verify_response;
use vigil_contracts::{ContractValidationError, Envelope, TaskPayload, VerifyRequest, VerifyResponse};
use vigil_resilience::{run_with_deadline, DeadlineError};
use vigil_store::{indices, EsClient};
use vigil_tools::ToolExecutor;

use crate::baselines;
use crate::error::VerifierError;
use crate::health::{build_failure_analysis, run_health_checks, HealthReport};

/// Verifier tunables, env-overridable in the binary.
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    pub deadline_ms: u64,
    pub stabilization_wait_seconds: i64,
    pub health_score_threshold: f64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 50_000,
            stabilization_wait_seconds: 10,
            health_score_threshold: 0.8,
        }
    }
}

/// The Verifier sub-core.
pub struct Verifier {
    store: Arc<EsClient>,
    tools: Arc<ToolExecutor>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(store: Arc<EsClient>, tools: Arc<ToolExecutor>, config: VerifierConfig) -> Self {
        Self {
            store,
            tools,
            config,
        }
    }

    /// Verify that remediation resolved the incident.
    ///
    /// The reflection count is read *before* the deadline race so that even
    /// a degraded response reports the correct iteration. Deadline and
    /// internal errors both degrade to `passed: false` with an explanatory
    /// failure analysis rather than erroring the phase.
    pub async fn handle_verify_resolution(
        &self,
        envelope: &Envelope,
    ) -> Result<VerifyResponse, VerifierError> {
        envelope.validate()?;
        let request = match &envelope.payload {
            TaskPayload::VerifyResolution(request) => request.clone(),
            other => {
                return Err(ContractValidationError::new(
                    "verify_request",
                    vec![format!(
                        "payload.task must be verify_resolution, got {}",
                        other.task_name()
                    )],
                )
                .into())
            }
        };
        validate_request(&request)?;

        let reflection_count = self.fetch_reflection_count(&request.incident_id).await;
        let iteration = reflection_count + 1;

        self.wait_for_stabilization().await;

        let race = run_with_deadline(self.config.deadline_ms, "verification", |_token| async {
            let baselines = baselines::fetch_all(&self.store, &request.affected_services).await;
            Ok::<HealthReport, VerifierError>(
                run_health_checks(&self.tools, &request, &baselines).await,
            )
        })
        .await;

        let response = match race {
            Ok(report) => {
                let passed = report.health_score >= self.config.health_score_threshold;
                tracing::info!(
                    incident_id = %request.incident_id,
                    health_score = report.health_score,
                    criteria_passed = report.passed_count,
                    criteria_total = report.criteria_results.len(),
                    passed,
                    iteration,
                    "verification complete"
                );
                let failure_analysis =
                    (!passed).then(|| build_failure_analysis(&report.criteria_results));
                VerifyResponse {
                    passed,
                    health_score: report.health_score,
                    criteria_results: report.criteria_results,
                    failure_analysis,
                    iteration,
                }
            }
            Err(DeadlineError::Elapsed { deadline_ms, .. }) => degraded_response(
                format!("Verification deadline exceeded after {}ms", deadline_ms),
                iteration,
            ),
            Err(DeadlineError::Inner(e)) => {
                tracing::error!(incident_id = %request.incident_id, error = %e, "verification errored");
                degraded_response(format!("Verification error: {}", e), iteration)
            }
        };

        // Never hand the Coordinator a response we would reject ourselves.
        let wire = serde_json::to_value(&response)
            .map_err(|e| ContractValidationError::new("verify_response", vec![e.to_string()]))?;
        validate_verify_response(&wire)?;

        Ok(response)
    }

    async fn fetch_reflection_count(&self, incident_id: &str) -> u32 {
        match self.store.get_doc(indices::INCIDENTS, incident_id).await {
            Ok(doc) => doc
                .source
                .get("reflection_count")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32,
            Err(e) => {
                tracing::warn!(incident_id, error = %e, "could not read reflection count");
                0
            }
        }
    }

    async fn wait_for_stabilization(&self) {
        let total = self.config.stabilization_wait_seconds;
        if total <= 0 {
            return;
        }
        tracing::info!(seconds = total, "waiting for environment to stabilize");
        for elapsed in 1..=total {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if elapsed % 5 == 0 && elapsed < total {
                tracing::debug!(elapsed, total, "stabilization wait in progress");
            }
        }
    }
}

fn degraded_response(failure_analysis: String, iteration: u32) -> VerifyResponse {
    VerifyResponse {
        passed: false,
        health_score: 0.0,
        criteria_results: Vec::new(),
        failure_analysis: Some(failure_analysis),
        iteration,
    }
}

fn validate_request(request: &VerifyRequest) -> Result<(), ContractValidationError> {
    let mut errors = Vec::new();
    if request.incident_id.is_empty() {
        errors.push("incident_id must not be empty".to_string());
    }
    if request.affected_services.is_empty() {
        errors.push("affected_services must not be empty".to_string());
    }
    if request.success_criteria.is_empty() {
        errors.push("success_criteria must not be empty".to_string());
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ContractValidationError::new("verify_request", errors))
    }
}
