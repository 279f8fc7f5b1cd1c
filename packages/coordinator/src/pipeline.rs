//! Per-incident pipeline delegation.
//!
//! `process_alert` resolves the incident type from the rule id prefix and
//! drives one of two orchestrations: the security flow (triage →
//! investigate → optional threat-hunt → plan → approve → execute → verify)
//! or the operational flow (same spine, no threat-hunt, with a synthesized
//! investigation when change correlation is weak). Unrecoverable phase
//! failures route to the escalation latch; verification failures enter the
//! bounded reflection loop.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

use async_trait::async_trait;
use vigil_a2a::{agents, A2aError, A2aRouter, SendOptions};
use vigil_contracts::validate::{
    validate_execute_response, validate_investigate_response, validate_plan_response,
    validate_threat_hunt_response, validate_triage_response, validate_verify_response,
};
use vigil_contracts::{
    build_execute_request, build_investigate_request, build_plan_request,
    build_threat_hunt_request, build_triage_request, build_verify_request, generate_incident_id,
    ContractValidationError, CriterionOperator, Envelope, ExecuteResponse, InvestigateResponse,
    PlanResponse, SuccessCriterion, TaskPayload, ThreatHuntResponse, TriageResponse,
    VerifyResponse, WorkflowPayload,
};
use vigil_resilience::BreakerRegistry;
use vigil_store::{indices, EsClient, StoreError};

use crate::config::Config;
use crate::escalation::{escalate_incident, EscalationOutcome};
use crate::incident::{IncidentDoc, IncidentStatus};
use crate::reporting;
use crate::state_machine::{transition, GuardContext, TransitionError};
use crate::timing;
use crate::watcher::{AlertSink, ClaimedAlert};

/// Pipeline failure modes.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    A2a(#[from] A2aError),

    #[error(transparent)]
    Contract(#[from] ContractValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("circuit breaker open for {agent_id}")]
    BreakerOpen { agent_id: String },

    #[error("incident document malformed: {0}")]
    Malformed(String),
}

/// Outcome of the Coordinator-level approval wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApprovalWait {
    Approved,
    Rejected,
    TimedOut,
}

/// The pipeline coordinator.
pub struct Coordinator {
    store: Arc<EsClient>,
    router: Arc<A2aRouter>,
    breakers: Arc<BreakerRegistry>,
    config: Arc<Config>,
    analyst: Option<Arc<crate::analyst::AnalystScheduler>>,
}

#[async_trait]
impl AlertSink for Coordinator {
    async fn process_alert(&self, alert: ClaimedAlert) {
        let rule_id = alert
            .source
            .get("rule_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let incident_type = resolve_incident_type(rule_id);
        tracing::info!(alert_id = %alert.alert_id, rule_id, incident_type, "processing alert");

        match incident_type {
            "operational" => self.run_operational_flow(&alert).await,
            _ => self.run_security_flow(&alert).await,
        }

        // Exactly once per claim, on every path out of the pipeline.
        self.mark_alert_processed(&alert).await;
    }
}

/// `sentinel-` and `ops-` rules come from the operational detector;
/// everything else is a security detection.
pub fn resolve_incident_type(rule_id: &str) -> &'static str {
    if rule_id.starts_with("sentinel-") || rule_id.starts_with("ops-") {
        "operational"
    } else {
        "security"
    }
}

/// Assets the hunter confirmed compromised that the investigator never
/// mentioned mean the two assessments disagree about scope.
pub fn check_conflicting_assessments(blast_radius: &[String], confirmed: &[String]) -> bool {
    confirmed.iter().any(|asset| !blast_radius.contains(asset))
}

impl Coordinator {
    pub fn new(
        store: Arc<EsClient>,
        router: Arc<A2aRouter>,
        breakers: Arc<BreakerRegistry>,
        config: Arc<Config>,
        analyst: Option<Arc<crate::analyst::AnalystScheduler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            router,
            breakers,
            config,
            analyst,
        })
    }

    // -----------------------------------------------------------------------
    // Security flow
    // -----------------------------------------------------------------------

    async fn run_security_flow(&self, alert: &ClaimedAlert) {
        let triage = match self.call_triage(alert).await {
            Ok(triage) => triage,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "triage failed");
                // Open an incident shell so the escalation has a record.
                if let Ok(incident_id) = self
                    .create_incident(alert, "security", "high", None)
                    .await
                {
                    self.escalate(&incident_id, "triage_failed").await;
                }
                return;
            }
        };

        let incident_id = match self
            .create_incident(alert, "security", &triage.severity, Some(triage.priority_score))
            .await
        {
            Ok(incident_id) => incident_id,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "incident creation failed");
                return;
            }
        };

        if triage.priority_score < self.config.suppress_threshold {
            match self
                .transition(
                    &incident_id,
                    IncidentStatus::Detected,
                    IncidentStatus::Suppressed,
                    None,
                    Some(serde_json::json!({"resolution_type": "suppressed"})),
                )
                .await
            {
                Ok(_) => {
                    tracing::info!(
                        incident_id,
                        priority_score = triage.priority_score,
                        "incident suppressed below threshold"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(incident_id, error = %e, "suppression refused, continuing pipeline");
                }
            }
        }

        if self
            .step(&incident_id, IncidentStatus::Detected, IncidentStatus::Triaged)
            .await
            .is_err()
            || self
                .step(&incident_id, IncidentStatus::Triaged, IncidentStatus::Investigating)
                .await
                .is_err()
        {
            return;
        }

        let investigation = match self
            .call_investigator(&incident_id, alert, "security", None)
            .await
        {
            Ok(investigation) => investigation,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "investigation failed");
                self.escalate(&incident_id, "investigation_failed").await;
                return;
            }
        };
        self.record_investigation(&incident_id, &investigation).await;

        if investigation.recommended_next == "escalate" {
            self.escalate(&incident_id, "investigator_recommended_escalation")
                .await;
            return;
        }

        if investigation.recommended_next == "threat_hunt" {
            if self
                .step(&incident_id, IncidentStatus::Investigating, IncidentStatus::ThreatHunting)
                .await
                .is_err()
            {
                return;
            }

            let hunt = match self
                .call_threat_hunter(&incident_id, &investigation.blast_radius)
                .await
            {
                Ok(hunt) => hunt,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "threat hunt failed");
                    self.escalate(&incident_id, "threat_hunt_failed").await;
                    return;
                }
            };

            if check_conflicting_assessments(
                &investigation.blast_radius,
                &hunt.confirmed_compromised,
            ) {
                tracing::warn!(
                    incident_id,
                    confirmed = ?hunt.confirmed_compromised,
                    blast_radius = ?investigation.blast_radius,
                    "hunter found compromise outside the investigated blast radius"
                );
                self.escalate(&incident_id, "conflicting_assessments").await;
                return;
            }

            if self
                .step(&incident_id, IncidentStatus::ThreatHunting, IncidentStatus::Planning)
                .await
                .is_err()
            {
                return;
            }
        } else if self
            .step(&incident_id, IncidentStatus::Investigating, IncidentStatus::Planning)
            .await
            .is_err()
        {
            return;
        }

        self.run_remediation_cycle(&incident_id, alert, "security", &triage.severity, investigation)
            .await;
    }

    // -----------------------------------------------------------------------
    // Operational flow
    // -----------------------------------------------------------------------

    async fn run_operational_flow(&self, alert: &ClaimedAlert) {
        let triage = match self.call_triage(alert).await {
            Ok(triage) => triage,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "triage failed");
                if let Ok(incident_id) = self
                    .create_incident(alert, "operational", "high", None)
                    .await
                {
                    self.escalate(&incident_id, "triage_failed").await;
                }
                return;
            }
        };

        let incident_id = match self
            .create_incident(
                alert,
                "operational",
                &triage.severity,
                Some(triage.priority_score),
            )
            .await
        {
            Ok(incident_id) => incident_id,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "incident creation failed");
                return;
            }
        };

        if triage.priority_score < self.config.suppress_threshold {
            if self
                .transition(
                    &incident_id,
                    IncidentStatus::Detected,
                    IncidentStatus::Suppressed,
                    None,
                    Some(serde_json::json!({"resolution_type": "suppressed"})),
                )
                .await
                .is_ok()
            {
                return;
            }
        }

        if self
            .step(&incident_id, IncidentStatus::Detected, IncidentStatus::Triaged)
            .await
            .is_err()
            || self
                .step(&incident_id, IncidentStatus::Triaged, IncidentStatus::Investigating)
                .await
                .is_err()
        {
            return;
        }

        // A confident change correlation earns a real investigator pass;
        // otherwise the anomaly report itself is the investigation.
        let confidence = alert
            .source
            .pointer("/change_correlation/confidence")
            .and_then(Value::as_str)
            .unwrap_or("none");
        let investigation = if confidence == "high" {
            match self
                .call_investigator(&incident_id, alert, "operational", None)
                .await
            {
                Ok(investigation) => investigation,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "investigation failed");
                    self.escalate(&incident_id, "investigation_failed").await;
                    return;
                }
            }
        } else {
            synthesize_investigation(alert)
        };
        self.record_investigation(&incident_id, &investigation).await;

        // Operational incidents never threat-hunt, regardless of the
        // investigator's recommendation.
        if self
            .step(&incident_id, IncidentStatus::Investigating, IncidentStatus::Planning)
            .await
            .is_err()
        {
            return;
        }

        self.run_remediation_cycle(&incident_id, alert, "operational", &triage.severity, investigation)
            .await;
    }

    // -----------------------------------------------------------------------
    // Shared tail: plan → approve → execute → verify → resolve/reflect
    // -----------------------------------------------------------------------

    async fn run_remediation_cycle(
        &self,
        incident_id: &str,
        alert: &ClaimedAlert,
        incident_type: &str,
        severity: &str,
        investigation: InvestigateResponse,
    ) {
        let services = effective_services(&investigation, alert);

        let plan = match self
            .call_commander(incident_id, incident_type, severity, &investigation, &services)
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "planning failed");
                self.escalate(incident_id, "planning_failed").await;
                return;
            }
        };
        self.record_plan(incident_id, &plan).await;

        if plan.requires_approval() {
            if self
                .transition(
                    incident_id,
                    IncidentStatus::Planning,
                    IncidentStatus::AwaitingApproval,
                    None,
                    Some(serde_json::json!({"approval_status": "pending"})),
                )
                .await
                .is_err()
            {
                self.escalate(incident_id, "transition_failed").await;
                return;
            }
            self.send_approval_request(incident_id, severity, &plan).await;

            match self.wait_for_approval(incident_id).await {
                ApprovalWait::Approved => {
                    if self
                        .step(incident_id, IncidentStatus::AwaitingApproval, IncidentStatus::Executing)
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                ApprovalWait::Rejected => {
                    self.escalate(incident_id, "approval_rejected").await;
                    return;
                }
                ApprovalWait::TimedOut => {
                    self.escalate(incident_id, "approval_timeout").await;
                    return;
                }
            }
        } else if self
            .step(incident_id, IncidentStatus::Planning, IncidentStatus::Executing)
            .await
            .is_err()
        {
            return;
        }

        if let Err(e) = self.call_executor(incident_id, &plan).await {
            tracing::error!(incident_id, error = %e, "execution failed");
            self.escalate(incident_id, "execution_failed").await;
            return;
        }

        if self
            .step(incident_id, IncidentStatus::Executing, IncidentStatus::Verifying)
            .await
            .is_err()
        {
            return;
        }

        let criteria = effective_criteria(&plan, &services);
        let verify = match self.call_verifier(incident_id, &services, &criteria).await {
            Ok(verify) => verify,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "verification failed");
                self.escalate(incident_id, "verification_failed").await;
                return;
            }
        };
        self.append_verification_result(incident_id, &verify).await;

        match self.try_resolve(incident_id, verify.passed).await {
            ResolveAttempt::Resolved(doc) => self.finalize_resolution(doc).await,
            ResolveAttempt::Reflect => {
                let failure_analysis = verify
                    .failure_analysis
                    .unwrap_or_else(|| "verification failed".to_string());
                self.run_reflection_loop(
                    incident_id,
                    alert,
                    incident_type,
                    severity,
                    services,
                    criteria,
                    failure_analysis,
                )
                .await;
            }
            ResolveAttempt::Failed => {
                self.escalate(incident_id, "transition_failed").await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Reflection loop
    // -----------------------------------------------------------------------

    /// Re-investigate → re-plan → re-execute → re-verify, carrying the most
    /// recent failure analysis, until verification passes or the reflection
    /// cap forces escalation. An explicit loop, not recursion: the executor
    /// crash path just feeds a new failure analysis into the next iteration.
    #[allow(clippy::too_many_arguments)]
    async fn run_reflection_loop(
        &self,
        incident_id: &str,
        alert: &ClaimedAlert,
        incident_type: &str,
        severity: &str,
        mut services: Vec<String>,
        mut criteria: Vec<SuccessCriterion>,
        mut failure_analysis: String,
    ) {
        loop {
            let reflection_count = match self.read_reflection_count(incident_id).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "cannot read incident during reflection");
                    self.escalate(incident_id, "reflection_failed").await;
                    return;
                }
            };
            if reflection_count >= self.config.max_reflections {
                self.escalate(incident_id, "reflection_limit_reached").await;
                return;
            }

            tracing::info!(
                incident_id,
                iteration = reflection_count + 1,
                failure_analysis = %failure_analysis,
                "entering reflection"
            );

            if self
                .step(incident_id, IncidentStatus::Verifying, IncidentStatus::Reflecting)
                .await
                .is_err()
            {
                return;
            }
            match self
                .transition(
                    incident_id,
                    IncidentStatus::Reflecting,
                    IncidentStatus::Investigating,
                    None,
                    None,
                )
                .await
            {
                Ok(_) => {}
                Err(TransitionError::Denied {
                    redirect_to: Some(IncidentStatus::Escalated),
                    ..
                }) => {
                    self.escalate(incident_id, "reflection_limit_reached").await;
                    return;
                }
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "reflection transition failed");
                    self.escalate(incident_id, "transition_failed").await;
                    return;
                }
            }

            // Fresh request each iteration, carrying the *latest* analysis.
            let investigation = match self
                .call_investigator(incident_id, alert, incident_type, Some(failure_analysis.clone()))
                .await
            {
                Ok(investigation) => investigation,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "re-investigation failed");
                    self.escalate(incident_id, "reinvestigation_failed").await;
                    return;
                }
            };
            self.record_investigation(incident_id, &investigation).await;
            if !investigation.affected_services.is_empty() {
                services = investigation.affected_services.clone();
            }

            // Threat hunting is skipped on reflection iterations.
            if self
                .step(incident_id, IncidentStatus::Investigating, IncidentStatus::Planning)
                .await
                .is_err()
            {
                return;
            }

            let plan = match self
                .call_commander(incident_id, incident_type, severity, &investigation, &services)
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "re-planning failed");
                    self.escalate(incident_id, "replanning_failed").await;
                    return;
                }
            };
            self.record_plan(incident_id, &plan).await;
            criteria = effective_criteria(&plan, &services);

            if self
                .step(incident_id, IncidentStatus::Planning, IncidentStatus::Executing)
                .await
                .is_err()
            {
                return;
            }

            match self.call_executor(incident_id, &plan).await {
                Ok(_) => {}
                Err(e) => {
                    // Execution crash is its own reflection cause, distinct
                    // from a verification failure.
                    failure_analysis = format!("Execution failed: {}", e);
                    if self
                        .step(incident_id, IncidentStatus::Executing, IncidentStatus::Verifying)
                        .await
                        .is_err()
                    {
                        return;
                    }
                    continue;
                }
            }

            if self
                .step(incident_id, IncidentStatus::Executing, IncidentStatus::Verifying)
                .await
                .is_err()
            {
                return;
            }

            let verify = match self.call_verifier(incident_id, &services, &criteria).await {
                Ok(verify) => verify,
                Err(e) => {
                    tracing::error!(incident_id, error = %e, "re-verification failed");
                    self.escalate(incident_id, "verification_failed").await;
                    return;
                }
            };
            self.append_verification_result(incident_id, &verify).await;

            match self.try_resolve(incident_id, verify.passed).await {
                ResolveAttempt::Resolved(doc) => {
                    self.finalize_resolution(doc).await;
                    return;
                }
                ResolveAttempt::Reflect => {
                    failure_analysis = verify
                        .failure_analysis
                        .unwrap_or_else(|| "verification failed".to_string());
                }
                ResolveAttempt::Failed => {
                    self.escalate(incident_id, "transition_failed").await;
                    return;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Agent calls
    // -----------------------------------------------------------------------

    /// Breaker-guarded A2A call.
    async fn call_agent(
        &self,
        agent_id: &str,
        envelope: &Envelope,
    ) -> Result<Value, PipelineError> {
        let breaker = self.breakers.for_agent(agent_id);
        breaker
            .try_acquire()
            .map_err(|_| PipelineError::BreakerOpen {
                agent_id: agent_id.to_string(),
            })?;

        match self.router.send(agent_id, envelope, SendOptions::default()).await {
            Ok(body) => {
                breaker.record_success();
                Ok(body)
            }
            Err(e) => {
                breaker.record_failure();
                Err(e.into())
            }
        }
    }

    async fn call_triage(&self, alert: &ClaimedAlert) -> Result<TriageResponse, PipelineError> {
        let rule_id = alert
            .source
            .get("rule_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let severity = alert
            .source
            .get("severity_original")
            .and_then(Value::as_str)
            .unwrap_or("medium");

        let envelope = Envelope::new(
            "coordinator",
            agents::TRIAGE,
            &alert.alert_id,
            TaskPayload::Triage(build_triage_request(
                &alert.alert_id,
                rule_id,
                severity,
                alert.source.clone(),
            )),
        );
        let body = self.call_agent(agents::TRIAGE, &envelope).await?;
        Ok(validate_triage_response(&body)?)
    }

    async fn call_investigator(
        &self,
        incident_id: &str,
        alert: &ClaimedAlert,
        incident_type: &str,
        previous_failure_analysis: Option<String>,
    ) -> Result<InvestigateResponse, PipelineError> {
        let envelope = Envelope::new(
            "coordinator",
            agents::INVESTIGATOR,
            incident_id,
            TaskPayload::Investigate(build_investigate_request(
                incident_id,
                vec![alert.alert_id.clone()],
                incident_type,
                None,
                previous_failure_analysis,
            )),
        );
        let body = self.call_agent(agents::INVESTIGATOR, &envelope).await?;
        Ok(validate_investigate_response(&body)?)
    }

    async fn call_threat_hunter(
        &self,
        incident_id: &str,
        blast_radius: &[String],
    ) -> Result<ThreatHuntResponse, PipelineError> {
        let envelope = Envelope::new(
            "coordinator",
            agents::THREAT_HUNTER,
            incident_id,
            TaskPayload::ThreatHunt(build_threat_hunt_request(
                incident_id,
                blast_radius.to_vec(),
            )),
        );
        let body = self.call_agent(agents::THREAT_HUNTER, &envelope).await?;
        Ok(validate_threat_hunt_response(&body)?)
    }

    async fn call_commander(
        &self,
        incident_id: &str,
        incident_type: &str,
        severity: &str,
        investigation: &InvestigateResponse,
        services: &[String],
    ) -> Result<PlanResponse, PipelineError> {
        let envelope = Envelope::new(
            "coordinator",
            agents::COMMANDER,
            incident_id,
            TaskPayload::PlanRemediation(build_plan_request(
                incident_id,
                incident_type,
                severity,
                &investigation.investigation_summary,
                services.to_vec(),
            )),
        );
        let body = self.call_agent(agents::COMMANDER, &envelope).await?;
        Ok(validate_plan_response(&body)?)
    }

    async fn call_executor(
        &self,
        incident_id: &str,
        plan: &PlanResponse,
    ) -> Result<ExecuteResponse, PipelineError> {
        let envelope = Envelope::new(
            "coordinator",
            agents::EXECUTOR,
            incident_id,
            TaskPayload::ExecutePlan(build_execute_request(incident_id, plan.actions.clone())),
        );
        let body = self.call_agent(agents::EXECUTOR, &envelope).await?;
        Ok(validate_execute_response(&body)?)
    }

    async fn call_verifier(
        &self,
        incident_id: &str,
        services: &[String],
        criteria: &[SuccessCriterion],
    ) -> Result<VerifyResponse, PipelineError> {
        let envelope = Envelope::new(
            "coordinator",
            agents::VERIFIER,
            incident_id,
            TaskPayload::VerifyResolution(build_verify_request(
                incident_id,
                services.to_vec(),
                criteria.to_vec(),
            )),
        );
        let body = self.call_agent(agents::VERIFIER, &envelope).await?;
        Ok(validate_verify_response(&body)?)
    }

    // -----------------------------------------------------------------------
    // Approval wait
    // -----------------------------------------------------------------------

    async fn send_approval_request(&self, incident_id: &str, severity: &str, plan: &PlanResponse) {
        let gated: Vec<&str> = plan
            .actions
            .iter()
            .filter(|a| a.approval_required)
            .map(|a| a.description.as_str())
            .collect();
        let envelope = Envelope::new(
            "coordinator",
            agents::APPROVAL_WORKFLOW,
            incident_id,
            TaskPayload::RequestApproval(WorkflowPayload {
                args: serde_json::json!({
                    "incident_id": incident_id,
                    "severity": severity,
                    "summary": plan.remediation_plan,
                    "actions": gated,
                }),
            }),
        );
        if let Err(e) = self.call_agent(agents::APPROVAL_WORKFLOW, &envelope).await {
            tracing::warn!(incident_id, error = %e, "approval request dispatch failed");
        }
    }

    /// Poll the incident document until the webhook writes a decision or the
    /// timeout lapses.
    async fn wait_for_approval(&self, incident_id: &str) -> ApprovalWait {
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(self.config.approval_timeout_minutes * 60);

        loop {
            tokio::time::sleep(self.config.approval_poll_interval).await;
            if tokio::time::Instant::now() >= deadline {
                return ApprovalWait::TimedOut;
            }

            match self.store.get_doc(indices::INCIDENTS, incident_id).await {
                Ok(doc) => match doc
                    .source
                    .get("approval_status")
                    .and_then(Value::as_str)
                {
                    Some("approved") => return ApprovalWait::Approved,
                    Some("rejected") => return ApprovalWait::Rejected,
                    _ => {}
                },
                Err(e) => {
                    tracing::warn!(incident_id, error = %e, "approval poll read failed");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Document plumbing
    // -----------------------------------------------------------------------

    async fn create_incident(
        &self,
        alert: &ClaimedAlert,
        incident_type: &str,
        severity: &str,
        priority_score: Option<f64>,
    ) -> Result<String, PipelineError> {
        let incident_id = generate_incident_id();
        let mut doc = IncidentDoc::new(
            &incident_id,
            incident_type,
            severity,
            vec![alert.alert_id.clone()],
        );
        doc.priority_score = priority_score;

        let body = serde_json::to_value(&doc)
            .map_err(|e| PipelineError::Malformed(e.to_string()))?;
        self.store
            .index_doc(indices::INCIDENTS, Some(&incident_id), &body, true)
            .await?;

        tracing::info!(incident_id, incident_type, severity, "incident created");
        Ok(incident_id)
    }

    fn guard_ctx(&self, verification_passed: Option<bool>) -> GuardContext {
        GuardContext {
            suppress_threshold: self.config.suppress_threshold,
            max_reflections: self.config.max_reflections,
            verification_passed,
        }
    }

    async fn transition(
        &self,
        incident_id: &str,
        from: IncidentStatus,
        to: IncidentStatus,
        verification_passed: Option<bool>,
        extra_fields: Option<Value>,
    ) -> Result<IncidentDoc, TransitionError> {
        transition(
            &self.store,
            incident_id,
            from,
            to,
            &self.guard_ctx(verification_passed),
            extra_fields,
        )
        .await
    }

    /// Transition that escalates on failure. Returns Err when the pipeline
    /// should stop.
    async fn step(
        &self,
        incident_id: &str,
        from: IncidentStatus,
        to: IncidentStatus,
    ) -> Result<IncidentDoc, ()> {
        match self.transition(incident_id, from, to, None, None).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                tracing::error!(incident_id, from = %from, to = %to, error = %e, "transition failed");
                self.escalate(incident_id, "transition_failed").await;
                Err(())
            }
        }
    }

    async fn try_resolve(&self, incident_id: &str, passed: bool) -> ResolveAttempt {
        match self
            .transition(
                incident_id,
                IncidentStatus::Verifying,
                IncidentStatus::Resolved,
                Some(passed),
                Some(serde_json::json!({
                    "resolution_type": "auto_remediated",
                    "resolved_at": Utc::now(),
                })),
            )
            .await
        {
            Ok(doc) => ResolveAttempt::Resolved(doc),
            Err(TransitionError::Denied {
                redirect_to: Some(IncidentStatus::Reflecting),
                ..
            }) => ResolveAttempt::Reflect,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "resolution transition failed");
                ResolveAttempt::Failed
            }
        }
    }

    async fn finalize_resolution(&self, doc: IncidentDoc) {
        let metrics = timing::compute(&doc.state_timestamps);
        tracing::info!(
            incident_id = %doc.incident_id,
            reflection_count = doc.reflection_count,
            ttv_ms = metrics.ttv_ms,
            "incident resolved"
        );

        if let Ok(timing_value) = serde_json::to_value(&metrics) {
            if let Err(e) = self
                .store
                .update_doc(
                    indices::INCIDENTS,
                    &doc.incident_id,
                    &serde_json::json!({"timing_metrics": timing_value}),
                    None,
                )
                .await
            {
                tracing::warn!(incident_id = %doc.incident_id, error = %e, "timing metrics write failed");
            }
        }

        if let Some(analyst) = &self.analyst {
            analyst.spawn_retrospective(doc.incident_id.clone());
        }
        reporting::trigger_incident_report(
            self.store.clone(),
            self.router.clone(),
            doc,
            metrics,
        );
    }

    async fn record_investigation(&self, incident_id: &str, investigation: &InvestigateResponse) {
        let partial = serde_json::json!({
            "investigation_summary": investigation.investigation_summary,
            "affected_services": investigation.affected_services,
        });
        if let Err(e) = self
            .store
            .update_doc(indices::INCIDENTS, incident_id, &partial, None)
            .await
        {
            tracing::warn!(incident_id, error = %e, "investigation record write failed");
        }
    }

    async fn record_plan(&self, incident_id: &str, plan: &PlanResponse) {
        let partial = serde_json::json!({
            "remediation_plan": plan.remediation_plan,
        });
        if let Err(e) = self
            .store
            .update_doc(indices::INCIDENTS, incident_id, &partial, None)
            .await
        {
            tracing::warn!(incident_id, error = %e, "plan record write failed");
        }
    }

    /// Append one verify outcome to the incident's result list
    /// (read-modify-write under the concurrency token, one retry).
    async fn append_verification_result(&self, incident_id: &str, verify: &VerifyResponse) {
        for attempt in 0..2 {
            let raw = match self.store.get_doc(indices::INCIDENTS, incident_id).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(incident_id, error = %e, "verification append read failed");
                    return;
                }
            };
            let mut results = raw
                .source
                .get("verification_results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            results.push(serde_json::to_value(verify).unwrap_or(Value::Null));

            match self
                .store
                .update_doc(
                    indices::INCIDENTS,
                    incident_id,
                    &serde_json::json!({"verification_results": results}),
                    Some(raw.token()),
                )
                .await
            {
                Ok(()) => return,
                Err(StoreError::VersionConflict { .. }) if attempt == 0 => continue,
                Err(e) => {
                    tracing::warn!(incident_id, error = %e, "verification append write failed");
                    return;
                }
            }
        }
    }

    async fn read_reflection_count(&self, incident_id: &str) -> Result<u32, PipelineError> {
        let raw = self.store.get_doc(indices::INCIDENTS, incident_id).await?;
        Ok(raw
            .source
            .get("reflection_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32)
    }

    async fn escalate(&self, incident_id: &str, reason: &str) -> EscalationOutcome {
        escalate_incident(&self.store, &self.router, incident_id, reason).await
    }

    async fn mark_alert_processed(&self, alert: &ClaimedAlert) {
        let partial = serde_json::json!({"processed_at": Utc::now()});
        if let Err(e) = self
            .store
            .update_doc(&alert.index, &alert.alert_id, &partial, None)
            .await
        {
            tracing::warn!(alert_id = %alert.alert_id, error = %e, "processed marker write failed");
        }
    }
}

enum ResolveAttempt {
    Resolved(IncidentDoc),
    Reflect,
    Failed,
}

/// Services to plan and verify against, falling back to the alert's asset
/// when the investigator named none (verification needs at least one).
fn effective_services(investigation: &InvestigateResponse, alert: &ClaimedAlert) -> Vec<String> {
    if !investigation.affected_services.is_empty() {
        return investigation.affected_services.clone();
    }
    alert
        .source
        .get("affected_asset_id")
        .and_then(Value::as_str)
        .map(|asset| vec![asset.to_string()])
        .unwrap_or_else(|| vec!["unknown-service".to_string()])
}

/// The Commander's criteria, or a conservative default error-rate criterion
/// per service when the plan named none.
fn effective_criteria(plan: &PlanResponse, services: &[String]) -> Vec<SuccessCriterion> {
    if !plan.success_criteria.is_empty() {
        return plan.success_criteria.clone();
    }
    services
        .iter()
        .map(|service| SuccessCriterion {
            metric: "error_rate".into(),
            operator: CriterionOperator::Lte,
            threshold: 0.05,
            service_name: service.clone(),
        })
        .collect()
}

/// Synthesized minimal investigation for weakly-correlated operational
/// anomalies.
fn synthesize_investigation(alert: &ClaimedAlert) -> InvestigateResponse {
    let anomaly = alert
        .source
        .pointer("/anomaly_report/summary")
        .or_else(|| alert.source.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("anomaly detected");
    let services = alert
        .source
        .get("affected_services")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    InvestigateResponse {
        investigation_summary: format!("Synthesized from anomaly report: {}", anomaly),
        blast_radius: Vec::new(),
        affected_services: services,
        recommended_next: "plan_remediation".to_string(),
        confidence: None,
    }
}
