//! Post-resolution reporting.
//!
//! On resolution the Coordinator assembles an incident report document and
//! pokes the reporting workflow. Both writes are fire-and-forget: reporting
//! never blocks or fails the pipeline.

use chrono::Utc;
use std::sync::Arc;

use vigil_a2a::{agents, A2aRouter, SendOptions};
use vigil_contracts::{Envelope, TaskPayload, WorkflowPayload};
use vigil_store::{indices, EsClient};

use crate::incident::IncidentDoc;
use crate::timing::TimingMetrics;

/// Assemble and index the incident report, then trigger the reporting
/// workflow.
pub fn trigger_incident_report(
    store: Arc<EsClient>,
    router: Arc<A2aRouter>,
    doc: IncidentDoc,
    timing: TimingMetrics,
) {
    tokio::spawn(async move {
        let report = serde_json::json!({
            "report_type": "incident",
            "generated_at": Utc::now(),
            "incident_id": doc.incident_id,
            "incident_type": doc.incident_type,
            "severity": doc.severity,
            "status": doc.status,
            "alert_ids": doc.alert_ids,
            "affected_services": doc.affected_services,
            "investigation_summary": doc.investigation_summary,
            "remediation_plan": doc.remediation_plan,
            "verification_attempts": doc.verification_results.len(),
            "reflection_count": doc.reflection_count,
            "resolution_type": doc.resolution_type,
            "created_at": doc.created_at,
            "resolved_at": doc.resolved_at,
            "timing": timing,
        });

        if let Err(e) = store.index_doc(indices::REPORTS, None, &report, false).await {
            tracing::warn!(incident_id = %doc.incident_id, error = %e, "report indexing failed");
        }

        let envelope = Envelope::new(
            "coordinator",
            agents::REPORTING_WORKFLOW,
            doc.incident_id.clone(),
            TaskPayload::GenerateReport(WorkflowPayload {
                args: serde_json::json!({
                    "report_type": "incident",
                    "incident_id": doc.incident_id,
                }),
            }),
        );
        if let Err(e) = router
            .send(agents::REPORTING_WORKFLOW, &envelope, SendOptions::default())
            .await
        {
            tracing::warn!(incident_id = %doc.incident_id, error = %e, "reporting workflow trigger failed");
        }
    });
}
