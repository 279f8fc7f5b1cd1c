//! Escalation with a one-shot latch.
//!
//! `escalation_triggered` flips `false → true` at most once per incident; a
//! second escalate call is a skip, not a second page.

use chrono::Utc;
use std::sync::Arc;

use vigil_a2a::{agents, A2aRouter, SendOptions};
use vigil_contracts::{Envelope, TaskPayload, WorkflowPayload};
use vigil_store::{indices, EsClient, StoreError};

use crate::incident::{IncidentDoc, IncidentStatus};

/// What an escalate call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationOutcome {
    pub skipped: bool,
    pub reason: String,
}

/// Latch the incident into `escalated` and notify humans once.
///
/// Re-reads with tokens, refuses to latch twice, and treats a lost write
/// race as "the other writer knows better" — re-read and re-check. The
/// notification is best-effort; a failed send is logged, never thrown.
pub async fn escalate_incident(
    store: &Arc<EsClient>,
    router: &Arc<A2aRouter>,
    incident_id: &str,
    reason: &str,
) -> EscalationOutcome {
    for attempt in 0..2 {
        let raw = match store.get_doc(indices::INCIDENTS, incident_id).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "cannot read incident for escalation");
                return EscalationOutcome {
                    skipped: true,
                    reason: "incident_unreadable".into(),
                };
            }
        };
        let doc: IncidentDoc = match serde_json::from_value(raw.source.clone()) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(incident_id, error = %e, "malformed incident document");
                return EscalationOutcome {
                    skipped: true,
                    reason: "incident_malformed".into(),
                };
            }
        };

        if doc.escalation_triggered {
            tracing::info!(incident_id, "escalation already latched, skipping");
            return EscalationOutcome {
                skipped: true,
                reason: "already_escalated".into(),
            };
        }

        let mut partial = serde_json::json!({
            "status": IncidentStatus::Escalated.as_str(),
            "escalation_triggered": true,
            "escalation_reason": reason,
        });
        if !doc.state_timestamps.contains_key("escalated") {
            partial["_state_timestamps"] = serde_json::json!({"escalated": Utc::now()});
        }

        match store
            .update_doc(indices::INCIDENTS, incident_id, &partial, Some(raw.token()))
            .await
        {
            Ok(()) => {
                tracing::warn!(incident_id, reason, "incident escalated");
                notify(router, incident_id, reason, &doc).await;
                return EscalationOutcome {
                    skipped: false,
                    reason: reason.to_string(),
                };
            }
            Err(StoreError::VersionConflict { .. }) if attempt == 0 => {
                tracing::debug!(incident_id, "escalation write conflicted, re-reading");
                continue;
            }
            Err(e) => {
                tracing::error!(incident_id, error = %e, "escalation write failed");
                return EscalationOutcome {
                    skipped: true,
                    reason: "write_failed".into(),
                };
            }
        }
    }

    EscalationOutcome {
        skipped: true,
        reason: "contention".into(),
    }
}

async fn notify(router: &Arc<A2aRouter>, incident_id: &str, reason: &str, doc: &IncidentDoc) {
    let envelope = Envelope::new(
        "coordinator",
        agents::NOTIFICATION_WORKFLOW,
        incident_id,
        TaskPayload::Notify(WorkflowPayload {
            args: serde_json::json!({
                "kind": "escalation",
                "incident_id": incident_id,
                "reason": reason,
                "severity": doc.severity,
                "incident_type": doc.incident_type,
                "affected_services": doc.affected_services,
            }),
        }),
    );

    if let Err(e) = router
        .send(agents::NOTIFICATION_WORKFLOW, &envelope, SendOptions::default())
        .await
    {
        tracing::error!(incident_id, error = %e, "escalation notification failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_a2a::AgentDirectory;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn incident_source(escalation_triggered: bool) -> serde_json::Value {
        serde_json::json!({
            "incident_id": "INC-2026-A1B2C",
            "status": "verifying",
            "incident_type": "security",
            "severity": "high",
            "alert_ids": ["a-1"],
            "escalation_triggered": escalation_triggered,
            "created_at": "2026-08-01T12:00:00Z",
            "_state_timestamps": {"detected": "2026-08-01T12:00:00Z"}
        })
    }

    async fn setup(server: &MockServer) -> (Arc<EsClient>, Arc<A2aRouter>) {
        let store = Arc::new(EsClient::new(server.uri(), "dGVzdA==").unwrap());
        let directory = AgentDirectory::new(server.uri());
        let router = Arc::new(A2aRouter::new(directory, store.clone(), server.uri()));
        (store, router)
    }

    #[tokio::test]
    async fn test_escalation_latches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents/_doc/INC-2026-A1B2C"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "INC-2026-A1B2C",
                "_source": incident_source(true),
                "_seq_no": 9,
                "_primary_term": 1
            })))
            .mount(&server)
            .await;
        // No update or notification mocks: any write attempt would 404 and
        // show up as a non-skipped outcome.

        let (store, router) = setup(&server).await;
        let outcome = escalate_incident(&store, &router, "INC-2026-A1B2C", "approval_timeout").await;

        assert!(outcome.skipped);
        assert_eq!(outcome.reason, "already_escalated");
    }

    #[tokio::test]
    async fn test_escalation_writes_latch_and_reason() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/incidents/_doc/INC-2026-A1B2C"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "_id": "INC-2026-A1B2C",
                "_source": incident_source(false),
                "_seq_no": 4,
                "_primary_term": 1
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/incidents/_update/INC-2026-A1B2C"))
            .and(query_param("if_seq_no", "4"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "doc": {
                    "status": "escalated",
                    "escalation_triggered": true,
                    "escalation_reason": "reflection_limit_reached"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        // Notification path: card fetch fails, which is logged, not thrown.
        Mock::given(method("GET"))
            .and(path(
                "/agents/notification-workflow/.well-known/agent.json",
            ))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agent-telemetry/_doc"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "t-1", "result": "created"})),
            )
            .mount(&server)
            .await;

        let (store, router) = setup(&server).await;
        let outcome =
            escalate_incident(&store, &router, "INC-2026-A1B2C", "reflection_limit_reached").await;

        assert!(!outcome.skipped);
        assert_eq!(outcome.reason, "reflection_limit_reached");
    }
}
