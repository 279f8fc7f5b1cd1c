//! The A2A send path.

use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use vigil_contracts::Envelope;
use vigil_store::EsClient;

use crate::directory::AgentDirectory;
use crate::error::A2aError;
use crate::telemetry::{emit, TelemetryRecord, TelemetryStatus};
use crate::timeouts::timeout_for;

/// Delay before the single retry of a 5xx response.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Per-send overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Override the per-agent timeout table.
    pub timeout: Option<Duration>,
}

/// Routes envelopes to agents.
///
/// The send path: validate → resolve card → capability gate → POST with the
/// per-agent timeout → one retry on 5xx → classify. Exactly one telemetry
/// record is written per call once the card-resolution stage is entered.
pub struct A2aRouter {
    directory: Arc<AgentDirectory>,
    store: Arc<EsClient>,
    http: reqwest::Client,
    base_url: String,
}

impl A2aRouter {
    pub fn new(
        directory: Arc<AgentDirectory>,
        store: Arc<EsClient>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            store,
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send an envelope to an agent and return its response body.
    pub async fn send(
        &self,
        agent_id: &str,
        envelope: &Envelope,
        opts: SendOptions,
    ) -> Result<Value, A2aError> {
        // Malformed envelopes are refused before the call path is entered.
        envelope.validate()?;

        let task = envelope.payload.task_name();
        let started = Instant::now();

        let card = match self.directory.get_card(agent_id).await {
            Ok(card) => card,
            Err(e) => {
                self.record(envelope, task, TelemetryStatus::CardUnavailable, started, Some(&e))
                    .await;
                return Err(e);
            }
        };

        if !card.supports(task) {
            let e = A2aError::CapabilityMissing {
                agent_id: agent_id.to_string(),
                task: task.to_string(),
            };
            self.record(envelope, task, TelemetryStatus::Error, started, Some(&e))
                .await;
            return Err(e);
        }

        let timeout = opts.timeout.unwrap_or_else(|| timeout_for(agent_id));
        let url = format!(
            "{}/{}",
            self.base_url,
            card.endpoint.trim_start_matches('/')
        );

        let result = self.post_with_retry(agent_id, &url, envelope, timeout).await;

        let (status, error) = match &result {
            Ok(_) => (TelemetryStatus::Success, None),
            Err(e @ A2aError::AgentTimeout { .. }) => (TelemetryStatus::Timeout, Some(e)),
            Err(e) => (TelemetryStatus::Error, Some(e)),
        };
        self.record(envelope, task, status, started, error).await;

        result
    }

    async fn post_with_retry(
        &self,
        agent_id: &str,
        url: &str,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<Value, A2aError> {
        match self.post_once(agent_id, url, envelope, timeout).await {
            // A 5xx is worth one more try; a 4xx means the request itself is
            // wrong and will not improve.
            Err(A2aError::Agent { status, .. }) if status >= 500 => {
                tracing::warn!(agent_id, status, "agent returned 5xx, retrying once");
                tokio::time::sleep(RETRY_DELAY).await;
                self.post_once(agent_id, url, envelope, timeout).await
            }
            other => other,
        }
    }

    async fn post_once(
        &self,
        agent_id: &str,
        url: &str,
        envelope: &Envelope,
        timeout: Duration,
    ) -> Result<Value, A2aError> {
        let response = self
            .http
            .post(url)
            .timeout(timeout)
            .json(envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    A2aError::AgentTimeout {
                        agent_id: agent_id.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    A2aError::Transport {
                        agent_id: agent_id.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.ok();
            return Err(A2aError::Agent {
                agent_id: agent_id.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| {
            if e.is_timeout() {
                A2aError::AgentTimeout {
                    agent_id: agent_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                A2aError::Transport {
                    agent_id: agent_id.to_string(),
                    message: format!("malformed response body: {}", e),
                }
            }
        })
    }

    async fn record(
        &self,
        envelope: &Envelope,
        task: &str,
        status: TelemetryStatus,
        started: Instant,
        error: Option<&A2aError>,
    ) {
        emit(
            &self.store,
            TelemetryRecord {
                timestamp: Utc::now(),
                from_agent: envelope.from_agent.clone(),
                to_agent: envelope.to_agent.clone(),
                task: task.to_string(),
                status,
                execution_time_ms: started.elapsed().as_millis() as u64,
                message_id: envelope.message_id.clone(),
                correlation_id: envelope.correlation_id.clone(),
                error: error.map(|e| e.to_string()),
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::AgentCard;
    use vigil_contracts::{build_triage_request, TaskPayload};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer) -> (Arc<AgentDirectory>, A2aRouter) {
        // Telemetry writes land on the same mock server.
        Mock::given(method("POST"))
            .and(path("/agent-telemetry/_doc"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "t-1", "result": "created"})),
            )
            .mount(server)
            .await;

        let store = Arc::new(EsClient::new(server.uri(), "dGVzdA==").unwrap());
        let directory = AgentDirectory::new(server.uri());
        directory
            .register(AgentCard {
                agent_id: "triage".into(),
                name: "Triage".into(),
                version: "1.0.0".into(),
                capabilities: Some(vec![crate::card::Capability::Name("triage".into())]),
                endpoint: "/agents/triage/invoke".into(),
            })
            .await;

        let router = A2aRouter::new(directory.clone(), store, server.uri());
        (directory, router)
    }

    fn triage_envelope() -> Envelope {
        Envelope::new(
            "coordinator",
            "triage",
            "INC-2026-A1B2C",
            TaskPayload::Triage(build_triage_request(
                "a-1",
                "rule-7",
                "high",
                serde_json::json!({}),
            )),
        )
    }

    #[tokio::test]
    async fn test_send_returns_response_body() {
        let server = MockServer::start().await;
        let (_, router) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/agents/triage/invoke"))
            .and(body_partial_json(serde_json::json!({
                "payload": {"task": "triage"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "priority_score": 0.87,
                "disposition": "investigate",
                "severity": "high"
            })))
            .mount(&server)
            .await;

        let body = router
            .send("triage", &triage_envelope(), SendOptions::default())
            .await
            .unwrap();

        assert_eq!(body["priority_score"], 0.87);
    }

    #[tokio::test]
    async fn test_capability_gate_blocks_send() {
        let server = MockServer::start().await;
        let (directory, router) = setup(&server).await;

        directory
            .register(AgentCard {
                agent_id: "commander".into(),
                name: "Commander".into(),
                version: "1.0.0".into(),
                capabilities: Some(vec![crate::card::Capability::Name(
                    "plan_remediation".into(),
                )]),
                endpoint: "/agents/commander/invoke".into(),
            })
            .await;

        let result = router
            .send("commander", &triage_envelope(), SendOptions::default())
            .await;

        assert!(matches!(result, Err(A2aError::CapabilityMissing { .. })));
    }

    #[tokio::test]
    async fn test_5xx_retried_once_then_succeeds() {
        let server = MockServer::start().await;
        let (_, router) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/agents/triage/invoke"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/agents/triage/invoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "priority_score": 0.5,
                "disposition": "queue",
                "severity": "medium"
            })))
            .mount(&server)
            .await;

        let body = router
            .send("triage", &triage_envelope(), SendOptions::default())
            .await
            .unwrap();

        assert_eq!(body["disposition"], "queue");
    }

    #[tokio::test]
    async fn test_4xx_not_retried() {
        let server = MockServer::start().await;
        let (_, router) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/agents/triage/invoke"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let result = router
            .send("triage", &triage_envelope(), SendOptions::default())
            .await;

        assert!(
            matches!(result, Err(A2aError::Agent { status: 400, .. })),
            "4xx must surface without retry"
        );
    }

    #[tokio::test]
    async fn test_timeout_maps_to_agent_timeout() {
        let server = MockServer::start().await;
        let (_, router) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/agents/triage/invoke"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let result = router
            .send(
                "triage",
                &triage_envelope(),
                SendOptions {
                    timeout: Some(Duration::from_millis(50)),
                },
            )
            .await;

        assert!(matches!(result, Err(A2aError::AgentTimeout { .. })));
    }

    #[tokio::test]
    async fn test_card_unavailable_status() {
        let server = MockServer::start().await;
        let (_, router) = setup(&server).await;

        // No card registered and the well-known fetch 404s.
        Mock::given(method("GET"))
            .and(path("/agents/ghost/.well-known/agent.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut envelope = triage_envelope();
        envelope.to_agent = "ghost".into();
        let result = router.send("ghost", &envelope, SendOptions::default()).await;

        assert!(matches!(result, Err(A2aError::CardUnavailable { .. })));
    }
}
