//! PagerDuty Events API v2 client.

use serde_json::Value;
use std::sync::Arc;

use vigil_resilience::IntegrationCircuitBreaker;

use crate::error::IntegrationError;

const INTEGRATION: &str = "pagerduty";

/// Map Vigil severity onto PagerDuty's event severity scale.
pub fn pd_severity(severity: &str) -> &'static str {
    match severity {
        "critical" => "critical",
        "high" => "error",
        "medium" => "warning",
        _ => "info",
    }
}

/// Events v2 client. One dedup key per incident keeps re-notifications from
/// paging twice.
pub struct PagerDutyClient {
    http: reqwest::Client,
    base_url: String,
    routing_key: String,
    breaker: Arc<IntegrationCircuitBreaker>,
}

impl PagerDutyClient {
    pub fn new(routing_key: impl Into<String>, breaker: Arc<IntegrationCircuitBreaker>) -> Self {
        Self::with_base_url("https://events.pagerduty.com", routing_key, breaker)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        routing_key: impl Into<String>,
        breaker: Arc<IntegrationCircuitBreaker>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routing_key: routing_key.into(),
            breaker,
        }
    }

    /// Trigger (or re-trigger, deduplicated) an incident page.
    pub async fn trigger(
        &self,
        incident_id: &str,
        summary: &str,
        severity: &str,
        details: Value,
    ) -> Result<(), IntegrationError> {
        self.breaker
            .try_acquire()
            .map_err(|e| IntegrationError::permanent(INTEGRATION, e.to_string()))?;

        let body = serde_json::json!({
            "routing_key": self.routing_key,
            "event_action": "trigger",
            "dedup_key": format!("vigil-{}", incident_id),
            "payload": {
                "summary": summary,
                "severity": pd_severity(severity),
                "source": incident_id,
                "component": "vigil",
                "custom_details": details,
            }
        });

        let result = self.post_once(&body).await;
        match &result {
            Ok(()) => self.breaker.record_success(),
            Err(e) => self.breaker.record_failure(e.retryable),
        }
        result
    }

    async fn post_once(&self, body: &Value) -> Result<(), IntegrationError> {
        let response = self
            .http
            .post(format!("{}/v2/enqueue", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| IntegrationError::transient(INTEGRATION, e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }

        let message = format!("events api returned status {}", status);
        if status >= 500 {
            Err(IntegrationError::transient(INTEGRATION, message))
        } else {
            Err(IntegrationError::permanent(INTEGRATION, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_resilience::IntegrationBreakerConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PagerDutyClient {
        PagerDutyClient::with_base_url(
            server.uri(),
            "routing-key",
            Arc::new(IntegrationCircuitBreaker::new(
                "pagerduty",
                IntegrationBreakerConfig::default(),
            )),
        )
    }

    #[test]
    fn test_severity_map() {
        assert_eq!(pd_severity("critical"), "critical");
        assert_eq!(pd_severity("high"), "error");
        assert_eq!(pd_severity("medium"), "warning");
        assert_eq!(pd_severity("low"), "info");
        assert_eq!(pd_severity("info"), "info");
    }

    #[tokio::test]
    async fn test_trigger_sends_dedup_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_partial_json(serde_json::json!({
                "dedup_key": "vigil-INC-2026-A1B2C",
                "payload": {"severity": "error"}
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "status": "success"
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .trigger("INC-2026-A1B2C", "Checkout degraded", "high", serde_json::json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_4xx_permanent_5xx_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let c = client(&server);
        let first = c
            .trigger("INC-1", "x", "low", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(!first.retryable);

        let second = c
            .trigger("INC-1", "x", "low", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(second.retryable);
    }
}
