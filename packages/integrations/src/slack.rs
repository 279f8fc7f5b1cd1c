//! Slack outbound client.

use serde_json::Value;
use std::sync::Arc;

use vigil_resilience::IntegrationCircuitBreaker;

use crate::error::IntegrationError;

const INTEGRATION: &str = "slack";

/// `chat.postMessage` client.
///
/// Retry classification per Slack's API behavior: 401 means a bad token and
/// never improves; 429 and `ok:false` + `rate_limited` are retryable (with
/// `retry-after` when Slack provides one); any other `ok:false` is a
/// permanent payload problem.
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    breaker: Arc<IntegrationCircuitBreaker>,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, breaker: Arc<IntegrationCircuitBreaker>) -> Self {
        Self::with_base_url("https://slack.com", token, breaker)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        breaker: Arc<IntegrationCircuitBreaker>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            breaker,
        }
    }

    /// Post a message to a channel.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<Value>,
    ) -> Result<(), IntegrationError> {
        self.breaker
            .try_acquire()
            .map_err(|e| IntegrationError::permanent(INTEGRATION, e.to_string()))?;

        let mut body = serde_json::json!({ "channel": channel, "text": text });
        if let Some(blocks) = blocks {
            body["blocks"] = blocks;
        }

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
            .post(format!("{}/api/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| IntegrationError::transient(INTEGRATION, e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(IntegrationError::permanent(INTEGRATION, "invalid bot token"));
        }
        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(IntegrationError::rate_limited(
                INTEGRATION,
                "rate limited",
                retry_after,
            ));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| IntegrationError::transient(INTEGRATION, e.to_string()))?;

        if parsed.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }

        let error = parsed
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        if error == "rate_limited" {
            Err(IntegrationError::rate_limited(INTEGRATION, error.to_string(), None))
        } else {
            Err(IntegrationError::permanent(INTEGRATION, error.to_string()))
        }
    }
}

/// Block Kit message asking a human to approve or reject a remediation.
///
/// Button `action_id`s embed the incident id (parsed back out by the
/// approval callback); the approve/reject `value` carries the gated action's
/// audit id when there is one.
pub fn approval_blocks(
    incident_id: &str,
    summary: &str,
    severity: &str,
    action_id: Option<&str>,
) -> Value {
    let value = action_id.unwrap_or("");
    serde_json::json!([
        {
            "type": "section",
            "text": {
                "type": "mrkdwn",
                "text": format!("*Approval required — {}* ({})\n{}", incident_id, severity, summary)
            }
        },
        {
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "style": "primary",
                    "text": {"type": "plain_text", "text": "Approve"},
                    "action_id": format!("vigil_approve_{}", incident_id),
                    "value": value
                },
                {
                    "type": "button",
                    "style": "danger",
                    "text": {"type": "plain_text", "text": "Reject"},
                    "action_id": format!("vigil_reject_{}", incident_id),
                    "value": value
                },
                {
                    "type": "button",
                    "text": {"type": "plain_text", "text": "More info"},
                    "action_id": format!("vigil_info_{}", incident_id),
                    "value": value
                }
            ]
        }
    ])
}
