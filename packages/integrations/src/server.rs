//! Webhook ingestion server.
//!
//! Two signed surfaces: GitHub deployment/push events (HMAC over the raw
//! body) and Slack approval callbacks (signed timestamp + body). Signature
//! checks happen against the raw bytes before any parsing, and `event_type`
//! is recorded from the event header, never re-derived from the body.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use vigil_store::{indices, EsClient};

use crate::signature::{verify_github_signature, verify_slack_signature};

/// GitHub event types worth indexing.
const INDEXED_GITHUB_EVENTS: &[&str] = &["push", "deployment", "deployment_status", "pull_request"];

/// Shared state for the webhook server.
pub struct WebhookState {
    pub store: Arc<EsClient>,
    pub github_secret: String,
    pub slack_signing_secret: String,
    started_at: Instant,
}

impl WebhookState {
    pub fn new(store: Arc<EsClient>, github_secret: String, slack_signing_secret: String) -> Self {
        Self {
            store,
            github_secret,
            slack_signing_secret,
            started_at: Instant::now(),
        }
    }
}

/// Build the webhook router.
pub fn webhook_routes(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook/github", post(github_webhook))
        .route("/api/vigil/approval-callback", post(approval_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<WebhookState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime": state.started_at.elapsed().as_secs(),
    }))
}

async fn github_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let signature = header_str(&headers, "x-hub-signature-256");
    if !verify_github_signature(&state.github_secret, &body, signature) {
        tracing::warn!("github webhook signature mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid signature"})),
        );
    }

    // The event header is authoritative; the body never overrides it.
    let event_type = header_str(&headers, "x-github-event").to_string();
    if !INDEXED_GITHUB_EVENTS.contains(&event_type.as_str()) {
        return (
            StatusCode::OK,
            Json(serde_json::json!({"ignored": event_type})),
        );
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": format!("invalid payload: {}", e)})),
            )
        }
    };

    // Merged pull requests matter for change correlation; open ones do not.
    if event_type == "pull_request"
        && payload
            .pointer("/pull_request/merged")
            .and_then(Value::as_bool)
            != Some(true)
    {
        return (
            StatusCode::OK,
            Json(serde_json::json!({"ignored": "unmerged pull_request"})),
        );
    }

    let record = serde_json::json!({
        "event_type": event_type,
        "received_at": Utc::now(),
        "repository": payload.pointer("/repository/full_name"),
        "sender": payload.pointer("/sender/login"),
        "payload": payload,
    });
    match state
        .store
        .index_doc(indices::GITHUB_EVENTS, None, &record, false)
        .await
    {
        Ok(_) => {
            tracing::info!(event_type = %record["event_type"], "github event indexed");
            (StatusCode::ACCEPTED, Json(serde_json::json!({"indexed": true})))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to index github event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "indexing failed"})),
            )
        }
    }
}

async fn approval_callback(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let timestamp = header_str(&headers, "x-slack-request-timestamp");
    let signature = header_str(&headers, "x-slack-signature");
    if !verify_slack_signature(&state.slack_signing_secret, timestamp, &body, signature) {
        tracing::warn!("slack approval callback signature mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "invalid signature"})),
        );
    }

    let Some(payload) = parse_slack_payload(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "malformed payload"})),
        );
    };

    let action = payload.pointer("/actions/0").cloned().unwrap_or(Value::Null);
    let action_id = action.get("action_id").and_then(Value::as_str).unwrap_or("");

    let (decision, incident_id) = match parse_action_id(action_id) {
        Some(parsed) => parsed,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "unrecognized action_id"})),
            )
        }
    };

    // `info` is display-only: acknowledge, index nothing.
    if decision == "info" {
        return (
            StatusCode::OK,
            Json(serde_json::json!({
                "text": format!("Details for {} are in the incident channel.", incident_id)
            })),
        );
    }

    let approver = payload
        .pointer("/user/username")
        .or_else(|| payload.pointer("/user/id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    // Buttons may carry the per-action audit id in `value`.
    let gated_action = action.get("value").and_then(Value::as_str);

    let mut record = serde_json::json!({
        "incident_id": incident_id,
        "decision": decision,
        "approver": approver,
        "timestamp": Utc::now(),
    });
    if let Some(gated_action) = gated_action {
        record["action_id"] = Value::from(gated_action);
    }

    if let Err(e) = state
        .store
        .index_doc(indices::APPROVAL_RESPONSES, None, &record, true)
        .await
    {
        tracing::error!(incident_id = %incident_id, error = %e, "failed to index approval response");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "indexing failed"})),
        );
    }

    // The Coordinator polls this field while in awaiting_approval.
    let approval_status = if decision == "approve" {
        "approved"
    } else {
        "rejected"
    };
    if let Err(e) = state
        .store
        .update_doc(
            indices::INCIDENTS,
            &incident_id,
            &serde_json::json!({"approval_status": approval_status}),
            None,
        )
        .await
    {
        tracing::warn!(incident_id = %incident_id, error = %e, "could not update incident approval status");
    }

    tracing::info!(incident_id = %incident_id, decision, approver, "approval decision recorded");
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "text": format!("Recorded *{}* for {} (by {})", approval_status, incident_id, approver)
        })),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// Slack interactivity posts `payload=<url-encoded json>`.
fn parse_slack_payload(body: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(body).ok()?;
    let encoded = text.strip_prefix("payload=")?;
    // Form encoding: `+` is a space, and must be restored before
    // percent-decoding so literal `%2B` survives as `+`.
    let replaced = encoded.replace('+', " ");
    let decoded = urlencoding::decode(&replaced).ok()?;
    serde_json::from_str(&decoded).ok()
}

/// Split a Block Kit action id into `(decision, incident_id)`.
///
/// The incident id is sanitized to alphanumerics and dashes; anything else
/// is rejected rather than written into a document key.
fn parse_action_id(action_id: &str) -> Option<(&'static str, String)> {
    let (decision, rest) = if let Some(rest) = action_id.strip_prefix("vigil_approve_") {
        ("approve", rest)
    } else if let Some(rest) = action_id.strip_prefix("vigil_reject_") {
        ("reject", rest)
    } else if let Some(rest) = action_id.strip_prefix("vigil_info_") {
        ("info", rest)
    } else {
        return None;
    };

    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }
    Some((decision, rest.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GITHUB_SECRET: &str = "gh-secret";
    const SLACK_SECRET: &str = "slack-secret";

    fn hmac_hex(secret: &str, message: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    async fn app(server: &MockServer) -> Router {
        let store = Arc::new(EsClient::new(server.uri(), "dGVzdA==").unwrap());
        webhook_routes(Arc::new(WebhookState::new(
            store,
            GITHUB_SECRET.into(),
            SLACK_SECRET.into(),
        )))
    }

    fn github_request(body: &[u8], event: &str, signature: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/webhook/github")
            .header("x-hub-signature-256", signature)
            .header("x-github-event", event)
            .body(axum::body::Body::from(body.to_vec()))
            .unwrap()
    }

    fn slack_request(json_payload: &Value) -> axum::http::Request<axum::body::Body> {
        let encoded = format!(
            "payload={}",
            urlencoding::encode(&json_payload.to_string())
        );
        let ts = chrono::Utc::now().timestamp().to_string();
        let mut base = format!("v0:{}:", ts).into_bytes();
        base.extend_from_slice(encoded.as_bytes());
        let signature = format!("v0={}", hmac_hex(SLACK_SECRET, &base));

        axum::http::Request::builder()
            .method("POST")
            .uri("/api/vigil/approval-callback")
            .header("x-slack-request-timestamp", ts)
            .header("x-slack-signature", signature)
            .body(axum::body::Body::from(encoded))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_uptime() {
        let server = MockServer::start().await;
        let response = app(&server)
            .await
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_github_bad_signature_is_401() {
        let server = MockServer::start().await;
        let body = br#"{"ref":"refs/heads/main"}"#;

        let response = app(&server)
            .await
            .oneshot(github_request(body, "push", "sha256=deadbeef"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_github_push_indexed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/github-events/_doc"))
            .and(body_partial_json(serde_json::json!({"event_type": "push"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "g-1", "result": "created"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let body = br#"{"ref":"refs/heads/main","repository":{"full_name":"acme/checkout"}}"#;
        let signature = format!("sha256={}", hmac_hex(GITHUB_SECRET, body));

        let response = app(&server)
            .await
            .oneshot(github_request(body, "push", &signature))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_github_unmerged_pr_ignored() {
        let server = MockServer::start().await;
        // No mock for the index path: indexing would 404 and fail the test
        // if the handler tried to write.
        let body = br#"{"pull_request":{"merged":false}}"#;
        let signature = format!("sha256={}", hmac_hex(GITHUB_SECRET, body));

        let response = app(&server)
            .await
            .oneshot(github_request(body, "pull_request", &signature))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_approval_approve_indexes_and_updates_incident() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/approval-responses/_doc"))
            .and(body_partial_json(serde_json::json!({
                "incident_id": "INC-2026-A1B2C",
                "decision": "approve"
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"_id": "ar-1", "result": "created"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/incidents/_update/INC-2026-A1B2C"))
            .and(body_partial_json(serde_json::json!({
                "doc": {"approval_status": "approved"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = serde_json::json!({
            "user": {"username": "alice"},
            "actions": [{"action_id": "vigil_approve_INC-2026-A1B2C", "value": "ACT-2026-7XM2P"}]
        });

        let response = app(&server).await.oneshot(slack_request(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_info_action_is_display_only() {
        let server = MockServer::start().await;
        // No store mocks: any write attempt would fail loudly.
        let payload = serde_json::json!({
            "user": {"username": "bob"},
            "actions": [{"action_id": "vigil_info_INC-2026-A1B2C"}]
        });

        let response = app(&server).await.oneshot(slack_request(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malicious_incident_id_rejected() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({
            "user": {"username": "mallory"},
            "actions": [{"action_id": "vigil_approve_../../etc/passwd"}]
        });

        let response = app(&server).await.oneshot(slack_request(&payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_action_id_variants() {
        assert_eq!(
            parse_action_id("vigil_approve_INC-2026-A1B2C"),
            Some(("approve", "INC-2026-A1B2C".to_string()))
        );
        assert_eq!(
            parse_action_id("vigil_reject_INC-2026-A1B2C"),
            Some(("reject", "INC-2026-A1B2C".to_string()))
        );
        assert!(parse_action_id("vigil_approve_").is_none());
        assert!(parse_action_id("unrelated_button").is_none());
    }
}
