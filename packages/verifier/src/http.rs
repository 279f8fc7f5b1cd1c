//! Agent endpoint for in-process A2A.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

use vigil_contracts::Envelope;

use crate::error::VerifierError;
use crate::handler::Verifier;

/// Routes for the verifier agent.
pub fn routes(verifier: Arc<Verifier>) -> Router {
    Router::new()
        .route("/agents/verifier/invoke", post(invoke))
        .with_state(verifier)
}

async fn invoke(
    State(verifier): State<Arc<Verifier>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match verifier.handle_verify_resolution(&envelope).await {
        Ok(response) => Ok(Json(serde_json::to_value(response).unwrap_or_default())),
        Err(e) => {
            let status = match &e {
                VerifierError::Validation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!(error = %e, "verify_resolution failed");
            Err((status, Json(serde_json::json!({"error": e.to_string()}))))
        }
    }
}
