//! Agent endpoint for in-process A2A.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

use vigil_contracts::Envelope;

use crate::error::ExecutorError;
use crate::handler::Executor;

/// Routes for the executor agent.
pub fn routes(executor: Arc<Executor>) -> Router {
    Router::new()
        .route("/agents/executor/invoke", post(invoke))
        .with_state(executor)
}

async fn invoke(
    State(executor): State<Arc<Executor>>,
    Json(envelope): Json<Envelope>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match executor.handle_execute_plan(&envelope).await {
        Ok(response) => Ok(Json(serde_json::to_value(response).unwrap_or_default())),
        Err(e) => {
            let status = match &e {
                ExecutorError::Validation(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::error!(error = %e, "execute_plan failed");
            Err((
                status,
                Json(serde_json::json!({"error": e.to_string()})),
            ))
        }
    }
}
