//! Per-call telemetry records.
//!
//! Exactly one record is written per A2A call; a failed telemetry write is
//! logged and never masks the call's own outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vigil_store::{indices, EsClient};

/// Outcome class of an A2A call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStatus {
    Success,
    Error,
    Timeout,
    CardUnavailable,
}

/// One record per call, indexed to `agent-telemetry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub from_agent: String,
    pub to_agent: String,
    pub task: String,
    pub status: TelemetryStatus,
    pub execution_time_ms: u64,
    pub message_id: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write the record, swallowing failures.
pub async fn emit(store: &Arc<EsClient>, record: TelemetryRecord) {
    let body = match serde_json::to_value(&record) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize telemetry record");
            return;
        }
    };
    if let Err(e) = store
        .index_doc(indices::AGENT_TELEMETRY, None, &body, false)
        .await
    {
        tracing::warn!(
            to_agent = %record.to_agent,
            error = %e,
            "telemetry write failed"
        );
    }
}
