//! Append-only action audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use vigil_contracts::ExecutionStatus;
use vigil_store::{indices, EsClient};

/// One record per action attempt, indexed to `actions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    pub incident_id: String,
    pub action_type: String,
    pub target_system: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_asset: Option<String>,
    pub approval_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<String>,
    pub execution_status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub rollback_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

/// Write a record without blocking or failing the caller.
pub fn write_record(store: Arc<EsClient>, record: ActionRecord) {
    tokio::spawn(async move {
        let body = match serde_json::to_value(&record) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize action record");
                return;
            }
        };
        if let Err(e) = store.index_doc(indices::ACTIONS, None, &body, false).await {
            tracing::warn!(
                action_id = %record.action_id,
                incident_id = %record.incident_id,
                error = %e,
                "audit write failed"
            );
        }
    });
}
