//! Tool loading and query dispatch.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use vigil_store::EsClient;

use crate::definition::ToolDefinition;
use crate::error::ToolError;
use crate::fallback;
use crate::params::validate_params;

/// Error-reason fragments that mean the engine cannot run the lookup join.
const UNSUPPORTED_MARKERS: &[&str] = &["unknown command [lookup]", "lookup_join", "parsing_exception"];

/// Loads tool definitions from disk and executes them against the store.
pub struct ToolExecutor {
    store: Arc<EsClient>,
    tools_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<ToolDefinition>>>,
}

impl ToolExecutor {
    pub fn new(store: Arc<EsClient>, tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            tools_dir: tools_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a definition by tool name (`<tools_dir>/<name>.json`), cached.
    pub async fn load(&self, name: &str) -> Result<Arc<ToolDefinition>, ToolError> {
        if let Some(def) = self.cache.read().await.get(name) {
            return Ok(def.clone());
        }

        let path = self.tools_dir.join(format!("{}.json", name));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::NotFound {
                    tool: name.to_string(),
                }
            } else {
                ToolError::Definition {
                    tool: name.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let def: ToolDefinition =
            serde_json::from_str(&raw).map_err(|e| ToolError::Definition {
                tool: name.to_string(),
                reason: e.to_string(),
            })?;

        let def = Arc::new(def);
        self.cache
            .write()
            .await
            .insert(name.to_string(), def.clone());
        Ok(def)
    }

    /// Validate parameters and run the tool's query.
    ///
    /// Returns the columnar `/_query` response body. When the definition is
    /// flagged tech-preview and the engine reports the lookup command
    /// unsupported, the application-level fallback join runs instead.
    pub async fn execute(
        &self,
        name: &str,
        supplied: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let def = self.load(name).await?;
        let params = validate_params(&def, supplied)?;

        let body = serde_json::json!({
            "query": def.query,
            "params": params,
        });
        let response = self
            .store
            .transport_request("POST", "/_query", Some(&body))
            .await?;

        if response.is_success() {
            return Ok(response.body);
        }

        let reason = extract_reason(&response.body);
        if def.lookup_join_tech_preview && is_unsupported_lookup(&reason) {
            tracing::warn!(
                tool = %def.id,
                reason = %reason,
                "lookup join unsupported by engine, using application-level fallback"
            );
            return fallback::run(&self.store, &def, &params).await;
        }

        Err(ToolError::Query {
            tool: def.id.clone(),
            status: response.status,
            reason,
        })
    }
}

fn extract_reason(body: &Value) -> String {
    body.pointer("/error/reason")
        .or_else(|| body.pointer("/error/type"))
        .and_then(Value::as_str)
        .unwrap_or("<no reason>")
        .to_string()
}

fn is_unsupported_lookup(reason: &str) -> bool {
    let lowered = reason.to_lowercase();
    UNSUPPORTED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
