//! Application-level lookup join.
//!
//! When the engine cannot run `LOOKUP JOIN`, the fallback runs the
//! lookup-free primary query, collects the join-key values from the result,
//! fetches the matching lookup documents with one terms search, and appends
//! the enrichment fields as extra columns. Rows without a match get nulls.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use vigil_store::EsClient;

use crate::definition::ToolDefinition;
use crate::error::ToolError;

/// Upper bound on lookup documents fetched in one join.
const MAX_LOOKUP_DOCS: usize = 1000;

pub async fn run(
    store: &Arc<EsClient>,
    def: &ToolDefinition,
    params: &[Value],
) -> Result<Value, ToolError> {
    let plan = def.fallback.as_ref().ok_or_else(|| ToolError::Definition {
        tool: def.id.clone(),
        reason: "tech-preview tool has no fallback plan".into(),
    })?;

    let body = serde_json::json!({
        "query": plan.query,
        "params": params,
    });
    let response = store.transport_request("POST", "/_query", Some(&body)).await?;
    if !response.is_success() {
        return Err(ToolError::Query {
            tool: def.id.clone(),
            status: response.status,
            reason: response
                .body
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .unwrap_or("<no reason>")
                .to_string(),
        });
    }

    let mut result = response.body;
    let key_column = column_index(&result, &plan.lookup_key).ok_or_else(|| {
        ToolError::Query {
            tool: def.id.clone(),
            status: 200,
            reason: format!("fallback result missing join column {}", plan.lookup_key),
        }
    })?;

    let keys: Vec<Value> = result["values"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get(key_column))
                .filter(|v| !v.is_null())
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let lookup = fetch_lookup_docs(store, &plan.lookup_index, &plan.lookup_key, &keys).await?;

    // Append enrichment columns.
    if let Some(columns) = result["columns"].as_array_mut() {
        for field in &plan.enrich_fields {
            columns.push(serde_json::json!({"name": field, "type": "keyword"}));
        }
    }
    if let Some(rows) = result["values"].as_array_mut() {
        for row in rows {
            let key = row.get(key_column).cloned().unwrap_or(Value::Null);
            let matched = key.as_str().and_then(|k| lookup.get(k));
            if let Some(row) = row.as_array_mut() {
                for field in &plan.enrich_fields {
                    row.push(
                        matched
                            .and_then(|doc| doc.get(field))
                            .cloned()
                            .unwrap_or(Value::Null),
                    );
                }
            }
        }
    }

    Ok(result)
}

fn column_index(result: &Value, name: &str) -> Option<usize> {
    result["columns"]
        .as_array()?
        .iter()
        .position(|c| c["name"].as_str() == Some(name))
}

async fn fetch_lookup_docs(
    store: &Arc<EsClient>,
    index: &str,
    key_field: &str,
    keys: &[Value],
) -> Result<HashMap<String, Value>, ToolError> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let query = serde_json::json!({
        "size": keys.len().min(MAX_LOOKUP_DOCS),
        "query": {"terms": {key_field: keys}},
    });
    let results = store.search(index, &query).await?;

    Ok(results
        .hits
        .into_iter()
        .filter_map(|hit| {
            hit.source
                .get(key_field)
                .and_then(Value::as_str)
                .map(|key| (key.to_string(), hit.source.clone()))
        })
        .collect())
}
