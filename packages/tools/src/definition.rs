//! Tool definition schema.
//!
//! One JSON file per tool under the tools directory, keyed by file name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// Strings; arrays pass through untouched for IN clauses.
    Keyword,
    Integer,
    Double,
    /// ISO-8601 string or epoch milliseconds.
    Date,
}

/// One declared parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Application-level replacement for a lookup join the engine cannot run:
/// a lookup-free primary query plus the join performed in process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    /// Lookup-free variant of the main query.
    pub query: String,
    /// Index holding the rows the lookup would have joined.
    pub lookup_index: String,
    /// Column in the primary result matched against the lookup documents.
    pub lookup_key: String,
    /// Fields copied from matched lookup documents into the result.
    pub enrich_fields: Vec<String>,
}

/// A tool definition loaded from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The query template with `?named` parameter placeholders.
    pub query: String,
    #[serde(default)]
    pub params: BTreeMap<String, ParamSpec>,
    /// The query uses the tech-preview lookup join; failures that look like
    /// an unsupported command route to `fallback`.
    #[serde(default)]
    pub lookup_join_tech_preview: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackPlan>,
}
