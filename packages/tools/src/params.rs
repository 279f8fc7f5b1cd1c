//! Typed parameter validation.
//!
//! Supplied values are checked against the declared [`ParamType`] and
//! normalized into the `[{name: value}, …]` list the `/_query` endpoint
//! expects.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::definition::{ParamType, ToolDefinition};
use crate::error::ToolError;

/// Validate supplied parameters against a definition.
///
/// Required-and-missing is an error; optional-and-missing applies the
/// declared default when one exists and is otherwise omitted from the query.
pub fn validate_params(
    def: &ToolDefinition,
    supplied: &Map<String, Value>,
) -> Result<Vec<Value>, ToolError> {
    let mut out = Vec::with_capacity(def.params.len());

    for (name, spec) in &def.params {
        let raw = match supplied.get(name) {
            Some(value) if !value.is_null() => value.clone(),
            _ => {
                if let Some(default) = &spec.default {
                    default.clone()
                } else if spec.required {
                    return Err(ToolError::MissingParameter {
                        tool: def.id.clone(),
                        name: name.clone(),
                    });
                } else {
                    continue;
                }
            }
        };

        let normalized = coerce(def, name, spec.kind, raw)?;
        out.push(serde_json::json!({ name.clone(): normalized }));
    }

    Ok(out)
}

fn coerce(
    def: &ToolDefinition,
    name: &str,
    kind: ParamType,
    value: Value,
) -> Result<Value, ToolError> {
    let invalid = |reason: String| ToolError::InvalidParameter {
        tool: def.id.clone(),
        name: name.to_string(),
        reason,
    };

    match kind {
        ParamType::Keyword => match value {
            // Arrays pass through untouched for IN clauses.
            Value::Array(items) => Ok(Value::Array(items)),
            Value::String(s) => Ok(Value::String(s)),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(invalid(format!("cannot coerce {} to keyword", other))),
        },
        ParamType::Integer => match &value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
            Value::Number(n) => Err(invalid(format!("{} is not an integer", n))),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid(format!("{:?} is not an integer", s))),
            other => Err(invalid(format!("{} is not numeric", other))),
        },
        ParamType::Double => match &value {
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.is_finite() => Ok(value),
                _ => Err(invalid("not a finite number".into())),
            },
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(Value::from(f)),
                _ => Err(invalid(format!("{:?} is not a number", s))),
            },
            other => Err(invalid(format!("{} is not numeric", other))),
        },
        ParamType::Date => match &value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::String(dt.with_timezone(&Utc).to_rfc3339()))
                .map_err(|_| invalid(format!("{:?} is not an ISO-8601 timestamp", s))),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|dt| Value::String(dt.to_rfc3339()))
                .ok_or_else(|| invalid("not a valid epoch-millisecond timestamp".into())),
            other => Err(invalid(format!("{} is not a date", other))),
        },
    }
}
