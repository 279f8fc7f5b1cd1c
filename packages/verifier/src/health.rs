//! Parallel health checks and criterion evaluation.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use vigil_contracts::{CriterionResult, SuccessCriterion, VerifyRequest};
use vigil_tools::ToolExecutor;

use crate::baselines::BaselineSet;

/// Column suffix carrying the tool's baseline-comparison verdict for a
/// metric (`error_rate_within_baseline`, …).
const BASELINE_VERDICT_SUFFIX: &str = "_within_baseline";

/// Health tool invoked once per affected service.
pub const HEALTH_TOOL: &str = "service_health_comparison";

/// Parsed health data for one service.
#[derive(Debug, Default, Clone)]
pub struct ServiceHealth {
    /// Numeric columns by metric name.
    pub metrics: HashMap<String, f64>,
    /// Baseline-comparison booleans by metric name.
    pub verdicts: HashMap<String, bool>,
}

/// Outcome of the full health-check pass.
#[derive(Debug)]
pub struct HealthReport {
    pub criteria_results: Vec<CriterionResult>,
    pub health_score: f64,
    pub passed_count: usize,
}

/// Run the health tool for every service in parallel and evaluate criteria.
pub async fn run_health_checks(
    tools: &Arc<ToolExecutor>,
    request: &VerifyRequest,
    baselines: &BaselineSet,
) -> HealthReport {
    let checks = request.affected_services.iter().map(|service| {
        let tools = tools.clone();
        let params = tool_params(service, request, baselines);
        async move {
            let health = match tools.execute(HEALTH_TOOL, &params).await {
                Ok(result) => parse_columnar(service, &result),
                Err(e) => {
                    tracing::warn!(service = %service, error = %e, "health check failed");
                    ServiceHealth::default()
                }
            };
            (service.clone(), health)
        }
    });

    let by_service: HashMap<String, ServiceHealth> =
        futures::future::join_all(checks).await.into_iter().collect();

    let criteria_results: Vec<CriterionResult> = request
        .success_criteria
        .iter()
        .map(|criterion| evaluate_criterion(criterion, &by_service, baselines))
        .collect();

    let passed_count = criteria_results.iter().filter(|r| r.passed).count();
    let health_score = if criteria_results.is_empty() {
        0.0
    } else {
        passed_count as f64 / criteria_results.len() as f64
    };

    HealthReport {
        criteria_results,
        health_score,
        passed_count,
    }
}

/// Build the tool parameters for one service: its primary baseline plus the
/// thresholds the plan's criteria impose on it.
fn tool_params(
    service: &str,
    request: &VerifyRequest,
    baselines: &BaselineSet,
) -> Map<String, Value> {
    let primary = baselines.primary_for(service);

    let max_error_rate = request
        .success_criteria
        .iter()
        .find(|c| c.service_name == service && c.metric == "error_rate")
        .map(|c| c.threshold)
        .unwrap_or(0.05);
    let min_throughput = request
        .success_criteria
        .iter()
        .find(|c| c.service_name == service && c.metric == "throughput")
        .map(|c| c.threshold)
        .unwrap_or(0.0);

    let mut params = Map::new();
    params.insert("service_name".into(), Value::from(service));
    params.insert(
        "baseline_avg".into(),
        Value::from(primary.map(|b| b.avg_value).unwrap_or(0.0)),
    );
    params.insert(
        "baseline_stddev".into(),
        Value::from(primary.map(|b| b.stddev_value).unwrap_or(0.0)),
    );
    params.insert("max_error_rate".into(), Value::from(max_error_rate));
    params.insert("min_throughput".into(), Value::from(min_throughput));
    params
}

/// Parse the first row of a columnar `/_query` result by column name.
///
/// Missing or unexpected columns are logged and skipped — a thin result
/// degrades the evaluation, it does not abort it.
pub fn parse_columnar(service: &str, result: &Value) -> ServiceHealth {
    let mut health = ServiceHealth::default();

    let (Some(columns), Some(row)) = (
        result.get("columns").and_then(Value::as_array),
        result
            .get("values")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(Value::as_array),
    ) else {
        tracing::warn!(service, "health result missing columns or values");
        return health;
    };

    for (index, column) in columns.iter().enumerate() {
        let Some(name) = column.get("name").and_then(Value::as_str) else {
            tracing::warn!(service, index, "health result column without a name");
            continue;
        };
        let Some(cell) = row.get(index) else {
            tracing::warn!(service, column = name, "health result row shorter than columns");
            continue;
        };

        if let Some(flag) = cell.as_bool() {
            let metric = name
                .strip_suffix(BASELINE_VERDICT_SUFFIX)
                .unwrap_or(name);
            health.verdicts.insert(metric.to_string(), flag);
        } else if let Some(number) = cell.as_f64() {
            health.metrics.insert(name.to_string(), number);
        }
    }

    health
}

/// Dual-threshold verdict: the explicit threshold must hold *and* the tool's
/// baseline comparison must agree. A criterion without a verdict column
/// falls back to threshold-only.
fn evaluate_criterion(
    criterion: &SuccessCriterion,
    by_service: &HashMap<String, ServiceHealth>,
    baselines: &BaselineSet,
) -> CriterionResult {
    let health = by_service.get(&criterion.service_name);
    let current = health.and_then(|h| h.metrics.get(&criterion.metric)).copied();

    let threshold_ok = current
        .map(|value| criterion.operator.evaluate(value, criterion.threshold))
        .unwrap_or(false);
    let baseline_ok = health
        .and_then(|h| h.verdicts.get(&criterion.metric))
        .copied()
        .unwrap_or(true);

    if current.is_none() {
        tracing::warn!(
            service = %criterion.service_name,
            metric = %criterion.metric,
            "no health data for criterion"
        );
    }

    CriterionResult {
        metric: criterion.metric.clone(),
        service_name: criterion.service_name.clone(),
        passed: threshold_ok && baseline_ok,
        current_value: current,
        threshold: criterion.threshold,
        baseline_value: baselines
            .get(&criterion.service_name, &criterion.metric)
            .map(|b| b.avg_value),
    }
}

/// Human-readable summary of every failing criterion.
pub fn build_failure_analysis(results: &[CriterionResult]) -> String {
    let failures: Vec<String> = results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| {
            let current = r
                .current_value
                .map(|v| format!("{:.4}", v))
                .unwrap_or_else(|| "unavailable".to_string());
            match r.baseline_value {
                Some(baseline) => format!(
                    "{} on {} is {} against threshold {} (baseline {:.4})",
                    r.metric, r.service_name, current, r.threshold, baseline
                ),
                None => format!(
                    "{} on {} is {} against threshold {}",
                    r.metric, r.service_name, current, r.threshold
                ),
            }
        })
        .collect();

    format!("Verification failed: {}", failures.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_columnar_metrics_and_verdicts() {
        let health = parse_columnar(
            "checkout",
            &serde_json::json!({
                "columns": [
                    {"name": "error_rate", "type": "double"},
                    {"name": "throughput", "type": "double"},
                    {"name": "error_rate_within_baseline", "type": "boolean"}
                ],
                "values": [[0.01, 1450.0, true]]
            }),
        );

        assert_eq!(health.metrics["error_rate"], 0.01);
        assert_eq!(health.metrics["throughput"], 1450.0);
        assert_eq!(health.verdicts["error_rate"], true);
    }

    #[test]
    fn test_parse_columnar_tolerates_missing_values() {
        let health = parse_columnar(
            "checkout",
            &serde_json::json!({
                "columns": [{"name": "error_rate", "type": "double"}],
                "values": []
            }),
        );

        assert!(health.metrics.is_empty());
    }

    #[test]
    fn test_failure_analysis_names_metric_threshold_and_baseline() {
        let analysis = build_failure_analysis(&[
            CriterionResult {
                metric: "error_rate".into(),
                service_name: "checkout".into(),
                passed: false,
                current_value: Some(0.12),
                threshold: 0.05,
                baseline_value: Some(0.02),
            },
            CriterionResult {
                metric: "throughput".into(),
                service_name: "checkout".into(),
                passed: true,
                current_value: Some(1500.0),
                threshold: 1000.0,
                baseline_value: None,
            },
        ]);

        assert!(analysis.contains("error_rate on checkout is 0.1200"));
        assert!(analysis.contains("threshold 0.05"));
        assert!(analysis.contains("baseline 0.0200"));
        assert!(!analysis.contains("throughput"));
    }
}
