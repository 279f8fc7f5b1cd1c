//! Per-service statistical baselines.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use vigil_store::{indices, EsClient};

/// One baseline record: what a metric normally looks like for a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub service_name: String,
    pub metric_name: String,
    pub avg_value: f64,
    pub stddev_value: f64,
}

/// Baselines for all affected services, keyed by `(service, metric)`.
#[derive(Debug, Default)]
pub struct BaselineSet {
    by_key: HashMap<(String, String), Baseline>,
}

impl BaselineSet {
    pub fn get(&self, service: &str, metric: &str) -> Option<&Baseline> {
        self.by_key
            .get(&(service.to_string(), metric.to_string()))
    }

    /// Any baseline for a service, preferring `error_rate` — used to seed
    /// the health-comparison tool when the criterion metric has none.
    pub fn primary_for(&self, service: &str) -> Option<&Baseline> {
        self.get(service, "error_rate").or_else(|| {
            self.by_key
                .iter()
                .find(|((s, _), _)| s == service)
                .map(|(_, baseline)| baseline)
        })
    }

    fn insert(&mut self, baseline: Baseline) {
        self.by_key.insert(
            (baseline.service_name.clone(), baseline.metric_name.clone()),
            baseline,
        );
    }
}

/// Fetch baselines for every service in parallel.
///
/// A service without baselines (or whose fetch fails) is simply absent from
/// the set; verification degrades to threshold-only for its criteria.
pub async fn fetch_all(store: &Arc<EsClient>, services: &[String]) -> BaselineSet {
    let fetches = services.iter().map(|service| {
        let store = store.clone();
        async move {
            let query = serde_json::json!({
                "size": 25,
                "query": {"term": {"service_name": service}}
            });
            (service.clone(), store.search(indices::BASELINES, &query).await)
        }
    });

    let mut set = BaselineSet::default();
    for (service, result) in futures::future::join_all(fetches).await {
        match result {
            Ok(results) => {
                for hit in results.hits {
                    match serde_json::from_value::<Baseline>(hit.source) {
                        Ok(baseline) => set.insert(baseline),
                        Err(e) => {
                            tracing::warn!(service = %service, error = %e, "malformed baseline record")
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "baseline fetch failed");
            }
        }
    }
    set
}
