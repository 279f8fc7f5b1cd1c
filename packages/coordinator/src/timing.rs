//! Incident timing metrics.
//!
//! TTD/TTI/TTR/TTV are derived from the first-entry state timestamps, all
//! measured from `detected`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Milliseconds from detection to each lifecycle milestone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingMetrics {
    /// Detection → triage decision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttd_ms: Option<i64>,
    /// Detection → investigation complete (planning begins).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tti_ms: Option<i64>,
    /// Detection → remediation executed (verification begins).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttr_ms: Option<i64>,
    /// Detection → verified resolution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttv_ms: Option<i64>,
}

/// Compute metrics from a `_state_timestamps` map.
pub fn compute(timestamps: &BTreeMap<String, DateTime<Utc>>) -> TimingMetrics {
    let detected = timestamps.get("detected");

    let span = |milestone: &str| -> Option<i64> {
        let detected = detected?;
        let reached = timestamps.get(milestone)?;
        Some((*reached - *detected).num_milliseconds())
    };

    TimingMetrics {
        ttd_ms: span("triaged"),
        tti_ms: span("planning"),
        ttr_ms: span("verifying"),
        ttv_ms: span("resolved"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_compute_full_lifecycle() {
        let base = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let mut timestamps = BTreeMap::new();
        timestamps.insert("detected".to_string(), base);
        timestamps.insert("triaged".to_string(), base + chrono::Duration::seconds(8));
        timestamps.insert("planning".to_string(), base + chrono::Duration::seconds(95));
        timestamps.insert("verifying".to_string(), base + chrono::Duration::seconds(240));
        timestamps.insert("resolved".to_string(), base + chrono::Duration::seconds(310));

        let metrics = compute(&timestamps);

        assert_eq!(metrics.ttd_ms, Some(8_000));
        assert_eq!(metrics.tti_ms, Some(95_000));
        assert_eq!(metrics.ttr_ms, Some(240_000));
        assert_eq!(metrics.ttv_ms, Some(310_000));
    }

    #[test]
    fn test_compute_partial_lifecycle() {
        let base = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let mut timestamps = BTreeMap::new();
        timestamps.insert("detected".to_string(), base);
        timestamps.insert("triaged".to_string(), base + chrono::Duration::seconds(5));

        let metrics = compute(&timestamps);

        assert_eq!(metrics.ttd_ms, Some(5_000));
        assert!(metrics.ttv_ms.is_none());
    }
}
