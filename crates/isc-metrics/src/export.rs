//! Metrics snapshots

use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Largest value
    pub max: u64,
    /// Observation count
    pub count: u64,
}

impl MetricsSnapshot {
    /// Snapshot `metrics`
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            counters: metrics.all_counters().into_iter().collect(),
            gauges: metrics.all_gauges().into_iter().collect(),
            histograms: metrics
                .all_histograms()
                .into_iter()
                .map(|(name, mean, max, count)| (name, HistogramSummary { mean, max, count }))
                .collect(),
        }
    }

    /// Pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json() {
        let metrics = Metrics::new();
        metrics.counter("requests_in", 100);
        metrics.gauge("pool_size", 5);
        metrics.histogram("vm_run_time_us", 50);

        let snapshot = MetricsSnapshot::from_metrics(&metrics);
        let json = snapshot.to_json_compact().unwrap();
        let parsed: MetricsSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.counters.get("requests_in"), Some(&100));
        assert_eq!(parsed.gauges.get("pool_size"), Some(&5));
        assert_eq!(parsed.histograms.get("vm_run_time_us").map(|h| h.count), Some(1));
    }
}
