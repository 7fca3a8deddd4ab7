//! Snapshot export

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Histogram, Metrics};

/// Point-in-time copy of every metric, keyed in name order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values
    pub counters: BTreeMap<String, u64>,
    /// Gauge values
    pub gauges: BTreeMap<String, i64>,
    /// Histogram summaries
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Summary of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    /// Mean value
    pub mean: f64,
    /// Observation count
    pub count: u64,
    /// Sum of values
    pub sum: u64,
    /// Largest value
    pub max: u64,
}

impl HistogramSummary {
    /// Summarize a histogram
    pub fn from_histogram(histogram: &Histogram) -> Self {
        Self {
            mean: histogram.mean(),
            count: histogram.total_count(),
            sum: histogram.sum(),
            max: histogram.max(),
        }
    }
}

impl MetricsSnapshot {
    /// Capture the current values of `metrics`
    pub fn from_metrics(metrics: &Metrics) -> Self {
        Self {
            counters: metrics.all_counters().into_iter().collect(),
            gauges: metrics.all_gauges().into_iter().collect(),
            histograms: metrics.all_histograms().into_iter().collect(),
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
    use crate::names;

    #[test]
    fn test_snapshot_json_roundtrip() {
        let metrics = Metrics::new();
        metrics.counter(names::TX_FAULT, 3);
        metrics.gauge(names::CHAIN_HEIGHT, 7);
        metrics.observe(names::TX_GAS_USED, 50);

        let snapshot = MetricsSnapshot::from_metrics(&metrics);
        let json = snapshot.to_json_compact().unwrap();
        assert!(json.contains("\"tx.fault\":3"));
        assert!(json.contains("\"chain.height\":7"));

        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
