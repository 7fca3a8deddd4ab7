//! Metrics registry

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::export::HistogramSummary;
use crate::Histogram;

/// Well-known metric names recorded by the runtime
pub mod names {
    /// Transactions that halted normally
    pub const TX_HALT: &str = "tx.halt";
    /// Transactions that stopped early with a break
    pub const TX_BREAK: &str = "tx.break";
    /// Transactions that faulted
    pub const TX_FAULT: &str = "tx.fault";
    /// Gas used per transaction
    pub const TX_GAS_USED: &str = "tx.gas_used";
    /// Blocks appended
    pub const BLOCK_PROCESSED: &str = "block.processed";
    /// Block processing latency in microseconds
    pub const BLOCK_PROCESS_US: &str = "block.process_us";
    /// Height of the most recent block
    pub const CHAIN_HEIGHT: &str = "chain.height";
    /// Chain task steps executed
    pub const TASK_EXECUTED: &str = "task.executed";
    /// Chain task steps that faulted
    pub const TASK_FAULT: &str = "task.fault";
    /// Read-only invocations
    pub const QUERY_INVOKED: &str = "query.invoked";
}

/// Thread-safe metrics registry
#[derive(Default)]
pub struct Metrics {
    histograms: RwLock<HashMap<String, Arc<Histogram>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl Metrics {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared empty registry
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record a histogram observation
    pub fn observe(&self, name: &str, value: u64) {
        if let Some(h) = self.histograms.read().get(name) {
            h.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Histogram::new()))
            .observe(value);
    }

    /// Add `delta` to a counter
    pub fn counter(&self, name: &str, delta: u64) {
        trace!(metric = name, delta, "counter");
        if let Some(c) = self.counters.read().get(name) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Increment a counter by one
    pub fn increment(&self, name: &str) {
        self.counter(name, 1);
    }

    /// Set a gauge
    pub fn gauge(&self, name: &str, value: i64) {
        if let Some(g) = self.gauges.read().get(name) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .store(value, Ordering::Relaxed);
    }

    /// Counter value
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Gauge value
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges
            .read()
            .get(name)
            .map(|g| g.load(Ordering::Relaxed))
    }

    /// Histogram summary
    pub fn histogram_summary(&self, name: &str) -> Option<HistogramSummary> {
        self.histograms
            .read()
            .get(name)
            .map(|h| HistogramSummary::from_histogram(h))
    }

    /// All counters
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All gauges
    pub fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect()
    }

    /// All histogram summaries
    pub fn all_histograms(&self) -> Vec<(String, HistogramSummary)> {
        self.histograms
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), HistogramSummary::from_histogram(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let metrics = Metrics::new();
        metrics.increment(names::TX_HALT);
        metrics.counter(names::TX_HALT, 2);
        assert_eq!(metrics.get_counter(names::TX_HALT), Some(3));
        assert_eq!(metrics.get_counter(names::TX_FAULT), None);
    }

    #[test]
    fn test_gauge() {
        let metrics = Metrics::new();
        metrics.gauge(names::CHAIN_HEIGHT, 42);
        metrics.gauge(names::CHAIN_HEIGHT, 43);
        assert_eq!(metrics.get_gauge(names::CHAIN_HEIGHT), Some(43));
    }

    #[test]
    fn test_gas_histogram() {
        let metrics = Metrics::new();
        metrics.observe(names::TX_GAS_USED, 100);
        metrics.observe(names::TX_GAS_USED, 300);
        let summary = metrics.histogram_summary(names::TX_GAS_USED).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, 200.0);
        assert_eq!(summary.max, 300);
    }
}
