//! Bucketed histogram

use std::sync::atomic::{AtomicU64, Ordering};

/// Default bucket bounds, sized for per-transaction gas usage
pub const GAS_BUCKETS: &[u64] = &[
    100, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000, 1_000_000,
];

/// Distribution of observed values over fixed upper bounds.
///
/// Values above the last bound are counted in an overflow bucket.
pub struct Histogram {
    bounds: Vec<u64>,
    counts: Vec<AtomicU64>,
    sum: AtomicU64,
    count: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    /// Create a histogram with the gas buckets
    pub fn new() -> Self {
        Self::with_bounds(GAS_BUCKETS.to_vec())
    }

    /// Create a histogram with custom bucket bounds, sorted ascending
    pub fn with_bounds(mut bounds: Vec<u64>) -> Self {
        bounds.sort_unstable();
        bounds.dedup();
        let counts = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            counts,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record a value
    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);

        let bucket = self.bounds.partition_point(|bound| *bound < value);
        self.counts[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Mean of observed values
    pub fn mean(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    /// Number of observations
    pub fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observed values
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    /// Largest observed value
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// `(upper bound, count)` per bucket; the overflow bucket has no bound
    pub fn buckets(&self) -> Vec<(Option<u64>, u64)> {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, c)| (self.bounds.get(i).copied(), c.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketing() {
        let h = Histogram::with_bounds(vec![10, 100]);
        h.observe(10);
        h.observe(11);
        h.observe(1_000);
        assert_eq!(h.buckets(), vec![(Some(10), 1), (Some(100), 1), (None, 1)]);
        assert_eq!(h.max(), 1_000);
        assert_eq!(h.sum(), 1_021);
        assert_eq!(h.total_count(), 3);
    }

    #[test]
    fn test_empty_mean() {
        assert_eq!(Histogram::new().mean(), 0.0);
    }
}
