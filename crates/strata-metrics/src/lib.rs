//! # strata-metrics
//!
//! In-process execution metrics for Strata.
//!
//! Features:
//! - Counters for transaction outcomes, blocks and tasks
//! - Gauges for chain height and similar current values
//! - Histograms for gas usage and processing latency
//! - JSON snapshot export

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collector;
mod export;
mod histogram;

pub use collector::{names, Metrics};
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;

/// Time a block of code into a microsecond histogram
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.observe($name, start.elapsed().as_micros() as u64);
        result
    }};
}
