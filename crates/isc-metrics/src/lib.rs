//! # isc-metrics
//!
//! Metrics for the chain core.
//!
//! - [`Metrics`]: named counters, gauges and histograms, safe to share
//! - [`ChainMetrics`]: the metric names the mempool and VM runner report
//! - [`MetricsSnapshot`]: point-in-time copy, exportable as JSON

#![warn(missing_docs)]
#![warn(clippy::all)]

mod chain;
mod collector;
mod export;
mod histogram;

pub use chain::ChainMetrics;
pub use collector::Metrics;
pub use export::{HistogramSummary, MetricsSnapshot};
pub use histogram::Histogram;

/// Time a block and record the elapsed microseconds in a histogram
#[macro_export]
macro_rules! timed {
    ($metrics:expr, $name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        $metrics.histogram($name, start.elapsed().as_micros() as u64);
        result
    }};
}
