//! Chain-level metric names and helpers

use crate::{Metrics, MetricsSnapshot};
use std::sync::Arc;

/// Metrics reported by one chain's mempool and VM runner.
///
/// Cloning is cheap; clones share the underlying store.
#[derive(Clone, Default)]
pub struct ChainMetrics {
    inner: Arc<Metrics>,
}

impl ChainMetrics {
    /// Requests accepted into the pool
    pub const REQUESTS_IN: &'static str = "requests_in";
    /// Requests removed from the pool
    pub const REQUESTS_OUT: &'static str = "requests_out";
    /// Re-submissions of pooled requests
    pub const REQUESTS_DUPLICATE: &'static str = "requests_duplicate";
    /// Requests dropped as never processable
    pub const REQUESTS_REJECTED: &'static str = "requests_rejected";
    /// Current pool size
    pub const POOL_SIZE: &'static str = "pool_size";
    /// Blocks produced
    pub const BLOCKS: &'static str = "blocks";
    /// VM task run time
    pub const VM_RUN_TIME_US: &'static str = "vm_run_time_us";
    /// Requests that got a receipt
    pub const REQUESTS_PROCESSED: &'static str = "requests_processed";
    /// Requests whose receipt carries an error
    pub const REQUESTS_FAILED: &'static str = "requests_failed";
    /// Requests skipped without a receipt
    pub const REQUESTS_SKIPPED: &'static str = "requests_skipped";

    /// Fresh store
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing store
    pub fn with_metrics(inner: Arc<Metrics>) -> Self {
        Self { inner }
    }

    /// Underlying store
    pub fn metrics(&self) -> &Metrics {
        &self.inner
    }

    /// Record requests entering the pool
    pub fn requests_in(&self, n: usize) {
        self.inner.counter(Self::REQUESTS_IN, n as u64);
    }

    /// Record requests leaving the pool
    pub fn requests_out(&self, n: usize) {
        self.inner.counter(Self::REQUESTS_OUT, n as u64);
    }

    /// Record a duplicate submission
    pub fn request_duplicate(&self) {
        self.inner.counter(Self::REQUESTS_DUPLICATE, 1);
    }

    /// Record a rejected request
    pub fn request_rejected(&self) {
        self.inner.counter(Self::REQUESTS_REJECTED, 1);
    }

    /// Update the pool size gauge
    pub fn pool_size(&self, size: usize) {
        self.inner.gauge(Self::POOL_SIZE, size as i64);
    }

    /// Record a finished VM run
    pub fn vm_run(&self, elapsed_us: u64, processed: usize, failed: usize, skipped: usize) {
        self.inner.histogram(Self::VM_RUN_TIME_US, elapsed_us);
        self.inner.counter(Self::REQUESTS_PROCESSED, processed as u64);
        self.inner.counter(Self::REQUESTS_FAILED, failed as u64);
        self.inner.counter(Self::REQUESTS_SKIPPED, skipped as u64);
    }

    /// Record a produced block
    pub fn block_produced(&self) {
        self.inner.counter(Self::BLOCKS, 1);
    }

    /// Counter value, 0 if never touched
    pub fn count(&self, name: &str) -> u64 {
        self.inner.get_counter(name).unwrap_or(0)
    }

    /// Snapshot of everything
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::from_metrics(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_store() {
        let a = ChainMetrics::new();
        let b = a.clone();
        a.requests_in(3);
        b.requests_in(2);
        assert_eq!(a.count(ChainMetrics::REQUESTS_IN), 5);
    }

    #[test]
    fn test_vm_run() {
        let m = ChainMetrics::new();
        m.vm_run(120, 3, 1, 2);
        m.block_produced();
        let snap = m.snapshot();
        assert_eq!(snap.counters.get(ChainMetrics::REQUESTS_PROCESSED), Some(&3));
        assert_eq!(snap.counters.get(ChainMetrics::REQUESTS_FAILED), Some(&1));
        assert_eq!(snap.counters.get(ChainMetrics::REQUESTS_SKIPPED), Some(&2));
        assert_eq!(snap.counters.get(ChainMetrics::BLOCKS), Some(&1));
        assert_eq!(m.count(ChainMetrics::REQUESTS_REJECTED), 0);
    }
}
