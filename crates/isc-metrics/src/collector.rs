//! Metric registry

use crate::Histogram;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Thread-safe store of named metrics; metrics are created on first use
#[derive(Default)]
pub struct Metrics {
    histograms: DashMap<String, Histogram>,
    counters: DashMap<String, AtomicU64>,
    gauges: DashMap<String, AtomicI64>,
}

impl Metrics {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a histogram observation
    pub fn histogram(&self, name: &str, value: u64) {
        if let Some(h) = self.histograms.get(name) {
            h.observe(value);
            return;
        }
        self.histograms
            .entry(name.to_string())
            .or_default()
            .observe(value);
    }

    /// Increment a counter
    pub fn counter(&self, name: &str, delta: u64) {
        if let Some(c) = self.counters.get(name) {
            c.fetch_add(delta, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(delta, Ordering::Relaxed);
    }

    /// Set a gauge
    pub fn gauge(&self, name: &str, value: i64) {
        if let Some(g) = self.gauges.get(name) {
            g.store(value, Ordering::Relaxed);
            return;
        }
        self.gauges
            .entry(name.to_string())
            .or_default()
            .store(value, Ordering::Relaxed);
    }

    /// Counter value
    pub fn get_counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|c| c.load(Ordering::Relaxed))
    }

    /// Gauge value
    pub fn get_gauge(&self, name: &str) -> Option<i64> {
        self.gauges.get(name).map(|g| g.load(Ordering::Relaxed))
    }

    /// Histogram mean
    pub fn get_histogram_mean(&self, name: &str) -> Option<f64> {
        self.histograms.get(name).map(|h| h.mean())
    }

    /// All counters
    pub fn all_counters(&self) -> Vec<(String, u64)> {
        self.counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// All gauges
    pub fn all_gauges(&self) -> Vec<(String, i64)> {
        self.gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// All histograms as (name, mean, max, count)
    pub fn all_histograms(&self) -> Vec<(String, f64, u64, u64)> {
        self.histograms
            .iter()
            .map(|e| {
                let h = e.value();
                (e.key().clone(), h.mean(), h.max(), h.total_count())
            })
            .collect()
    }
}
