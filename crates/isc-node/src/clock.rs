//! Logical clock

use isc_types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Chain time, advanced from outside.
///
/// Time never goes backwards; timelocked requests only become eligible
/// when the clock moves past their timelock.
#[derive(Debug, Default)]
pub struct LogicalClock {
    now: AtomicU64,
}

impl LogicalClock {
    /// Clock starting at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Current time
    pub fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    /// Move forward by `delta`; returns the new time
    pub fn advance(&self, delta: Timestamp) -> Timestamp {
        self.now
            .fetch_add(delta, Ordering::SeqCst)
            .saturating_add(delta)
    }

    /// Move to `t` unless the clock is already past it; returns the new time
    pub fn advance_to(&self, t: Timestamp) -> Timestamp {
        self.now.fetch_max(t, Ordering::SeqCst).max(t)
    }
}
