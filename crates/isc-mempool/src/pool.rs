//! Request pool implementation

use crate::error::RejectReason;
use isc_metrics::ChainMetrics;
use isc_types::{Request, RequestId, Timestamp};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of pooled requests
    pub max_size: usize,
    /// Maximum number of requests in one proposal
    pub max_batch_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_batch_size: 100,
        }
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolInfo {
    /// Requests currently pooled
    pub total_pool: usize,
    /// Requests ever added
    pub in_pool_counter: u64,
    /// Requests ever removed, processed or dropped
    pub out_pool_counter: u64,
}

/// Pool notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolEvent {
    /// Request newly pooled
    Added(RequestId),
    /// Request refused on receipt or dropped as never processable
    Rejected {
        /// Request
        id: RequestId,
        /// Why
        reason: RejectReason,
    },
}

#[derive(Default)]
struct PoolInner {
    requests: BTreeMap<RequestId, Arc<Request>>,
    in_counter: u64,
    out_counter: u64,
}

/// Request pool.
///
/// All state sits behind one lock; every operation holds it only for the
/// duration of the call.
pub struct Mempool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
    notify: Notify,
    events: broadcast::Sender<MempoolEvent>,
    metrics: ChainMetrics,
}

impl Mempool {
    /// Create a pool
    pub fn new(config: PoolConfig, metrics: ChainMetrics) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            inner: Mutex::new(PoolInner::default()),
            notify: Notify::new(),
            events,
            metrics,
        }
    }

    /// Create a pool with default config and its own metrics
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default(), ChainMetrics::new())
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Add requests. Returns, per request, whether it was newly pooled.
    ///
    /// Re-submitting a pooled request is a no-op apart from a metric.
    pub fn receive_requests(&self, requests: Vec<Request>) -> Vec<bool> {
        let mut results = Vec::with_capacity(requests.len());
        let mut added = 0usize;
        {
            let mut inner = self.inner.lock();
            for req in requests {
                let id = req.id();
                if inner.requests.contains_key(&id) {
                    debug!(request = %id, "duplicate request");
                    self.metrics.request_duplicate();
                    results.push(false);
                    continue;
                }
                if let Some(off) = req.as_off_ledger() {
                    if !off.verify_signature() {
                        self.reject(id, RejectReason::InvalidSignature);
                        results.push(false);
                        continue;
                    }
                }
                if inner.requests.len() >= self.config.max_size {
                    self.reject(id, RejectReason::PoolFull(self.config.max_size));
                    results.push(false);
                    continue;
                }
                inner.requests.insert(id, Arc::new(req));
                inner.in_counter += 1;
                added += 1;
                let _ = self.events.send(MempoolEvent::Added(id));
                results.push(true);
            }
            self.metrics.pool_size(inner.requests.len());
        }
        if added > 0 {
            self.metrics.requests_in(added);
            self.notify.notify_one();
        }
        results
    }

    /// Requests eligible for processing at logical time `now`.
    ///
    /// On-ledger requests whose timelock can never be satisfied, or that
    /// have expired, are removed from the pool here. The result is ordered
    /// deterministically: on-ledger requests by ID, then off-ledger
    /// requests by sender, nonce and ID. At most `max_batch_size` requests
    /// are returned.
    pub fn request_batch_proposal(&self, now: Timestamp) -> Vec<Arc<Request>> {
        let mut inner = self.inner.lock();
        let mut dropped = Vec::new();
        let mut on_ledger = Vec::new();
        let mut off_ledger = Vec::new();

        for (id, req) in &inner.requests {
            match req.as_ref() {
                Request::OnLedger(r) => {
                    if let (Some(timelock), Some(expiration)) = (r.timelock, r.expiration) {
                        if timelock >= expiration {
                            let reason = RejectReason::TimelockAfterExpiration {
                                timelock,
                                expiration,
                            };
                            dropped.push((*id, reason));
                            continue;
                        }
                    }
                    if let Some(expiration) = r.expiration.filter(|e| *e <= now) {
                        dropped.push((*id, RejectReason::Expired { expiration, now }));
                        continue;
                    }
                    if r.is_unlocked(now) {
                        on_ledger.push(Arc::clone(req));
                    }
                }
                Request::OffLedger(_) => off_ledger.push(Arc::clone(req)),
            }
        }

        for (id, reason) in dropped {
            inner.requests.remove(&id);
            inner.out_counter += 1;
            self.reject(id, reason);
        }
        self.metrics.pool_size(inner.requests.len());
        drop(inner);

        off_ledger.sort_by_cached_key(|r| (r.sender(), r.nonce(), r.id()));
        on_ledger.extend(off_ledger);
        on_ledger.truncate(self.config.max_batch_size);
        on_ledger
    }

    /// Remove requests, typically after their batch was committed.
    /// Returns how many were pooled.
    pub fn remove_requests(&self, ids: &[RequestId]) -> usize {
        let mut inner = self.inner.lock();
        let removed = ids
            .iter()
            .filter(|id| inner.requests.remove(*id).is_some())
            .count();
        inner.out_counter += removed as u64;
        self.metrics.pool_size(inner.requests.len());
        drop(inner);
        if removed > 0 {
            self.metrics.requests_out(removed);
        }
        removed
    }

    /// Pool counters
    pub fn info(&self) -> PoolInfo {
        let inner = self.inner.lock();
        PoolInfo {
            total_pool: inner.requests.len(),
            in_pool_counter: inner.in_counter,
            out_pool_counter: inner.out_counter,
        }
    }

    /// Pooled request by ID
    pub fn get_request(&self, id: &RequestId) -> Option<Arc<Request>> {
        self.inner.lock().requests.get(id).cloned()
    }

    /// Whether a request is pooled
    pub fn has_request(&self, id: &RequestId) -> bool {
        self.inner.lock().requests.contains_key(id)
    }

    /// Number of pooled requests
    pub fn len(&self) -> usize {
        self.inner.lock().requests.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().requests.is_empty()
    }

    /// Subscribe to pool events
    pub fn subscribe(&self) -> broadcast::Receiver<MempoolEvent> {
        self.events.subscribe()
    }

    /// Wait until new requests were pooled since the last wakeup
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    fn reject(&self, id: RequestId, reason: RejectReason) {
        warn!(request = %id, %reason, "request rejected");
        self.metrics.request_rejected();
        let _ = self.events.send(MempoolEvent::Rejected { id, reason });
    }
}
