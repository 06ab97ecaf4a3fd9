//! Chain runner: request intake, batch proposer and the VM critical section

use crate::clock::LogicalClock;
use crate::config::ChainConfig;
use crate::error::{NodeError, NodeResult};
use crate::genesis::{load_or_init, StateStore};
use isc_crypto::keccak256_concat;
use isc_mempool::Mempool;
use isc_metrics::ChainMetrics;
use isc_storage::StateSnapshot;
use isc_types::{ChainId, Dict, Hname, Request, VmError};
use isc_vm::core::{self as corecontracts, blocklog};
use isc_vm::{call_view, run_task, ProcessorCache, VmTask, VmTaskResult};
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Most requests moved from the inbound channel into the pool at once
const INBOUND_DRAIN_LIMIT: usize = 256;

/// A running chain.
///
/// Requests enter through [`Chain::submit`] and are moved into the pool by
/// the inbound listener. The batch proposer wakes when the pool receives
/// requests or on a fallback tick, runs the current proposal as one VM
/// task and commits the result. Only one batch runs at a time.
pub struct Chain {
    config: ChainConfig,
    chain_id: ChainId,
    processors: Arc<ProcessorCache>,
    mempool: Arc<Mempool>,
    clock: Arc<LogicalClock>,
    metrics: ChainMetrics,
    store: StateStore,
    state: Mutex<StateSnapshot>,
    inbound: mpsc::Sender<Request>,
    inbound_rx: SyncMutex<Option<mpsc::Receiver<Request>>>,
    shutdown: watch::Sender<bool>,
}

impl Chain {
    /// Open the chain state, running genesis if needed
    pub fn open(config: ChainConfig) -> NodeResult<Self> {
        Self::with_processors(config, Arc::new(ProcessorCache::new()))
    }

    /// Open the chain with a caller-supplied processor cache
    pub fn with_processors(config: ChainConfig, processors: Arc<ProcessorCache>) -> NodeResult<Self> {
        config.validate()?;
        let store = StateStore::open(&config)?;
        let snapshot = load_or_init(&store, &config)?;

        let metrics = ChainMetrics::new();
        let mempool = Arc::new(Mempool::new(config.pool_config(), metrics.clone()));
        let (inbound, inbound_rx) = mpsc::channel(config.inbound_capacity);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            chain_id: config.chain_id(),
            clock: Arc::new(LogicalClock::new(config.start_time)),
            config,
            processors,
            mempool,
            metrics,
            store,
            state: Mutex::new(snapshot),
            inbound,
            inbound_rx: SyncMutex::new(Some(inbound_rx)),
            shutdown,
        })
    }

    /// Chain ID
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Request pool
    pub fn mempool(&self) -> &Arc<Mempool> {
        &self.mempool
    }

    /// Logical clock
    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// Chain metrics
    pub fn metrics(&self) -> &ChainMetrics {
        &self.metrics
    }

    /// Processor cache
    pub fn processors(&self) -> &Arc<ProcessorCache> {
        &self.processors
    }

    /// Latest committed state
    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.lock().await.clone()
    }

    /// Index of the latest block
    pub async fn latest_block_index(&self) -> Option<u32> {
        let state = self.state.lock().await;
        blocklog::latest_block_index(&corecontracts::partition(&*state, blocklog::hname()))
    }

    /// Queue a request. Returns once the inbound channel accepted it.
    pub async fn submit(&self, request: Request) -> NodeResult<()> {
        self.inbound.send(request).await.map_err(|_| NodeError::Stopped)
    }

    /// Call a view entry point against the latest state
    pub async fn call_view(
        &self,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
    ) -> Result<Dict, VmError> {
        let snapshot = self.snapshot().await;
        call_view(
            self.processors.clone(),
            self.chain_id,
            &snapshot,
            contract,
            entry_point,
            params,
        )
    }

    /// Ask the background loops to stop
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run the inbound listener and the batch proposer until [`Chain::stop`]
    pub async fn run(self: Arc<Self>) -> NodeResult<()> {
        let rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or_else(|| NodeError::Internal("chain is already running".into()))?;
        info!(
            chain_id = %self.chain_id,
            interval_ms = self.config.batch_interval_ms,
            "chain started"
        );

        let listener = tokio::spawn(Arc::clone(&self).inbound_loop(rx));
        self.proposer_loop().await;
        if let Err(e) = listener.await {
            error!(error = %e, "inbound listener failed");
        }
        info!(chain_id = %self.chain_id, "chain stopped");
        Ok(())
    }

    async fn inbound_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Request>) {
        let mut shutdown = self.shutdown.subscribe();
        while !*shutdown.borrow() {
            let first = tokio::select! {
                _ = shutdown.changed() => break,
                req = rx.recv() => match req {
                    Some(req) => req,
                    None => break,
                },
            };
            let mut batch = vec![first];
            while batch.len() < INBOUND_DRAIN_LIMIT {
                match rx.try_recv() {
                    Ok(req) => batch.push(req),
                    Err(_) => break,
                }
            }
            let added = self
                .mempool
                .receive_requests(batch)
                .into_iter()
                .filter(|added| *added)
                .count();
            debug!(added, pool = self.mempool.len(), "requests received");
        }
    }

    async fn proposer_loop(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut tick = interval(self.config.batch_interval());
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !*shutdown.borrow() {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.mempool.notified() => {}
                _ = tick.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            self.drain_pool().await;
        }
    }

    /// Run batches until the pool has nothing eligible or a batch fails
    async fn drain_pool(&self) {
        loop {
            match self.run_batch().await {
                Ok(Some(result)) if !result.consumed_ids().is_empty() => continue,
                Ok(_) => break,
                Err(e) => {
                    // requests stay pooled and are proposed again on the next wakeup
                    error!(error = %e, "batch failed");
                    break;
                }
            }
        }
    }

    /// Run the current proposal as one VM task and commit it.
    ///
    /// Returns `None` when nothing is eligible. On error nothing is
    /// committed and the requests stay pooled.
    pub async fn run_batch(&self) -> NodeResult<Option<VmTaskResult>> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let requests = self.mempool.request_batch_proposal(now);
        if requests.is_empty() {
            return Ok(None);
        }

        let latest = blocklog::latest_block_index(&corecontracts::partition(
            &*state,
            blocklog::hname(),
        ));
        let entropy = keccak256_concat([
            &self.chain_id.as_bytes()[..],
            &latest.unwrap_or_default().to_be_bytes()[..],
            &now.to_be_bytes()[..],
        ]);
        let mut task = VmTask::new(
            self.processors.clone(),
            self.chain_id,
            state.clone(),
            requests,
            now,
        )
        .with_entropy(entropy)
        .with_check_ledger(self.config.check_ledger)
        .with_metrics(self.metrics.clone());
        if let Some(index) = latest {
            task = task.with_anchor(index);
        }

        let result = tokio::task::spawn_blocking(move || run_task(task))
            .await
            .map_err(|e| NodeError::Internal(format!("vm task panicked: {e}")))??;

        if let Some(info) = &result.block_info {
            self.store.commit(&result.mutations, info.block_index)?;
        }
        *state = result.snapshot.clone();
        drop(state);

        let consumed = result.consumed_ids();
        self.mempool.remove_requests(&consumed);
        for (id, reason) in &result.skipped {
            if reason.is_retryable() {
                debug!(request = %id, %reason, "request kept in the pool");
            } else {
                warn!(request = %id, %reason, "request skipped and removed from the pool");
            }
        }
        Ok(Some(result))
    }
}
