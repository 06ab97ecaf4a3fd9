//! VM task: run a batch of requests against a state snapshot

use crate::context::{RequestOutcome, TaskEnv, VmContext};
use crate::core::accounts::{self, ledger};
use crate::core::{self as corecontracts, blocklog};
use crate::error::{RunError, RunResult, SkipReason};
use crate::processors::ProcessorCache;
use crate::txbuilder::TransactionEssence;
use isc_crypto::keccak256_concat;
use isc_metrics::ChainMetrics;
use isc_storage::{Mutations, StateSnapshot};
use isc_types::{
    AgentId, BlockIndex, BlockInfo, ChainId, Request, RequestId, RequestReceipt, Timestamp, H256,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Callback invoked once with the outcome of a task
pub type OnFinish = Box<dyn FnOnce(&RunResult<VmTaskResult>) + Send>;

/// A batch of requests to run
pub struct VmTask {
    /// Shared processor cache
    pub processors: Arc<ProcessorCache>,
    /// Chain the requests run on
    pub chain_id: ChainId,
    /// State before the batch
    pub snapshot: StateSnapshot,
    /// Requests, in execution order
    pub requests: Vec<Arc<Request>>,
    /// Logical time of the batch
    pub timestamp: Timestamp,
    /// Batch entropy
    pub entropy: H256,
    /// Account receiving the validator share of gas fees
    pub validator_fee_target: AgentId,
    /// Expected index of the latest block in `snapshot`; checked when set
    pub anchor: Option<BlockIndex>,
    /// Verify ledger conservation after the batch
    pub check_ledger: bool,
    /// Metrics sink
    pub metrics: Option<ChainMetrics>,
    /// Completion callback
    pub on_finish: Option<OnFinish>,
}

impl VmTask {
    /// Task with defaults: no anchor check, ledger check on, no metrics
    pub fn new(
        processors: Arc<ProcessorCache>,
        chain_id: ChainId,
        snapshot: StateSnapshot,
        requests: Vec<Arc<Request>>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            processors,
            chain_id,
            snapshot,
            requests,
            timestamp,
            entropy: H256::ZERO,
            validator_fee_target: accounts::common_account(chain_id),
            anchor: None,
            check_ledger: true,
            metrics: None,
            on_finish: None,
        }
    }

    /// Set the batch entropy
    pub fn with_entropy(mut self, entropy: H256) -> Self {
        self.entropy = entropy;
        self
    }

    /// Set the validator fee target
    pub fn with_validator_fee_target(mut self, target: AgentId) -> Self {
        self.validator_fee_target = target;
        self
    }

    /// Require the snapshot's latest block to be `anchor`
    pub fn with_anchor(mut self, anchor: BlockIndex) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Enable or disable the conservation check
    pub fn with_check_ledger(mut self, check: bool) -> Self {
        self.check_ledger = check;
        self
    }

    /// Record run metrics
    pub fn with_metrics(mut self, metrics: ChainMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the completion callback
    pub fn on_finish(mut self, f: impl FnOnce(&RunResult<VmTaskResult>) + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for VmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmTask")
            .field("chain_id", &self.chain_id)
            .field("requests", &self.requests.len())
            .field("timestamp", &self.timestamp)
            .field("anchor", &self.anchor)
            .field("check_ledger", &self.check_ledger)
            .finish()
    }
}

/// Outcome of a successful task run
#[derive(Debug, Clone)]
pub struct VmTaskResult {
    /// State after the batch
    pub snapshot: StateSnapshot,
    /// All changes of the batch, to persist
    pub mutations: Mutations,
    /// Receipts of processed requests, in order
    pub receipts: Vec<RequestReceipt>,
    /// New block; `None` if every request was skipped
    pub block_info: Option<BlockInfo>,
    /// IDs of processed requests
    pub processed: Vec<RequestId>,
    /// Skipped requests and why
    pub skipped: Vec<(RequestId, SkipReason)>,
    /// L1 transaction: consumed requests and withdrawals
    pub essence: TransactionEssence,
}

impl VmTaskResult {
    /// IDs of every request the pool can drop: processed ones and those
    /// skipped for good. Retryable skips stay pooled.
    pub fn consumed_ids(&self) -> Vec<RequestId> {
        self.processed
            .iter()
            .copied()
            .chain(
                self.skipped
                    .iter()
                    .filter(|(_, reason)| !reason.is_retryable())
                    .map(|(id, _)| *id),
            )
            .collect()
    }

    /// Whether a new block was produced
    pub fn has_block(&self) -> bool {
        self.block_info.is_some()
    }
}

/// Entropy of request `index`: hash of the index and the batch entropy
pub fn request_entropy(index: u16, entropy: &H256) -> H256 {
    keccak256_concat([&index.to_be_bytes()[..], &entropy.as_bytes()[..]])
}

/// Run `task` and invoke its completion callback
pub fn run_task(mut task: VmTask) -> RunResult<VmTaskResult> {
    let on_finish = task.on_finish.take();
    let metrics = task.metrics.clone();
    let started = Instant::now();

    let result = run(task);

    if let Some(metrics) = &metrics {
        let elapsed = started.elapsed().as_micros() as u64;
        match &result {
            Ok(r) => {
                let failed = r.receipts.iter().filter(|r| !r.is_success()).count();
                metrics.vm_run(elapsed, r.receipts.len(), failed, r.skipped.len());
                if r.has_block() {
                    metrics.block_produced();
                }
            }
            Err(_) => metrics.vm_run(elapsed, 0, 0, 0),
        }
    }
    if let Some(f) = on_finish {
        f(&result);
    }
    result
}

fn run(task: VmTask) -> RunResult<VmTaskResult> {
    let latest = blocklog::latest_block_index(&corecontracts::partition(
        &task.snapshot,
        blocklog::hname(),
    ))
    .ok_or_else(|| RunError::InvalidState("chain is not initialized".into()))?;
    if let Some(anchor) = task.anchor {
        if anchor != latest {
            return Err(RunError::InvalidState(format!(
                "anchor block {anchor} but latest block is {latest}"
            )));
        }
    }
    if task.requests.len() > u16::MAX as usize {
        return Err(RunError::InvalidTask(format!(
            "{} requests in one batch",
            task.requests.len()
        )));
    }

    let block_index = latest + 1;
    let env = TaskEnv {
        chain_id: task.chain_id,
        processors: task.processors,
        timestamp: task.timestamp,
        block_index,
        validator_fee_target: task.validator_fee_target,
    };
    let mut ctx = VmContext::new(env, task.snapshot);
    let mut mutations = Mutations::new();
    let mut receipts: Vec<RequestReceipt> = Vec::new();
    let mut skipped = Vec::new();
    let mut block = BlockInfo {
        block_index,
        timestamp: task.timestamp,
        ..BlockInfo::default()
    };

    for req in &task.requests {
        let request_index = receipts.len() as u16;
        let entropy = request_entropy(request_index, &task.entropy);
        match ctx.run_request(req, request_index, entropy) {
            RequestOutcome::Processed(receipt) => {
                block.total_requests += 1;
                if receipt.is_success() {
                    block.num_successful_requests += 1;
                }
                if req.is_off_ledger() {
                    block.num_off_ledger_requests += 1;
                }
                block.gas_burned += receipt.gas_burned;
                block.gas_fee_charged += receipt.gas_fee_charged;
                debug!(
                    request = %receipt.request_id,
                    index = request_index,
                    gas = receipt.gas_burned,
                    error = ?receipt.error,
                    "request processed"
                );
                receipts.push(receipt);
            }
            RequestOutcome::Skipped(reason) => {
                if reason.is_retryable() {
                    debug!(request = %req.id(), %reason, "request not ready");
                } else {
                    warn!(request = %req.id(), %reason, "request skipped");
                }
                skipped.push((req.id(), reason));
            }
        }
        mutations.merge(ctx.commit());
    }

    let block_info = if receipts.is_empty() {
        None
    } else {
        let mut blocklog_state = corecontracts::partition_mut(ctx.state_mut(), blocklog::hname());
        blocklog::save_block_info(&mut blocklog_state, &block);
        mutations.merge(ctx.commit());
        Some(block)
    };

    if task.check_ledger {
        let acc = corecontracts::partition(ctx.state(), accounts::hname());
        ledger::check_ledger(&acc)?;
    }

    let processed = receipts.iter().map(|r| r.request_id).collect();
    let (snapshot, txbuilder) = ctx.into_parts();
    if let Some(info) = &block_info {
        info!(
            block = info.block_index,
            requests = info.total_requests,
            successful = info.num_successful_requests,
            skipped = skipped.len(),
            gas = info.gas_burned,
            "block produced"
        );
    }
    Ok(VmTaskResult {
        snapshot,
        mutations,
        receipts,
        block_info,
        processed,
        skipped,
        essence: txbuilder.into_essence(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{accounts, root};
    use crate::test_utils::{agent, TestVm, CHAIN, OWNER};
    use crate::txbuilder::L1Output;
    use isc_crypto::KeyPair;
    use isc_types::{hn, Address, Assets, CallTarget, Dict, OffLedgerRequest, VmErrorCode};
    use std::sync::Mutex;

    fn code(receipt: &RequestReceipt) -> Option<VmErrorCode> {
        receipt.error.as_ref().map(|e| e.code)
    }

    // ==================== Batch ====================

    #[test]
    fn test_uninitialized_chain_fails() {
        let vm = TestVm::new();
        let mut task = vm.task(vec![]);
        task.snapshot = StateSnapshot::new();
        assert!(matches!(run_task(task), Err(RunError::InvalidState(_))));
    }

    #[test]
    fn test_anchor_mismatch_fails() {
        let vm = TestVm::new();
        let task = vm.task(vec![]).with_anchor(3);
        assert!(matches!(run_task(task), Err(RunError::InvalidState(_))));
        let task = vm.task(vec![]).with_anchor(0);
        assert!(run_task(task).is_ok());
    }

    #[test]
    fn test_empty_batch_produces_no_block() {
        let mut vm = TestVm::new();
        let before = vm.snapshot.clone();
        let result = vm.run(vec![]);
        assert!(!result.has_block());
        assert!(result.mutations.is_empty());
        assert_eq!(result.snapshot, before);
    }

    #[test]
    fn test_block_info_recorded() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let a = vm.request(&agent(1), "counter", "inc", Dict::new());
        let b = vm.request(&agent(1), "counter", "failWithError", Dict::new());
        let result = vm.run(vec![a.into(), b.into()]);

        let info = result.block_info.unwrap();
        assert_eq!(info.block_index, 2);
        assert_eq!(info.timestamp, vm.now);
        assert_eq!(info.total_requests, 2);
        assert_eq!(info.num_successful_requests, 1);
        assert_eq!(info.gas_fee_charged, 200);
        assert_eq!(result.receipts[1].request_index, 1);
        assert_eq!(result.processed.len(), 2);
    }

    #[test]
    fn test_batch_isolation() {
        let mut vm = TestVm::new();
        assert!(vm.deploy_counter(Dict::new()).is_success());

        let reqs = vec![
            vm.request(&agent(1), "counter", "inc", Dict::new()).into(),
            vm.request(&agent(1), "counter", "doPanic", Dict::new()).into(),
            vm.request(&agent(1), "counter", "inc", Dict::new()).into(),
        ];
        let result = vm.run(reqs);

        assert_eq!(result.receipts.len(), 3);
        assert!(result.receipts[0].is_success());
        assert_eq!(code(&result.receipts[1]), Some(VmErrorCode::Panic));
        assert!(result.receipts[1]
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("counter panicked"));
        assert!(result.receipts[1].events.is_empty());
        assert!(result.receipts[2].is_success());
        assert_eq!(vm.counter(), 2);
    }

    #[test]
    fn test_failed_request_keeps_credit_and_fee() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm
            .request(&agent(3), "counter", "failWithError", Dict::new())
            .with_assets(Assets::from_base_tokens(1_000));
        let receipt = vm.run_one(req);

        assert_eq!(code(&receipt), Some(VmErrorCode::Generic));
        assert_eq!(receipt.gas_fee_charged, 100);
        assert_eq!(vm.base(&agent(3)), 900);
        assert_eq!(vm.counter(), 0);
    }

    #[test]
    fn test_deterministic() {
        let run = || {
            let mut vm = TestVm::new();
            vm.deploy_counter(Dict::new());
            let reqs = vec![
                vm.request(&agent(1), "counter", "inc", Dict::new()).into(),
                vm.request(&agent(2), "counter", "doPanic", Dict::new()).into(),
                vm.request(&agent(2), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new())
                    .with_assets(Assets::from_base_tokens(77))
                    .into(),
            ];
            let task = vm.task(reqs).with_entropy(H256::from_bytes([5; 32]));
            run_task(task).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.snapshot, b.snapshot);
        assert_eq!(a.receipts, b.receipts);
        assert_eq!(a.mutations, b.mutations);
    }

    #[test]
    fn test_request_entropy_differs_per_index() {
        let e = H256::from_bytes([1; 32]);
        assert_ne!(request_entropy(0, &e), request_entropy(1, &e));
        assert_eq!(request_entropy(3, &e), request_entropy(3, &e));
    }

    #[test]
    fn test_on_finish_called_once() {
        let vm = TestVm::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let task = vm.task(vec![]).on_finish(move |result| {
            assert!(result.is_ok());
            *counter.lock().unwrap() += 1;
        });
        run_task(task).unwrap();
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_metrics_recorded() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let metrics = ChainMetrics::new();
        let reqs = vec![
            vm.request(&agent(1), "counter", "inc", Dict::new()).into(),
            vm.request(&agent(1), "counter", "failWithError", Dict::new()).into(),
        ];
        run_task(vm.task(reqs).with_metrics(metrics.clone())).unwrap();
        assert_eq!(metrics.count(ChainMetrics::REQUESTS_PROCESSED), 2);
        assert_eq!(metrics.count(ChainMetrics::REQUESTS_FAILED), 1);
        assert_eq!(metrics.count(ChainMetrics::BLOCKS), 1);
    }

    // ==================== Calls ====================

    #[test]
    fn test_contract_not_found_still_charged() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), "nope", "x", Dict::new());
        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::ContractNotFound));
        assert_eq!(receipt.gas_burned, 10_000);
        assert_eq!(receipt.gas_fee_charged, 100);
        assert_eq!(vm.base(&agent(1)), 99_900);
    }

    #[test]
    fn test_entry_point_not_found() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), accounts::NAME, "nope", Dict::new());
        assert_eq!(code(&vm.run_one(req)), Some(VmErrorCode::EntryPointNotFound));
    }

    #[test]
    fn test_gas_budget_exceeded() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm
            .request(&agent(1), "counter", "burnGas", Dict::new())
            .with_gas_budget(20_000);
        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::GasBudgetExceeded));
        assert_eq!(receipt.gas_budget, 20_000);
        assert_eq!(receipt.gas_burned, 20_000);
        assert_eq!(receipt.gas_fee_charged, 200);
    }

    #[test]
    fn test_gas_budget_raised_to_minimum() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm
            .request(&agent(1), "counter", "inc", Dict::new())
            .with_gas_budget(5);
        let receipt = vm.run_one(req);
        assert!(receipt.is_success());
        assert_eq!(receipt.gas_budget, 10_000);
    }

    #[test]
    fn test_gas_budget_limited_by_balance() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm
            .request(&agent(3), "counter", "burnGas", Dict::new())
            .with_assets(Assets::from_base_tokens(300));
        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::GasBudgetExceeded));
        assert_eq!(receipt.gas_budget, 30_000);
        assert_eq!(vm.base(&agent(3)), 0);
    }

    #[test]
    fn test_call_depth_limited() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm.request(&agent(1), "counter", "recurse", Dict::new());
        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::Generic));
        assert!(receipt.error.unwrap().message.contains("depth"));
    }

    #[test]
    fn test_view_entry_point_cannot_write() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm.request(&agent(1), "counter", "sneakyWrite", Dict::new());
        assert!(vm.run_one(req).is_success());
        assert_eq!(vm.counter(), 0);
    }

    #[test]
    fn test_events_in_receipt_and_blocklog() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm.request(&agent(1), "counter", "inc", Dict::new());
        let id = req.id;
        let receipt = vm.run_one(req);
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].topic, "inc");
        assert_eq!(receipt.events[0].contract, hn("counter"));

        let out = vm
            .view(
                blocklog::NAME,
                blocklog::VIEW_GET_REQUEST_RECEIPT,
                Dict::new().with_value(blocklog::PARAM_REQUEST_ID, &id),
            )
            .unwrap();
        let stored: RequestReceipt = out.require(blocklog::PARAM_RECEIPT).unwrap();
        assert_eq!(stored, receipt);
    }

    #[test]
    fn test_request_without_sender() {
        let mut vm = TestVm::new();
        let mut req = vm
            .request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new())
            .with_assets(Assets::from_base_tokens(500));
        req.sender = None;
        let common = accounts::common_account(CHAIN);
        let before = vm.base(&common);

        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::InvalidParams));
        assert_eq!(receipt.gas_fee_charged, 0);
        assert_eq!(vm.base(&common), before + 500);
    }

    // ==================== Funds ====================

    #[test]
    fn test_allowance_not_covered() {
        let mut vm = TestVm::new();
        let req = vm
            .request(&agent(3), accounts::NAME, accounts::FUNC_WITHDRAW, Dict::new())
            .with_allowance(Assets::from_base_tokens(1_000));
        let receipt = vm.run_one(req);
        assert_eq!(code(&receipt), Some(VmErrorCode::NotEnoughFundsForAllowance));
        assert_eq!(receipt.gas_fee_charged, 0);
    }

    #[test]
    fn test_withdraw_adds_output() {
        let mut vm = TestVm::new();
        let total = vm.total_base();
        let req = vm
            .request(&agent(3), accounts::NAME, accounts::FUNC_WITHDRAW, Dict::new())
            .with_assets(Assets::from_base_tokens(5_000))
            .with_allowance(Assets::from_base_tokens(1_000));
        let id = req.id;
        let result = vm.run(vec![req.into()]);

        assert!(result.receipts[0].is_success(), "{:?}", result.receipts[0].error);
        assert_eq!(result.essence.consumed, vec![id]);
        assert_eq!(
            result.essence.outputs,
            vec![L1Output {
                target: Address::from_bytes([3; 20]),
                assets: Assets::from_base_tokens(1_000),
            }]
        );
        assert_eq!(vm.base(&agent(3)), 3_900);
        assert_eq!(vm.total_base(), total + 4_000);
    }

    #[test]
    fn test_transfer_through_contract() {
        let mut vm = TestVm::new();
        vm.deploy_counter(Dict::new());
        let req = vm
            .request(
                &agent(1),
                "counter",
                "forward",
                Dict::new().with_value("to", &agent(4)),
            )
            .with_allowance(Assets::from_base_tokens(500));
        assert!(vm.run_one(req).is_success());
        assert_eq!(vm.base(&agent(4)), 500);
        assert_eq!(vm.base(&agent(1)), 100_000 - 500 - 100);
    }

    #[test]
    fn test_validator_fee_share() {
        let genesis = crate::test_utils::test_genesis().with_fee_policy(crate::GasFeePolicy {
            gas_per_token: (100, 1),
            validator_fee_share: 40,
        });
        let mut vm = TestVm::with_genesis(genesis);
        let req = vm.request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new());
        let validator = agent(7);
        let result = run_task(
            vm.task(vec![req.into()])
                .with_validator_fee_target(validator.clone()),
        )
        .unwrap();
        vm.snapshot = result.snapshot;
        assert_eq!(vm.base(&validator), 40);
        assert_eq!(vm.base(&accounts::common_account(CHAIN)), 60);
    }

    #[test]
    fn test_free_chain_charges_nothing() {
        let genesis =
            crate::test_utils::test_genesis().with_fee_policy(crate::GasFeePolicy::free());
        let mut vm = TestVm::with_genesis(genesis);
        let req = vm.request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new());
        let receipt = vm.run_one(req);
        assert_eq!(receipt.gas_fee_charged, 0);
        assert_eq!(vm.base(&agent(1)), 100_000);
    }

    // ==================== Skips ====================

    #[test]
    fn test_timelocked_then_unlocked() {
        let mut vm = TestVm::new();
        let req = vm
            .request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new())
            .with_timelock(vm.now + 10);
        let before = vm.snapshot.clone();

        let result = vm.run(vec![req.clone().into()]);
        assert!(result.receipts.is_empty());
        assert!(matches!(result.skipped[0].1, SkipReason::Timelocked { .. }));
        assert_eq!(result.snapshot, before);

        vm.now += 10;
        assert!(vm.run_one(req).is_success());
    }

    #[test]
    fn test_expired_skipped() {
        let mut vm = TestVm::new();
        let req = vm
            .request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new())
            .with_expiration(vm.now);
        let result = vm.run(vec![req.into()]);
        assert!(matches!(result.skipped[0].1, SkipReason::Expired { .. }));
    }

    #[test]
    fn test_already_processed_skipped() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new());
        vm.run_one(req.clone());
        let result = vm.run(vec![req.into()]);
        assert_eq!(result.skipped[0].1, SkipReason::AlreadyProcessed);
        assert_eq!(result.consumed_ids().len(), 1);
    }

    #[test]
    fn test_off_ledger_nonces() {
        let key = KeyPair::random();
        let sender = isc_types::AgentId::Address(key.address());
        let genesis = crate::test_utils::test_genesis()
            .with_allocation(sender.clone(), Assets::from_base_tokens(10_000));
        let mut vm = TestVm::with_genesis(genesis);
        let target = CallTarget::new(accounts::hname(), hn(accounts::FUNC_DEPOSIT));
        let signed = |nonce, budget| {
            Request::from(
                OffLedgerRequest::new(CHAIN, target, Dict::new(), nonce)
                    .with_gas_budget(budget)
                    .sign(&key)
                    .unwrap(),
            )
        };

        let result = vm.run(vec![signed(0, 20_000)]);
        assert!(result.receipts[0].is_success());
        assert_eq!(result.block_info.unwrap().num_off_ledger_requests, 1);
        let acc = crate::core::partition(&vm.snapshot, accounts::hname());
        assert_eq!(accounts::ledger::get_nonce(&acc, &sender), 1);

        let result = vm.run(vec![signed(0, 30_000)]);
        assert_eq!(
            result.skipped[0].1,
            SkipReason::InvalidNonce {
                expected: 1,
                got: 0
            }
        );
        let result = vm.run(vec![signed(1, 20_000)]);
        assert!(result.receipts[0].is_success());
    }

    #[test]
    fn test_nonce_gap_waits_for_earlier_nonce() {
        let key = KeyPair::random();
        let sender = isc_types::AgentId::Address(key.address());
        let genesis = crate::test_utils::test_genesis()
            .with_allocation(sender, Assets::from_base_tokens(10_000));
        let mut vm = TestVm::with_genesis(genesis);
        let target = CallTarget::new(accounts::hname(), hn(accounts::FUNC_DEPOSIT));
        let signed = |nonce| {
            Request::from(
                OffLedgerRequest::new(CHAIN, target, Dict::new(), nonce)
                    .sign(&key)
                    .unwrap(),
            )
        };

        let ahead = signed(1);
        let result = vm.run(vec![ahead.clone()]);
        assert_eq!(
            result.skipped,
            vec![(ahead.id(), SkipReason::InvalidNonce { expected: 0, got: 1 })]
        );
        assert!(result.consumed_ids().is_empty());
        assert!(!result.has_block());

        let too_far = signed(1 + crate::MAX_NONCE_GAP);
        let result = vm.run(vec![too_far.clone()]);
        assert_eq!(result.consumed_ids(), vec![too_far.id()]);

        let result = vm.run(vec![signed(0), ahead]);
        assert_eq!(result.receipts.len(), 2);
        assert!(result.receipts.iter().all(|r| r.is_success()));
    }

    #[test]
    fn test_off_ledger_invalid_requests_skipped() {
        let key = KeyPair::random();
        let mut vm = TestVm::new();
        let target = CallTarget::new(accounts::hname(), hn(accounts::FUNC_DEPOSIT));

        let unsigned = OffLedgerRequest::new(CHAIN, target, Dict::new(), 0);
        let other_chain = OffLedgerRequest::new(
            isc_types::ChainId::from_bytes([7; 32]),
            target,
            Dict::new(),
            0,
        )
        .sign(&key)
        .unwrap();
        let broke = OffLedgerRequest::new(CHAIN, target, Dict::new(), 0)
            .sign(&key)
            .unwrap();

        let result = vm.run(vec![unsigned.into(), other_chain.into(), broke.into()]);
        assert!(result.receipts.is_empty());
        assert_eq!(result.skipped[0].1, SkipReason::InvalidSignature);
        assert!(matches!(result.skipped[1].1, SkipReason::WrongChain { .. }));
        assert_eq!(result.skipped[2].1, SkipReason::CannotPayMinimumFee { fee: 100 });
    }

    // ==================== Registry ====================

    #[test]
    fn test_deploy_and_init_params() {
        let mut vm = TestVm::new();
        let receipt = vm.deploy_counter(Dict::new().with_value("v", &41u64));
        assert!(receipt.is_success(), "{:?}", receipt.error);
        assert_eq!(vm.counter(), 41);
        assert_eq!(receipt.events[0].topic, root::EVENT_DEPLOY);

        let registry = crate::core::partition(&vm.snapshot, root::hname());
        let record = root::find_contract(&registry, hn("counter")).unwrap();
        assert_eq!(record.creator, OWNER);
        assert_eq!(root::contract_count(&registry), 6);
    }
}
