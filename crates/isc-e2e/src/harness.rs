//! Test harness for E2E testing
//!
//! Drives the mempool and the VM synchronously, one block at a time, with a
//! logical clock the test advances explicitly.

use crate::contracts;
use crate::{E2EError, E2EResult};
use isc_crypto::{keccak256_concat, KeyPair};
use isc_mempool::{Mempool, PoolConfig};
use isc_metrics::ChainMetrics;
use isc_storage::StateSnapshot;
use isc_types::{
    hn, Address, AgentId, Assets, CallTarget, ChainId, Dict, OffLedgerRequest, OnLedgerRequest,
    Request, RequestId, RequestReceipt, Timestamp, VmError, VmErrorCode, H256,
};
use isc_vm::core::accounts::{self, ledger};
use isc_vm::core::{self as corecontracts, blob, root};
use isc_vm::{
    call_view, init_chain, run_task, ChainGenesis, ProcessorCache, VmTask, VmTaskResult,
};
use std::sync::Arc;

/// Chain ID of every test chain
pub const TEST_CHAIN_ID: ChainId = ChainId::from_bytes([0xe2; 32]);

/// Base tokens given to accounts created by [`TestChain::create_account`]
pub const FUNDED_BALANCE: u64 = 1_000_000;

/// Clock value of a fresh chain
const START_TIME: Timestamp = 1_000;

/// Test account with a signing key
#[derive(Debug)]
pub struct TestAccount {
    key: KeyPair,
    nonce: u64,
}

impl TestAccount {
    /// Create a new random account
    pub fn random() -> Self {
        Self {
            key: KeyPair::random(),
            nonce: 0,
        }
    }

    /// L1 address
    pub fn address(&self) -> Address {
        self.key.address()
    }

    /// Agent ID of the account on the chain
    pub fn agent(&self) -> AgentId {
        AgentId::Address(self.address())
    }

    /// Take the next off-ledger nonce
    pub fn next_nonce(&mut self) -> u64 {
        let n = self.nonce;
        self.nonce += 1;
        n
    }
}

/// A single chain: pool, processors, clock and the latest state
pub struct TestChain {
    processors: Arc<ProcessorCache>,
    mempool: Mempool,
    metrics: ChainMetrics,
    snapshot: StateSnapshot,
    owner: TestAccount,
    now: Timestamp,
    next_tx: u64,
}

impl TestChain {
    /// Fresh chain whose owner holds [`FUNDED_BALANCE`]
    pub fn new() -> Self {
        Self::with_pool_config(PoolConfig::default())
    }

    /// Fresh chain with custom pool settings
    pub fn with_pool_config(config: PoolConfig) -> Self {
        let owner = TestAccount::random();
        let genesis = ChainGenesis::new(TEST_CHAIN_ID, owner.agent())
            .with_allocation(owner.agent(), Assets::from_base_tokens(FUNDED_BALANCE));

        let processors = Arc::new(ProcessorCache::new());
        processors.register_native(contracts::counter());
        processors.register_native(contracts::bad());
        processors.register_vm_type(contracts::MUL_VM_TYPE, Arc::new(contracts::MulFactory));

        let mut snapshot = StateSnapshot::new();
        // a fresh snapshot always accepts genesis
        if let Err(e) = init_chain(&mut snapshot, &genesis, &corecontracts::core_contracts()) {
            panic!("genesis failed: {e}");
        }

        let metrics = ChainMetrics::new();
        Self {
            processors,
            mempool: Mempool::new(config, metrics.clone()),
            metrics,
            snapshot,
            owner,
            now: START_TIME,
            next_tx: 0,
        }
    }

    /// Chain owner
    pub fn owner(&self) -> &TestAccount {
        &self.owner
    }

    /// Request pool
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    /// Metrics shared by the pool and the VM runs
    pub fn metrics(&self) -> &ChainMetrics {
        &self.metrics
    }

    /// Latest state
    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    /// Logical time
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Move the clock forward
    pub fn advance_time(&mut self, delta: Timestamp) {
        self.now += delta;
    }

    /// New account funded with [`FUNDED_BALANCE`] through an on-ledger deposit
    pub fn create_account(&mut self) -> E2EResult<TestAccount> {
        let account = TestAccount::random();
        let req = self
            .on_ledger(&account.agent(), accounts::NAME, accounts::FUNC_DEPOSIT, Dict::new())
            .with_assets(Assets::from_base_tokens(FUNDED_BALANCE));
        self.send(req)?.assert_success();
        Ok(account)
    }

    /// On-ledger request with a fresh ID
    pub fn on_ledger(
        &mut self,
        sender: &AgentId,
        contract: &str,
        entry_point: &str,
        params: Dict,
    ) -> OnLedgerRequest {
        self.next_tx += 1;
        let tx = keccak256_concat([&b"e2e-tx"[..], &self.next_tx.to_be_bytes()[..]]);
        OnLedgerRequest::new(
            RequestId::new(tx, 0),
            CallTarget::new(hn(contract), hn(entry_point)),
        )
        .with_sender(sender.clone())
        .with_params(params)
    }

    /// Signed off-ledger request using the account's next nonce
    pub fn off_ledger(
        &self,
        account: &mut TestAccount,
        contract: &str,
        entry_point: &str,
        params: Dict,
        allowance: Assets,
    ) -> E2EResult<OffLedgerRequest> {
        let nonce = account.next_nonce();
        Ok(OffLedgerRequest::new(
            TEST_CHAIN_ID,
            CallTarget::new(hn(contract), hn(entry_point)),
            params,
            nonce,
        )
        .with_allowance(allowance)
        .sign(&account.key)?)
    }

    /// Put requests into the pool
    pub fn submit(&self, requests: Vec<Request>) -> Vec<bool> {
        self.mempool.receive_requests(requests)
    }

    /// Run the current proposal, adopt the new state and drop consumed
    /// requests from the pool. `None` if nothing was eligible.
    pub fn produce_block(&mut self) -> E2EResult<Option<VmTaskResult>> {
        let requests = self.mempool.request_batch_proposal(self.now);
        if requests.is_empty() {
            return Ok(None);
        }
        let entropy = keccak256_concat([&b"e2e-entropy"[..], &self.now.to_be_bytes()[..]]);
        let task = VmTask::new(
            self.processors.clone(),
            TEST_CHAIN_ID,
            self.snapshot.clone(),
            requests,
            self.now,
        )
        .with_entropy(entropy)
        .with_metrics(self.metrics.clone());

        let result = run_task(task)?;
        self.snapshot = result.snapshot.clone();
        self.mempool.remove_requests(&result.consumed_ids());
        tracing::debug!(
            receipts = result.receipts.len(),
            skipped = result.skipped.len(),
            "e2e block produced"
        );
        Ok(Some(result))
    }

    /// Submit one request, produce a block and return its receipt
    pub fn send(&mut self, request: impl Into<Request>) -> E2EResult<RequestReceipt> {
        let request = request.into();
        let id = request.id();
        self.submit(vec![request]);
        let result = self
            .produce_block()?
            .ok_or_else(|| E2EError::Request(format!("request {id} was not proposed")))?;
        if let Some((_, reason)) = result.skipped.iter().find(|(skipped, _)| *skipped == id) {
            return Err(E2EError::Request(format!("request {id} skipped: {reason}")));
        }
        result
            .receipts
            .into_iter()
            .find(|r| r.request_id == id)
            .ok_or_else(|| E2EError::Request(format!("no receipt for {id}")))
    }

    /// View call against the latest state
    pub fn view(&self, contract: &str, entry_point: &str, params: Dict) -> Result<Dict, VmError> {
        call_view(
            self.processors.clone(),
            TEST_CHAIN_ID,
            &self.snapshot,
            hn(contract),
            hn(entry_point),
            params,
        )
    }

    /// Store a blob as `sender`; returns its hash
    pub fn store_blob(&mut self, sender: &AgentId, fields: Dict) -> E2EResult<H256> {
        let hash = blob::blob_hash(&fields);
        let req = self.on_ledger(sender, blob::NAME, blob::FUNC_STORE_BLOB, fields);
        match self.send(req)?.error {
            Some(err) => Err(E2EError::View(err)),
            None => Ok(hash),
        }
    }

    /// Deploy `program_hash` as `name`
    pub fn deploy(
        &mut self,
        sender: &AgentId,
        name: &str,
        program_hash: H256,
        init: Dict,
    ) -> E2EResult<RequestReceipt> {
        let params = init
            .with_value(root::PARAM_NAME, &name.to_string())
            .with_value(root::PARAM_PROGRAM_HASH, &program_hash);
        let req = self.on_ledger(sender, root::NAME, root::FUNC_DEPLOY_CONTRACT, params);
        self.send(req)
    }

    /// Whether `name` is in the contract registry
    pub fn has_contract(&self, name: &str) -> bool {
        root::find_contract(&corecontracts::partition(&self.snapshot, root::hname()), hn(name))
            .is_some()
    }

    /// Number of registered contracts
    pub fn contract_count(&self) -> u32 {
        root::contract_count(&corecontracts::partition(&self.snapshot, root::hname()))
    }

    /// On-chain assets of `agent`
    pub fn balance(&self, agent: &AgentId) -> Assets {
        ledger::get_assets(&self.accounts(), agent)
    }

    /// On-chain base tokens of `agent`
    pub fn base(&self, agent: &AgentId) -> u64 {
        ledger::get_base_tokens(&self.accounts(), agent)
    }

    /// Recorded total of base tokens
    pub fn total_base(&self) -> u64 {
        ledger::total_assets(&self.accounts()).base_tokens
    }

    /// Verify the account ledger of the latest state
    pub fn check_ledger(&self) -> E2EResult<()> {
        ledger::check_ledger(&self.accounts()).map_err(|e| E2EError::Run(e.into()))
    }

    fn accounts(&self) -> isc_storage::SubRealmReader<'_> {
        corecontracts::partition(&self.snapshot, accounts::hname())
    }
}

impl Default for TestChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Receipt assertions
pub trait ReceiptAssertions {
    /// Assert that the request succeeded
    fn assert_success(&self) -> &Self;

    /// Assert that the request failed with `code`
    fn assert_failed_with(&self, code: VmErrorCode) -> &Self;
}

impl ReceiptAssertions for RequestReceipt {
    fn assert_success(&self) -> &Self {
        assert!(
            self.error.is_none(),
            "request {} failed: {:?}",
            self.request_id,
            self.error
        );
        self
    }

    fn assert_failed_with(&self, code: VmErrorCode) -> &Self {
        match &self.error {
            Some(err) => assert_eq!(err.code, code, "request {} failed with {err}", self.request_id),
            None => panic!("request {} succeeded, expected {code}", self.request_id),
        }
        self
    }
}
