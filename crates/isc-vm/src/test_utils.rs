//! Fixtures shared by the VM tests

use crate::core::{self as corecontracts, accounts, root};
use crate::gas::BurnCode;
use crate::genesis::{init_chain, ChainGenesis};
use crate::processors::{ContractInterface, ProcessorCache};
use crate::task::{run_task, VmTask, VmTaskResult};
use crate::view::call_view;
use isc_storage::{KvReader, KvWriter, StateSnapshot};
use isc_types::codec;
use isc_types::{
    hn, Address, AgentId, Assets, CallTarget, ChainId, Dict, OnLedgerRequest, Request, RequestId,
    RequestReceipt, Timestamp, VmError, H256,
};
use std::sync::Arc;

pub(crate) const CHAIN: ChainId = ChainId::from_bytes([1; 32]);
pub(crate) const OWNER: AgentId = AgentId::Address(Address::from_bytes([9; 20]));

/// L1 address agent number `n`
pub(crate) fn agent(n: u8) -> AgentId {
    AgentId::Address(Address::from_bytes([n; 20]))
}

/// Contract `counter` used by the flow tests
pub(crate) fn counter_contract() -> ContractInterface {
    ContractInterface::new("counter", "test counter")
        .func("init", |ctx| {
            if ctx.params().has("fail") {
                return Err(VmError::generic("constructor failed"));
            }
            let start: u64 = ctx.params().get_or("v", 0)?;
            ctx.state().set(b"c", codec::encode(&start));
            Ok(Dict::new())
        })
        .func("inc", |ctx| {
            let value = read_counter(&ctx.state_reader()) + 1;
            ctx.state().set(b"c", codec::encode(&value));
            ctx.event("inc", codec::encode(&value))?;
            Ok(Dict::new().with_value("c", &value))
        })
        .func("doPanic", |ctx| {
            ctx.state().set(b"c", codec::encode(&1_000u64));
            panic!("counter panicked")
        })
        .func("failWithError", |ctx| {
            ctx.state().set(b"c", codec::encode(&1_000u64));
            Err(VmError::generic("failed on purpose"))
        })
        .func("burnGas", |ctx| loop {
            ctx.burn_gas(BurnCode::Custom, 1_000)?;
        })
        .func("recurse", |ctx| {
            let me = ctx.contract();
            ctx.call(me, hn("recurse"), Dict::new(), Assets::new())
        })
        .func("forward", |ctx| {
            let target: AgentId = ctx.params().require("to")?;
            let moved = ctx.transfer_allowed_funds(&target, None)?;
            Ok(Dict::new().with_value("moved", &moved))
        })
        .view("get", |ctx| {
            Ok(Dict::new().with_value("c", &read_counter(&ctx.state_reader())))
        })
        .view("sneakyWrite", |ctx| {
            ctx.state().set(b"c", codec::encode(&77u64));
            Ok(Dict::new())
        })
}

fn read_counter(state: &dyn KvReader) -> u64 {
    state
        .get(b"c")
        .and_then(|b| codec::decode(&b).ok())
        .unwrap_or_default()
}

/// Genesis with `agent(1)` and `agent(2)` funded
pub(crate) fn test_genesis() -> ChainGenesis {
    ChainGenesis::new(CHAIN, OWNER)
        .with_allocation(OWNER, Assets::from_base_tokens(1_000_000))
        .with_allocation(agent(1), Assets::from_base_tokens(100_000))
        .with_allocation(agent(2), Assets::from_base_tokens(100_000))
}

/// A chain run one batch at a time
pub(crate) struct TestVm {
    pub processors: Arc<ProcessorCache>,
    pub snapshot: StateSnapshot,
    pub now: Timestamp,
    next_tx: u32,
}

impl TestVm {
    pub fn new() -> Self {
        Self::with_genesis(test_genesis())
    }

    pub fn with_genesis(genesis: ChainGenesis) -> Self {
        let processors = Arc::new(ProcessorCache::new());
        processors.register_native(counter_contract());
        let mut snapshot = StateSnapshot::new();
        init_chain(&mut snapshot, &genesis, &corecontracts::core_contracts()).unwrap();
        Self {
            processors,
            snapshot,
            now: 1_000,
            next_tx: 0,
        }
    }

    /// On-ledger request from `sender` with a fresh ID
    pub fn request(&mut self, sender: &AgentId, contract: &str, ep: &str, params: Dict) -> OnLedgerRequest {
        self.next_tx += 1;
        let mut tx = [0u8; 32];
        tx[..4].copy_from_slice(&self.next_tx.to_be_bytes());
        OnLedgerRequest::new(
            RequestId::new(H256::from_bytes(tx), 0),
            CallTarget::new(hn(contract), hn(ep)),
        )
        .with_sender(sender.clone())
        .with_params(params)
    }

    pub fn task(&self, requests: Vec<Request>) -> VmTask {
        VmTask::new(
            self.processors.clone(),
            CHAIN,
            self.snapshot.clone(),
            requests.into_iter().map(Arc::new).collect(),
            self.now,
        )
    }

    /// Run a batch and adopt its state
    pub fn run(&mut self, requests: Vec<Request>) -> VmTaskResult {
        let result = run_task(self.task(requests)).unwrap();
        self.snapshot = result.snapshot.clone();
        result
    }

    /// Run a single request that must be processed
    pub fn run_one(&mut self, request: impl Into<Request>) -> RequestReceipt {
        let mut result = self.run(vec![request.into()]);
        assert!(result.skipped.is_empty(), "skipped: {:?}", result.skipped);
        result.receipts.remove(0)
    }

    /// Deploy `counter` as the chain owner
    pub fn deploy_counter(&mut self, init: Dict) -> RequestReceipt {
        let params = init
            .with_value(root::PARAM_NAME, &"counter".to_string())
            .with_value(root::PARAM_PROGRAM_HASH, &counter_contract().program_hash());
        let req = self.request(&OWNER, root::NAME, root::FUNC_DEPLOY_CONTRACT, params);
        self.run_one(req)
    }

    pub fn view(&self, contract: &str, ep: &str, params: Dict) -> Result<Dict, VmError> {
        call_view(
            self.processors.clone(),
            CHAIN,
            &self.snapshot,
            hn(contract),
            hn(ep),
            params,
        )
    }

    pub fn counter(&self) -> u64 {
        self.view("counter", "get", Dict::new())
            .unwrap()
            .get_value::<u64>("c")
            .unwrap()
            .unwrap()
    }

    pub fn balance(&self, agent: &AgentId) -> Assets {
        let acc = corecontracts::partition(&self.snapshot, accounts::hname());
        accounts::ledger::get_assets(&acc, agent)
    }

    pub fn base(&self, agent: &AgentId) -> u64 {
        self.balance(agent).base_tokens
    }

    /// Base tokens on all accounts
    pub fn total_base(&self) -> u64 {
        let acc = corecontracts::partition(&self.snapshot, accounts::hname());
        accounts::ledger::total_assets(&acc).base_tokens
    }
}
