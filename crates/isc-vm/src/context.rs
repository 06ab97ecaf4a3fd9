//! Request execution context and the sandbox handed to contracts

use crate::core::accounts::{self, ledger};
use crate::core::{self as corecontracts, blocklog, governance, root};
use crate::error::SkipReason;
use crate::gas::{BurnCode, GasFeePolicy, GasLimits, GasMeter};
use crate::processors::ProcessorCache;
use crate::sandbox::Sandbox;
use crate::txbuilder::{TxBuilder, TxCheckpoint};
use isc_storage::{BufferedKv, Mutations, StateSnapshot, SubRealm, SubRealmReader};
use isc_types::{
    Address, AgentId, Assets, BlockIndex, ChainId, Dict, Event, Gas, Hname, Request,
    RequestId, RequestReceipt, Timestamp, VmError, VmErrorCode, H256,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

/// Maximum nesting of contract calls
pub const MAX_CALL_DEPTH: u32 = 32;

/// Batch-wide inputs shared by every request of a task
#[derive(Clone, Debug)]
pub(crate) struct TaskEnv {
    pub chain_id: ChainId,
    pub processors: Arc<ProcessorCache>,
    pub timestamp: Timestamp,
    pub block_index: BlockIndex,
    pub validator_fee_target: AgentId,
}

/// Result of running one request
#[derive(Debug)]
pub(crate) enum RequestOutcome {
    Processed(RequestReceipt),
    Skipped(SkipReason),
}

struct Checkpoint {
    mutations: Mutations,
    events: usize,
    tx: TxCheckpoint,
}

/// Mutable state of a batch while requests run one after another.
///
/// Every write goes to `state`, a buffer on top of the snapshot left by the
/// previous request. The task commits the buffer after each request.
pub(crate) struct VmContext {
    env: TaskEnv,
    state: BufferedKv<StateSnapshot>,
    txbuilder: TxBuilder,
    request_id: Option<RequestId>,
    entropy: H256,
    gas: GasMeter,
    events: Vec<Event>,
    depth: u32,
    chain_owner: AgentId,
    limits: GasLimits,
    policy: GasFeePolicy,
}

impl VmContext {
    pub fn new(env: TaskEnv, snapshot: StateSnapshot) -> Self {
        let mut ctx = Self {
            env,
            state: BufferedKv::new(snapshot),
            txbuilder: TxBuilder::new(),
            request_id: None,
            entropy: H256::ZERO,
            gas: GasMeter::default(),
            events: Vec::new(),
            depth: 0,
            chain_owner: AgentId::Nil,
            limits: GasLimits::default(),
            policy: GasFeePolicy::default(),
        };
        ctx.load_governance();
        ctx
    }

    /// Fold the pending writes into the base snapshot, returning them
    pub fn commit(&mut self) -> Mutations {
        self.state.commit()
    }

    /// State with pending writes
    pub fn state(&self) -> &BufferedKv<StateSnapshot> {
        &self.state
    }

    /// State with pending writes, writable
    pub fn state_mut(&mut self) -> &mut BufferedKv<StateSnapshot> {
        &mut self.state
    }

    /// Final snapshot and the L1 transaction under construction.
    /// Uncommitted writes are dropped.
    pub fn into_parts(self) -> (StateSnapshot, TxBuilder) {
        let (snapshot, _) = self.state.into_parts();
        (snapshot, self.txbuilder)
    }

    fn load_governance(&mut self) {
        let gov = corecontracts::partition(&self.state, governance::hname());
        self.chain_owner = governance::chain_owner(&gov);
        self.limits = governance::gas_limits(&gov);
        self.policy = governance::fee_policy(&gov);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            mutations: self.state.mutations().clone(),
            events: self.events.len(),
            tx: self.txbuilder.checkpoint(),
        }
    }

    fn restore(&mut self, cp: Checkpoint) {
        self.state.restore(cp.mutations);
        self.events.truncate(cp.events);
        self.txbuilder.restore(cp.tx);
    }

    /// Run one request: skip checks, crediting of attached assets, the call,
    /// fee charging and the receipt.
    pub fn run_request(
        &mut self,
        req: &Arc<Request>,
        request_index: u16,
        entropy: H256,
    ) -> RequestOutcome {
        self.load_governance();
        if let Err(reason) = self.check_skip(req) {
            return RequestOutcome::Skipped(reason);
        }

        let id = req.id();
        self.request_id = Some(id);
        self.entropy = entropy;
        self.events.clear();
        self.depth = 0;
        self.gas = GasMeter::new(0);

        let sender = req.sender();
        if let Some(on_ledger) = req.as_on_ledger() {
            self.txbuilder.consume(id);
            let owner = sender
                .clone()
                .unwrap_or_else(|| accounts::common_account(self.env.chain_id));
            let mut acc = corecontracts::partition_mut(&mut self.state, accounts::hname());
            ledger::credit(&mut acc, &owner, &on_ledger.assets);
        }

        let Some(sender) = sender else {
            let error = VmError::invalid_params("request has no sender");
            let receipt = self.finish(req, request_index, Some(error), 0);
            return RequestOutcome::Processed(receipt);
        };

        self.gas = GasMeter::new(self.gas_budget(req, &sender));
        let cp = self.checkpoint();
        let error = match self.call_from_request(req, &sender) {
            Ok(_) => None,
            Err(err) => {
                debug!(request = %id, error = %err, "request failed");
                self.restore(cp);
                Some(err)
            }
        };

        self.gas.burn_at_least(self.limits.min_gas_per_request);
        let fee = self.charge_fee(&sender);
        if req.is_off_ledger() {
            let mut acc = corecontracts::partition_mut(&mut self.state, accounts::hname());
            ledger::increment_nonce(&mut acc, &sender);
        }

        RequestOutcome::Processed(self.finish(req, request_index, error, fee))
    }

    /// Build the receipt of a processed request and store it in the block log
    fn finish(
        &mut self,
        req: &Request,
        request_index: u16,
        error: Option<VmError>,
        fee: u64,
    ) -> RequestReceipt {
        let events = if error.is_none() {
            std::mem::take(&mut self.events)
        } else {
            self.events.clear();
            Vec::new()
        };
        let receipt = RequestReceipt {
            request_id: req.id(),
            block_index: self.env.block_index,
            request_index,
            gas_budget: self.gas.budget(),
            gas_burned: self.gas.burned(),
            gas_fee_charged: fee,
            error,
            events,
        };
        let mut blocklog_state = corecontracts::partition_mut(&mut self.state, blocklog::hname());
        blocklog::save_receipt(&mut blocklog_state, &receipt);
        receipt
    }

    fn check_skip(&self, req: &Request) -> Result<(), SkipReason> {
        let now = self.env.timestamp;
        let blocklog_state = corecontracts::partition(&self.state, blocklog::hname());
        if blocklog::is_request_processed(&blocklog_state, &req.id()) {
            return Err(SkipReason::AlreadyProcessed);
        }

        match req {
            Request::OnLedger(r) => {
                if !r.is_unlocked(now) {
                    return Err(SkipReason::Timelocked {
                        timelock: r.timelock.unwrap_or_default(),
                        now,
                    });
                }
                if r.is_expired(now) {
                    return Err(SkipReason::Expired {
                        expiration: r.expiration.unwrap_or_default(),
                        now,
                    });
                }
            }
            Request::OffLedger(r) => {
                if r.chain_id != self.env.chain_id {
                    return Err(SkipReason::WrongChain {
                        expected: self.env.chain_id,
                        got: r.chain_id,
                    });
                }
                if !r.verify_signature() {
                    return Err(SkipReason::InvalidSignature);
                }
                let sender = r
                    .sender_address()
                    .map(AgentId::Address)
                    .ok_or(SkipReason::InvalidSignature)?;
                let acc = corecontracts::partition(&self.state, accounts::hname());
                let expected = ledger::get_nonce(&acc, &sender);
                if r.nonce != expected {
                    return Err(SkipReason::InvalidNonce {
                        expected,
                        got: r.nonce,
                    });
                }
                if !self.policy.is_free() {
                    let fee = self.policy.fee_for_gas(self.limits.min_gas_per_request);
                    if ledger::get_base_tokens(&acc, &sender) < fee {
                        return Err(SkipReason::CannotPayMinimumFee { fee });
                    }
                }
            }
        }
        Ok(())
    }

    /// Gas the request may burn: its own budget clamped to the chain
    /// limits and to what the sender can pay for
    fn gas_budget(&self, req: &Request, sender: &AgentId) -> Gas {
        let min = self.limits.min_gas_per_request;
        let requested = req
            .gas_budget()
            .max(min)
            .min(self.limits.max_gas_per_request);
        if self.policy.is_free() {
            return requested;
        }
        let acc = corecontracts::partition(&self.state, accounts::hname());
        let spendable = ledger::get_base_tokens(&acc, sender)
            .saturating_sub(req.allowance().base_tokens);
        requested.min(self.policy.gas_for_tokens(spendable)).max(min)
    }

    fn call_from_request(&mut self, req: &Request, sender: &AgentId) -> Result<Dict, VmError> {
        let allowance = req.allowance().clone();
        let acc = corecontracts::partition(&self.state, accounts::hname());
        if !ledger::get_assets(&acc, sender).covers(&allowance) {
            return Err(VmError::new(
                VmErrorCode::NotEnoughFundsForAllowance,
                format!("{sender} cannot cover allowance {allowance}"),
            ));
        }
        let target = req.target();
        let incoming = req.assets().cloned().unwrap_or_default();
        self.call_program(
            sender.clone(),
            target.contract,
            target.entry_point,
            req.params().clone(),
            allowance,
            incoming,
            false,
        )
    }

    /// Charge the fee for the gas burned, capped by the sender's base
    /// balance; returns the fee charged
    fn charge_fee(&mut self, sender: &AgentId) -> u64 {
        let fee = self.policy.fee_for_gas(self.gas.burned());
        if fee == 0 {
            return 0;
        }
        let common = accounts::common_account(self.env.chain_id);
        let validator = self.env.validator_fee_target.clone();
        let mut acc = corecontracts::partition_mut(&mut self.state, accounts::hname());
        let charged = fee.min(ledger::get_base_tokens(&acc, sender));
        let (to_common, to_validator) = self.policy.split_fee(charged);
        ledger::move_between_accounts(&mut acc, sender, &common, &Assets::from_base_tokens(to_common));
        if to_validator > 0 {
            ledger::move_between_accounts(
                &mut acc,
                sender,
                &validator,
                &Assets::from_base_tokens(to_validator),
            );
        }
        charged
    }

    /// Call a view from outside any request, with the external view gas
    /// limit
    pub fn call_view_external(
        &mut self,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
    ) -> Result<Dict, VmError> {
        self.request_id = None;
        self.gas = GasMeter::new(self.limits.max_gas_external_view_call);
        self.call_program(
            AgentId::Nil,
            contract,
            entry_point,
            params,
            Assets::new(),
            Assets::new(),
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn call_program(
        &mut self,
        caller: AgentId,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
        allowance: Assets,
        incoming: Assets,
        view: bool,
    ) -> Result<Dict, VmError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(VmError::generic(format!(
                "call depth {MAX_CALL_DEPTH} exceeded"
            )));
        }
        self.gas.burn(BurnCode::CallContract.cost(0))?;

        let registry = corecontracts::partition(&self.state, root::hname());
        let record = root::find_contract(&registry, contract)
            .ok_or_else(|| VmError::contract_not_found(contract))?;
        let processor = self
            .env
            .processors
            .get_or_load(&record.program_hash, &self.state)?;
        let ep = processor
            .entry_point(entry_point)
            .ok_or_else(|| VmError::entry_point_not_found(contract, entry_point))?;
        if view && !ep.is_view() {
            return Err(VmError::unauthorized(format!(
                "{}::{} is not a view",
                record.name,
                ep.name()
            )));
        }
        trace!(contract = %record.name, entry_point = ep.name(), caller = %caller, "call");

        let cp = self.checkpoint();
        let frame = Frame {
            contract,
            name: record.name,
            caller,
            params,
            allowance,
            incoming,
            view: view || ep.is_view(),
        };
        let read_only = frame.view;
        self.depth += 1;
        let result = {
            let mut sandbox = CallSandbox {
                ctx: &mut *self,
                frame,
            };
            match catch_unwind(AssertUnwindSafe(|| ep.call(&mut sandbox))) {
                Ok(result) => result,
                Err(payload) => Err(VmError::new(VmErrorCode::Panic, panic_message(payload))),
            }
        };
        self.depth -= 1;

        if result.is_err() || read_only {
            self.restore(cp);
        }
        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "contract panicked".to_string()
    }
}

struct Frame {
    contract: Hname,
    name: String,
    caller: AgentId,
    params: Dict,
    allowance: Assets,
    incoming: Assets,
    view: bool,
}

/// [`Sandbox`] of one contract call
struct CallSandbox<'c> {
    ctx: &'c mut VmContext,
    frame: Frame,
}

impl CallSandbox<'_> {
    fn require_writable(&self) -> Result<(), VmError> {
        if self.frame.view {
            return Err(VmError::unauthorized(format!(
                "view of '{}' cannot change state",
                self.frame.name
            )));
        }
        Ok(())
    }
}

impl Sandbox for CallSandbox<'_> {
    fn chain_id(&self) -> ChainId {
        self.ctx.env.chain_id
    }

    fn contract(&self) -> Hname {
        self.frame.contract
    }

    fn caller(&self) -> AgentId {
        self.frame.caller.clone()
    }

    fn request_id(&self) -> Option<RequestId> {
        self.ctx.request_id
    }

    fn params(&self) -> &Dict {
        &self.frame.params
    }

    fn timestamp(&self) -> Timestamp {
        self.ctx.env.timestamp
    }

    fn entropy(&self) -> H256 {
        self.ctx.entropy
    }

    fn chain_owner(&self) -> AgentId {
        self.ctx.chain_owner.clone()
    }

    fn min_request_fee(&self) -> u64 {
        self.ctx.policy.fee_for_gas(self.ctx.limits.min_gas_per_request)
    }

    fn is_view(&self) -> bool {
        self.frame.view
    }

    fn state(&mut self) -> SubRealm<'_> {
        corecontracts::partition_mut(&mut self.ctx.state, self.frame.contract)
    }

    fn state_reader(&self) -> SubRealmReader<'_> {
        corecontracts::partition(&self.ctx.state, self.frame.contract)
    }

    fn allowance(&self) -> &Assets {
        &self.frame.allowance
    }

    fn incoming(&self) -> &Assets {
        &self.frame.incoming
    }

    fn balance(&self, agent: &AgentId) -> Assets {
        let acc = corecontracts::partition(&self.ctx.state, accounts::hname());
        ledger::get_assets(&acc, agent)
    }

    fn transfer_allowed_funds(
        &mut self,
        target: &AgentId,
        assets: Option<&Assets>,
    ) -> Result<Assets, VmError> {
        self.require_writable()?;
        let amount = assets.cloned().unwrap_or_else(|| self.frame.allowance.clone());
        if !self.frame.allowance.covers(&amount) {
            return Err(VmError::not_enough_allowance(format!(
                "{amount} exceeds allowance {}",
                self.frame.allowance
            )));
        }
        self.ctx.gas.burn(BurnCode::TransferAllowance.cost(0))?;

        let mut acc = corecontracts::partition_mut(&mut self.ctx.state, accounts::hname());
        if !ledger::move_between_accounts(&mut acc, &self.frame.caller, target, &amount) {
            return Err(VmError::not_enough_funds(format!(
                "{} cannot transfer {amount}",
                self.frame.caller
            )));
        }
        self.frame.allowance.spend(&amount);
        Ok(amount)
    }

    fn burn_gas(&mut self, code: BurnCode, units: u64) -> Result<(), VmError> {
        self.ctx.gas.burn(code.cost(units))
    }

    fn event(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), VmError> {
        self.ctx
            .gas
            .burn(BurnCode::EmitEvent.cost(payload.len() as u64))?;
        self.ctx
            .events
            .push(Event::new(self.frame.contract, topic, payload));
        Ok(())
    }

    fn call(
        &mut self,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
        allowance: Assets,
    ) -> Result<Dict, VmError> {
        let caller = self.contract_agent_id();
        let view = self.frame.view;
        self.ctx
            .call_program(caller, contract, entry_point, params, allowance, Assets::new(), view)
    }

    fn call_view(
        &mut self,
        contract: Hname,
        entry_point: Hname,
        params: Dict,
    ) -> Result<Dict, VmError> {
        let caller = self.contract_agent_id();
        self.ctx.call_program(
            caller,
            contract,
            entry_point,
            params,
            Assets::new(),
            Assets::new(),
            true,
        )
    }

    fn log(&self, msg: &str) {
        debug!(contract = %self.frame.name, "{msg}");
    }

    fn send_to_l1(&mut self, target: Address, assets: &Assets) -> Result<(), VmError> {
        if self.frame.contract != accounts::hname() {
            return Err(VmError::unauthorized(format!(
                "'{}' cannot send funds to L1",
                self.frame.name
            )));
        }
        self.require_writable()?;
        self.ctx.gas.burn(BurnCode::SendToL1.cost(0))?;

        let me = self.contract_agent_id();
        let mut acc = corecontracts::partition_mut(&mut self.ctx.state, accounts::hname());
        if !ledger::debit(&mut acc, &me, assets) {
            return Err(VmError::not_enough_funds(format!(
                "{me} cannot send {assets} to L1"
            )));
        }
        self.ctx.txbuilder.add_output(target, assets.clone());
        Ok(())
    }

    fn load_program(&mut self, program_hash: &H256) -> Result<(), VmError> {
        if self.frame.contract != root::hname() {
            return Err(VmError::unauthorized(format!(
                "'{}' cannot load programs",
                self.frame.name
            )));
        }
        self.ctx
            .env
            .processors
            .get_or_load(program_hash, &self.ctx.state)
            .map(|_| ())
    }
}
