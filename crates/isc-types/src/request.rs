//! Requests: the unit of work submitted to a chain

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::{AgentId, Assets, ChainId, Dict, Hname};
use isc_crypto::{
    keccak256, keccak256_concat, public_key_from_bytes, public_key_to_address, verify,
    CryptoError, KeyPair, Signature,
};
use isc_primitives::{Address, Gas, Nonce, Timestamp, H256};
use std::fmt;

/// Gas budget of a request that does not set one: as much as the sender
/// can afford, capped by the chain's per-request limit
pub const DEFAULT_GAS_BUDGET: Gas = Gas::MAX;

/// Unique request identifier.
///
/// For on-ledger requests this is the ID of the L1 output carrying the
/// request. For off-ledger requests `tx_id` is the hash of the signed
/// request and `output_index` is 0.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RequestId {
    /// L1 transaction ID, or off-ledger request hash
    pub tx_id: H256,
    /// Output index within the transaction
    pub output_index: u16,
}

impl RequestId {
    /// New request ID
    pub fn new(tx_id: H256, output_index: u16) -> Self {
        Self { tx_id, output_index }
    }

    /// Byte form used as a state key
    pub fn to_bytes(&self) -> [u8; 34] {
        let mut out = [0u8; 34];
        out[..32].copy_from_slice(self.tx_id.as_bytes());
        out[32..].copy_from_slice(&self.output_index.to_be_bytes());
        out
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id.short(), self.output_index)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({self})")
    }
}

impl Encodable for RequestId {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.tx_id);
        s.append(&self.output_index);
    }
}

impl Decodable for RequestId {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(RequestId {
            tx_id: rlp.val_at(0)?,
            output_index: rlp.val_at(1)?,
        })
    }
}

/// Contract and entry point a request calls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallTarget {
    /// Target contract
    pub contract: Hname,
    /// Target entry point
    pub entry_point: Hname,
}

impl CallTarget {
    /// New call target
    pub fn new(contract: Hname, entry_point: Hname) -> Self {
        Self { contract, entry_point }
    }
}

/// Request carried by an L1 output. Its assets are transferred to the
/// chain together with the request.
#[derive(Clone, Debug)]
pub struct OnLedgerRequest {
    /// L1 output ID
    pub id: RequestId,
    /// Sender, when the output carries a sender feature
    pub sender: Option<AgentId>,
    /// Call target
    pub target: CallTarget,
    /// Call parameters
    pub params: Dict,
    /// Assets attached to the output
    pub assets: Assets,
    /// Assets the sender allows the target to take
    pub allowance: Assets,
    /// Gas budget
    pub gas_budget: Gas,
    /// Not processable before this time
    pub timelock: Option<Timestamp>,
    /// Not processable from this time on
    pub expiration: Option<Timestamp>,
}

impl OnLedgerRequest {
    /// New request with empty params, assets and allowance
    pub fn new(id: RequestId, target: CallTarget) -> Self {
        Self {
            id,
            sender: None,
            target,
            params: Dict::new(),
            assets: Assets::new(),
            allowance: Assets::new(),
            gas_budget: DEFAULT_GAS_BUDGET,
            timelock: None,
            expiration: None,
        }
    }

    /// Builder: sender
    pub fn with_sender(mut self, sender: AgentId) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Builder: params
    pub fn with_params(mut self, params: Dict) -> Self {
        self.params = params;
        self
    }

    /// Builder: attached assets
    pub fn with_assets(mut self, assets: Assets) -> Self {
        self.assets = assets;
        self
    }

    /// Builder: allowance
    pub fn with_allowance(mut self, allowance: Assets) -> Self {
        self.allowance = allowance;
        self
    }

    /// Builder: gas budget
    pub fn with_gas_budget(mut self, gas_budget: Gas) -> Self {
        self.gas_budget = gas_budget;
        self
    }

    /// Builder: timelock
    pub fn with_timelock(mut self, timelock: Timestamp) -> Self {
        self.timelock = Some(timelock);
        self
    }

    /// Builder: expiration
    pub fn with_expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// A timelock at or after the expiration can never be satisfied
    pub fn is_never_processable(&self) -> bool {
        matches!((self.timelock, self.expiration), (Some(t), Some(e)) if t >= e)
    }

    /// Whether the request is expired at `now`
    pub fn is_expired(&self, now: Timestamp) -> bool {
        matches!(self.expiration, Some(e) if e <= now)
    }

    /// Whether the timelock has passed at `now`
    pub fn is_unlocked(&self, now: Timestamp) -> bool {
        self.timelock.map_or(true, |t| t <= now)
    }
}

/// Request sent directly to the chain, authenticated by a signature
#[derive(Clone, Debug)]
pub struct OffLedgerRequest {
    /// Chain the request is meant for
    pub chain_id: ChainId,
    /// Call target
    pub target: CallTarget,
    /// Call parameters
    pub params: Dict,
    /// Assets the sender allows the target to take from its account
    pub allowance: Assets,
    /// Gas budget
    pub gas_budget: Gas,
    /// Sender nonce; must equal the sender's next expected nonce
    pub nonce: Nonce,
    /// Compressed SEC1 public key of the sender
    pub public_key: Vec<u8>,
    /// Signature over [`OffLedgerRequest::essence_hash`]
    pub signature: Option<Signature>,
}

impl OffLedgerRequest {
    /// New unsigned request
    pub fn new(chain_id: ChainId, target: CallTarget, params: Dict, nonce: Nonce) -> Self {
        Self {
            chain_id,
            target,
            params,
            allowance: Assets::new(),
            gas_budget: DEFAULT_GAS_BUDGET,
            nonce,
            public_key: Vec::new(),
            signature: None,
        }
    }

    /// Builder: allowance
    pub fn with_allowance(mut self, allowance: Assets) -> Self {
        self.allowance = allowance;
        self
    }

    /// Builder: gas budget
    pub fn with_gas_budget(mut self, gas_budget: Gas) -> Self {
        self.gas_budget = gas_budget;
        self
    }

    /// Sign with `key`
    pub fn sign(mut self, key: &KeyPair) -> Result<Self, CryptoError> {
        self.public_key = key.public_key_bytes();
        self.signature = Some(key.sign(&self.essence_hash())?);
        Ok(self)
    }

    fn essence(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(8);
        s.append(&self.chain_id);
        s.append(&self.target.contract);
        s.append(&self.target.entry_point);
        s.append(&self.params);
        s.append(&self.allowance);
        s.append(&self.gas_budget);
        s.append(&self.nonce);
        s.append(&self.public_key);
        s.out().to_vec()
    }

    /// Hash of everything the signature covers
    pub fn essence_hash(&self) -> H256 {
        keccak256(&self.essence())
    }

    /// Request ID: hash of the essence and the signature
    pub fn id(&self) -> RequestId {
        let essence = self.essence();
        let sig: &[u8] = match &self.signature {
            Some(sig) => sig.as_bytes(),
            None => &[],
        };
        RequestId::new(keccak256_concat([essence.as_slice(), sig]), 0)
    }

    /// L1 address of the signer, if the public key parses
    pub fn sender_address(&self) -> Option<Address> {
        public_key_from_bytes(&self.public_key)
            .ok()
            .map(|pk| public_key_to_address(&pk))
    }

    /// Whether the request carries a valid signature by its public key
    pub fn verify_signature(&self) -> bool {
        let (Some(sig), Ok(pk)) = (&self.signature, public_key_from_bytes(&self.public_key))
        else {
            return false;
        };
        verify(&self.essence_hash(), sig, &pk)
    }
}

/// A request of either kind
#[derive(Clone, Debug)]
pub enum Request {
    /// Carried by an L1 output
    OnLedger(OnLedgerRequest),
    /// Sent directly to the chain
    OffLedger(OffLedgerRequest),
}

impl Request {
    /// Request ID
    pub fn id(&self) -> RequestId {
        match self {
            Request::OnLedger(r) => r.id,
            Request::OffLedger(r) => r.id(),
        }
    }

    /// Whether off-ledger
    pub fn is_off_ledger(&self) -> bool {
        matches!(self, Request::OffLedger(_))
    }

    /// Sender agent, if known
    pub fn sender(&self) -> Option<AgentId> {
        match self {
            Request::OnLedger(r) => r.sender.clone(),
            Request::OffLedger(r) => r.sender_address().map(AgentId::Address),
        }
    }

    /// Call target
    pub fn target(&self) -> CallTarget {
        match self {
            Request::OnLedger(r) => r.target,
            Request::OffLedger(r) => r.target,
        }
    }

    /// Call parameters
    pub fn params(&self) -> &Dict {
        match self {
            Request::OnLedger(r) => &r.params,
            Request::OffLedger(r) => &r.params,
        }
    }

    /// Attached assets; off-ledger requests carry none
    pub fn assets(&self) -> Option<&Assets> {
        match self {
            Request::OnLedger(r) => Some(&r.assets),
            Request::OffLedger(_) => None,
        }
    }

    /// Allowance
    pub fn allowance(&self) -> &Assets {
        match self {
            Request::OnLedger(r) => &r.allowance,
            Request::OffLedger(r) => &r.allowance,
        }
    }

    /// Gas budget
    pub fn gas_budget(&self) -> Gas {
        match self {
            Request::OnLedger(r) => r.gas_budget,
            Request::OffLedger(r) => r.gas_budget,
        }
    }

    /// Nonce of an off-ledger request
    pub fn nonce(&self) -> Option<Nonce> {
        match self {
            Request::OnLedger(_) => None,
            Request::OffLedger(r) => Some(r.nonce),
        }
    }

    /// The on-ledger variant
    pub fn as_on_ledger(&self) -> Option<&OnLedgerRequest> {
        match self {
            Request::OnLedger(r) => Some(r),
            Request::OffLedger(_) => None,
        }
    }

    /// The off-ledger variant
    pub fn as_off_ledger(&self) -> Option<&OffLedgerRequest> {
        match self {
            Request::OnLedger(_) => None,
            Request::OffLedger(r) => Some(r),
        }
    }
}

impl From<OnLedgerRequest> for Request {
    fn from(r: OnLedgerRequest) -> Self {
        Request::OnLedger(r)
    }
}

impl From<OffLedgerRequest> for Request {
    fn from(r: OffLedgerRequest) -> Self {
        Request::OffLedger(r)
    }
}
