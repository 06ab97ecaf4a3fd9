//! Chain and agent identities

use crate::codec::{CodecError, Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::Hname;
use isc_primitives::{Address, H256};
use std::fmt;

/// Identity of a chain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainId(pub H256);

impl ChainId {
    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        ChainId(H256::from_bytes(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0.short())
    }
}

impl Encodable for ChainId {
    fn rlp_append(&self, s: &mut RlpStream) {
        self.0.rlp_append(s);
    }
}

impl Decodable for ChainId {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(ChainId(H256::decode(rlp)?))
    }
}

const KIND_NIL: u8 = 0;
const KIND_ADDRESS: u8 = 1;
const KIND_CONTRACT: u8 = 2;
const KIND_ETHEREUM: u8 = 3;

/// Owner of an on-chain account
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentId {
    /// Nobody; used as the caller of view calls issued from outside the chain
    Nil,
    /// L1 address
    Address(Address),
    /// Contract deployed on a chain
    Contract {
        /// Chain the contract lives on
        chain_id: ChainId,
        /// Contract hname
        hname: Hname,
    },
    /// Ethereum-style account on L2
    Ethereum(Address),
}

impl AgentId {
    /// Agent of a contract
    pub fn contract(chain_id: ChainId, hname: Hname) -> Self {
        AgentId::Contract { chain_id, hname }
    }

    /// L1 address, for address agents
    pub fn address(&self) -> Option<Address> {
        match self {
            AgentId::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Whether this is an L1 address agent
    pub fn is_address(&self) -> bool {
        matches!(self, AgentId::Address(_))
    }

    /// Whether this is [`AgentId::Nil`]
    pub fn is_nil(&self) -> bool {
        matches!(self, AgentId::Nil)
    }

    /// Canonical byte form; also used as an account key in state
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(37);
        match self {
            AgentId::Nil => out.push(KIND_NIL),
            AgentId::Address(a) => {
                out.push(KIND_ADDRESS);
                out.extend_from_slice(a.as_bytes());
            }
            AgentId::Contract { chain_id, hname } => {
                out.push(KIND_CONTRACT);
                out.extend_from_slice(chain_id.as_bytes());
                out.extend_from_slice(&hname.to_bytes());
            }
            AgentId::Ethereum(a) => {
                out.push(KIND_ETHEREUM);
                out.extend_from_slice(a.as_bytes());
            }
        }
        out
    }

    /// Parse the byte form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let invalid = |reason: &str| CodecError::InvalidValue {
            key: "agent_id".to_string(),
            reason: reason.to_string(),
        };
        let (kind, rest) = bytes.split_first().ok_or_else(|| invalid("empty"))?;
        match (*kind, rest.len()) {
            (KIND_NIL, 0) => Ok(AgentId::Nil),
            (KIND_ADDRESS, 20) => Address::from_slice(rest)
                .map(AgentId::Address)
                .map_err(|e| invalid(&e.to_string())),
            (KIND_CONTRACT, 36) => {
                let chain = H256::from_slice(&rest[..32]).map_err(|e| invalid(&e.to_string()))?;
                let hname = Hname::from_bytes(&rest[32..]).ok_or_else(|| invalid("hname"))?;
                Ok(AgentId::Contract { chain_id: ChainId(chain), hname })
            }
            (KIND_ETHEREUM, 20) => Address::from_slice(rest)
                .map(AgentId::Ethereum)
                .map_err(|e| invalid(&e.to_string())),
            (kind, len) => Err(invalid(&format!("kind {kind} with {len} payload bytes"))),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Nil => f.write_str("nil"),
            AgentId::Address(a) => write!(f, "{a}"),
            AgentId::Contract { chain_id, hname } => write!(f, "{hname}@{}", chain_id.0.short()),
            AgentId::Ethereum(a) => write!(f, "eth:{a}"),
        }
    }
}

impl fmt::Debug for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgentId({self})")
    }
}

impl Encodable for AgentId {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.encoder().encode_value(&self.to_bytes());
    }
}

impl Decodable for AgentId {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.decoder().decode_value(|bytes| {
            AgentId::from_bytes(bytes).map_err(|_| DecoderError::Custom("invalid agent id"))
        })
    }
}
