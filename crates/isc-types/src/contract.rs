//! Contract registry records

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::{AgentId, Hname};
use isc_primitives::H256;

/// Entry of the root contract's registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractRecord {
    /// Contract name; its hname is the registry key
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Hash of the program blob (or of the native processor)
    pub program_hash: H256,
    /// Agent that deployed the contract
    pub creator: AgentId,
}

impl ContractRecord {
    /// New record
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        program_hash: H256,
        creator: AgentId,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            program_hash,
            creator,
        }
    }

    /// Registry key
    pub fn hname(&self) -> Hname {
        Hname::from_name(&self.name)
    }
}

impl Encodable for ContractRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.name);
        s.append(&self.description);
        s.append(&self.program_hash);
        s.append(&self.creator);
    }
}

impl Decodable for ContractRecord {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(ContractRecord {
            name: rlp.val_at(0)?,
            description: rlp.val_at(1)?,
            program_hash: rlp.val_at(2)?,
            creator: rlp.val_at(3)?,
        })
    }
}
