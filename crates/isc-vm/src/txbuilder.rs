//! Anchor transaction essence built up while a batch runs.
//!
//! The L1 transaction format is opaque to the VM: the essence only records
//! which on-ledger requests were consumed and which assets leave the chain
//! to which L1 address.

use isc_crypto::keccak256;
use isc_types::codec::{self, Encodable, RlpStream};
use isc_types::{Address, Assets, RequestId, H256};

/// Assets sent to an L1 address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L1Output {
    /// Receiver
    pub target: Address,
    /// Assets sent
    pub assets: Assets,
}

impl Encodable for L1Output {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.target);
        s.append(&self.assets);
    }
}

/// Result of a batch as seen by L1
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionEssence {
    /// On-ledger requests consumed, in processing order
    pub consumed: Vec<RequestId>,
    /// Outputs created
    pub outputs: Vec<L1Output>,
}

impl TransactionEssence {
    /// Hash identifying the essence
    pub fn hash(&self) -> H256 {
        keccak256(&codec::encode(self))
    }
}

impl Encodable for TransactionEssence {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append_list::<RequestId, RequestId>(&self.consumed);
        s.append_list::<L1Output, L1Output>(&self.outputs);
    }
}

/// Position in a [`TxBuilder`] to roll back to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxCheckpoint {
    consumed: usize,
    outputs: usize,
}

/// Accumulates the essence of a batch
#[derive(Debug, Default)]
pub struct TxBuilder {
    essence: TransactionEssence,
}

impl TxBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a consumed on-ledger request
    pub fn consume(&mut self, id: RequestId) {
        self.essence.consumed.push(id);
    }

    /// Add an output
    pub fn add_output(&mut self, target: Address, assets: Assets) {
        self.essence.outputs.push(L1Output { target, assets });
    }

    /// Current position
    pub fn checkpoint(&self) -> TxCheckpoint {
        TxCheckpoint {
            consumed: self.essence.consumed.len(),
            outputs: self.essence.outputs.len(),
        }
    }

    /// Drop everything added after `cp`
    pub fn restore(&mut self, cp: TxCheckpoint) {
        self.essence.consumed.truncate(cp.consumed);
        self.essence.outputs.truncate(cp.outputs);
    }

    /// Outputs added so far
    pub fn outputs(&self) -> &[L1Output] {
        &self.essence.outputs
    }

    /// Finish
    pub fn into_essence(self) -> TransactionEssence {
        self.essence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u8) -> RequestId {
        RequestId::new(H256::from_bytes([n; 32]), 0)
    }

    #[test]
    fn test_restore_drops_later_entries() {
        let mut tx = TxBuilder::new();
        tx.consume(rid(1));
        let cp = tx.checkpoint();
        tx.consume(rid(2));
        tx.add_output(Address::from_bytes([7; 20]), Assets::from_base_tokens(5));
        tx.restore(cp);

        let essence = tx.into_essence();
        assert_eq!(essence.consumed, vec![rid(1)]);
        assert!(essence.outputs.is_empty());
    }

    #[test]
    fn test_hash_depends_on_outputs() {
        let mut a = TxBuilder::new();
        a.consume(rid(1));
        let mut b = TxBuilder::new();
        b.consume(rid(1));
        b.add_output(Address::from_bytes([7; 20]), Assets::from_base_tokens(1));
        assert_ne!(a.into_essence().hash(), b.into_essence().hash());
    }
}
