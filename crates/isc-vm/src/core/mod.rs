//! Core contracts, deployed on every chain at genesis.
//!
//! Each contract keeps its state in the partition prefixed with its
//! hname. The VM reads and writes some of these partitions directly
//! (accounts for fees and transfers, blocklog for receipts, root for the
//! registry, governance for the fee policy).

use crate::processors::ContractInterface;
use isc_storage::{KvReader, KvWriter, SubRealm, SubRealmReader};
use isc_types::Hname;

/// Define `NAME` and a cached `hname()` for a core contract
macro_rules! core_contract_name {
    ($name:literal) => {
        /// Contract name
        pub const NAME: &str = $name;

        /// Contract hname
        pub fn hname() -> isc_types::Hname {
            static HNAME: std::sync::OnceLock<isc_types::Hname> = std::sync::OnceLock::new();
            *HNAME.get_or_init(|| isc_types::hn(NAME))
        }
    };
}

pub mod accounts;
pub mod blob;
pub mod blocklog;
pub mod governance;
pub mod root;

/// Core contracts in registration order
pub fn core_contracts() -> Vec<ContractInterface> {
    vec![
        root::interface(),
        blob::interface(),
        accounts::interface(),
        governance::interface(),
        blocklog::interface(),
    ]
}

/// Whether `contract` is one of the core contracts
pub fn is_core_contract(contract: Hname) -> bool {
    [
        root::hname(),
        blob::hname(),
        accounts::hname(),
        governance::hname(),
        blocklog::hname(),
    ]
    .contains(&contract)
}

/// Read-only partition of `contract` in the full chain state
pub fn partition(state: &dyn KvReader, contract: Hname) -> SubRealmReader<'_> {
    SubRealmReader::new(state, contract.to_bytes().to_vec())
}

/// Writable partition of `contract` in the full chain state
pub fn partition_mut(state: &mut dyn KvWriter, contract: Hname) -> SubRealm<'_> {
    SubRealm::new(state, contract.to_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_types::hn;

    #[test]
    fn test_core_contract_order() {
        let names: Vec<String> = core_contracts().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["root", "blob", "accounts", "governance", "blocklog"]);
    }

    #[test]
    fn test_is_core_contract() {
        assert!(is_core_contract(hn("accounts")));
        assert!(!is_core_contract(hn("counter")));
        assert_eq!(root::hname(), hn(root::NAME));
    }
}
