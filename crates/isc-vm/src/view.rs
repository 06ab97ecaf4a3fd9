//! View calls from outside the chain

use crate::context::{TaskEnv, VmContext};
use crate::core::{self as corecontracts, accounts, blocklog};
use crate::processors::ProcessorCache;
use isc_storage::StateSnapshot;
use isc_types::{ChainId, Dict, Hname, VmError};
use std::sync::Arc;

/// Call a view entry point against `snapshot`.
///
/// The caller is [`isc_types::AgentId::Nil`], time is the timestamp of the
/// latest block and gas is capped by the chain's external view limit.
/// Nothing the view does is kept.
pub fn call_view(
    processors: Arc<ProcessorCache>,
    chain_id: ChainId,
    snapshot: &StateSnapshot,
    contract: Hname,
    entry_point: Hname,
    params: Dict,
) -> Result<Dict, VmError> {
    let blocklog_state = corecontracts::partition(snapshot, blocklog::hname());
    let block_index = blocklog::latest_block_index(&blocklog_state).unwrap_or_default();
    let timestamp = blocklog::get_block_info(&blocklog_state, block_index)
        .map(|info| info.timestamp)
        .unwrap_or_default();

    let env = TaskEnv {
        chain_id,
        processors,
        timestamp,
        block_index,
        validator_fee_target: accounts::common_account(chain_id),
    };
    VmContext::new(env, snapshot.clone()).call_view_external(contract, entry_point, params)
}
