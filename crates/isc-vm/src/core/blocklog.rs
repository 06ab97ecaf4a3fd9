//! `blocklog`: block summaries and request receipts.
//!
//! State layout:
//! - map `b`: block index → [`BlockInfo`]
//! - map `r`: block index ‖ request index → [`RequestReceipt`]
//! - map `l`: request ID → block index ‖ request index
//! - `i`: latest block index

use crate::processors::ContractInterface;
use crate::sandbox::Sandbox;
use isc_storage::{KvReader, KvWriter, Map, MapReader};
use isc_types::codec;
use isc_types::{BlockIndex, BlockInfo, Dict, RequestId, RequestReceipt, VmError};

core_contract_name!("blocklog");

/// `getBlockInfo`: [`PARAM_BLOCK_INDEX`] → [`PARAM_BLOCK_INFO`]
pub const VIEW_GET_BLOCK_INFO: &str = "getBlockInfo";
/// `getLatestBlockInfo` → [`PARAM_BLOCK_INDEX`], [`PARAM_BLOCK_INFO`]
pub const VIEW_GET_LATEST_BLOCK_INFO: &str = "getLatestBlockInfo";
/// `getRequestReceipt`: [`PARAM_REQUEST_ID`] → [`PARAM_RECEIPT`]
pub const VIEW_GET_REQUEST_RECEIPT: &str = "getRequestReceipt";
/// `getRequestReceiptsForBlock`: [`PARAM_BLOCK_INDEX`] → [`PARAM_RECEIPTS`]
pub const VIEW_GET_REQUEST_RECEIPTS_FOR_BLOCK: &str = "getRequestReceiptsForBlock";
/// `isRequestProcessed`: [`PARAM_REQUEST_ID`] → [`PARAM_PROCESSED`]
pub const VIEW_IS_REQUEST_PROCESSED: &str = "isRequestProcessed";
/// `getEventsForRequest`: [`PARAM_REQUEST_ID`] → [`PARAM_EVENTS`]
pub const VIEW_GET_EVENTS_FOR_REQUEST: &str = "getEventsForRequest";

/// Block index
pub const PARAM_BLOCK_INDEX: &str = "n";
/// Block info
pub const PARAM_BLOCK_INFO: &str = "i";
/// Request ID
pub const PARAM_REQUEST_ID: &str = "u";
/// A receipt
pub const PARAM_RECEIPT: &str = "r";
/// List of receipts
pub const PARAM_RECEIPTS: &str = "rs";
/// Whether a request was processed
pub const PARAM_PROCESSED: &str = "p";
/// List of events
pub const PARAM_EVENTS: &str = "e";

const KEY_BLOCKS: &[u8] = b"b";
const KEY_RECEIPTS: &[u8] = b"r";
const KEY_LOOKUP: &[u8] = b"l";
const KEY_LATEST: &[u8] = b"i";

fn receipt_key(block_index: BlockIndex, request_index: u16) -> [u8; 6] {
    let mut key = [0u8; 6];
    key[..4].copy_from_slice(&block_index.to_be_bytes());
    key[4..].copy_from_slice(&request_index.to_be_bytes());
    key
}

/// Index of the latest block; `None` before genesis
pub fn latest_block_index(state: &dyn KvReader) -> Option<BlockIndex> {
    state
        .get(KEY_LATEST)
        .and_then(|b| codec::u32_from_be_key(&b).ok())
}

/// Store a block summary and make it the latest block
pub fn save_block_info(state: &mut dyn KvWriter, info: &BlockInfo) {
    Map::new(&mut *state, KEY_BLOCKS)
        .set_at(&codec::u32_be_key(info.block_index), codec::encode(info));
    state.set(KEY_LATEST, codec::u32_be_key(info.block_index).to_vec());
}

/// Summary of block `index`
pub fn get_block_info(state: &dyn KvReader, index: BlockIndex) -> Option<BlockInfo> {
    MapReader::new(state, KEY_BLOCKS)
        .get_at(&codec::u32_be_key(index))
        .and_then(|b| codec::decode(&b).ok())
}

/// Store a receipt and index it by request ID
pub fn save_receipt(state: &mut dyn KvWriter, receipt: &RequestReceipt) {
    let key = receipt_key(receipt.block_index, receipt.request_index);
    Map::new(&mut *state, KEY_RECEIPTS).set_at(&key, codec::encode(receipt));
    Map::new(state, KEY_LOOKUP).set_at(&receipt.request_id.to_bytes(), key.to_vec());
}

/// Whether a receipt exists for `id`
pub fn is_request_processed(state: &dyn KvReader, id: &RequestId) -> bool {
    MapReader::new(state, KEY_LOOKUP).has_at(&id.to_bytes())
}

/// Receipt of request `id`
pub fn get_receipt(state: &dyn KvReader, id: &RequestId) -> Option<RequestReceipt> {
    let key = MapReader::new(state, KEY_LOOKUP).get_at(&id.to_bytes())?;
    MapReader::new(state, KEY_RECEIPTS)
        .get_at(&key)
        .and_then(|b| codec::decode(&b).ok())
}

/// Receipts of block `index`, in processing order
pub fn receipts_for_block(state: &dyn KvReader, index: BlockIndex) -> Vec<RequestReceipt> {
    let Some(info) = get_block_info(state, index) else {
        return Vec::new();
    };
    let receipts = MapReader::new(state, KEY_RECEIPTS);
    (0..info.total_requests)
        .filter_map(|i| receipts.get_at(&receipt_key(index, i)))
        .filter_map(|b| codec::decode(&b).ok())
        .collect()
}

fn block_index_param(ctx: &dyn Sandbox) -> Result<BlockIndex, VmError> {
    match ctx.params().get_value::<BlockIndex>(PARAM_BLOCK_INDEX)? {
        Some(index) => Ok(index),
        None => latest_block_index(&ctx.state_reader())
            .ok_or_else(|| VmError::not_found("chain has no blocks")),
    }
}

fn view_block_info(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let index = block_index_param(ctx)?;
    let info = get_block_info(&ctx.state_reader(), index)
        .ok_or_else(|| VmError::not_found(format!("block {index} not found")))?;
    Ok(Dict::new()
        .with_value(PARAM_BLOCK_INDEX, &index)
        .with_value(PARAM_BLOCK_INFO, &info))
}

fn view_latest_block_info(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let index = latest_block_index(&ctx.state_reader())
        .ok_or_else(|| VmError::not_found("chain has no blocks"))?;
    let info = get_block_info(&ctx.state_reader(), index)
        .ok_or_else(|| VmError::not_found(format!("block {index} not found")))?;
    Ok(Dict::new()
        .with_value(PARAM_BLOCK_INDEX, &index)
        .with_value(PARAM_BLOCK_INFO, &info))
}

fn view_request_receipt(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let id: RequestId = ctx.params().require(PARAM_REQUEST_ID)?;
    let receipt = get_receipt(&ctx.state_reader(), &id)
        .ok_or_else(|| VmError::not_found(format!("no receipt for request {id}")))?;
    Ok(Dict::new().with_value(PARAM_RECEIPT, &receipt))
}

fn view_receipts_for_block(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let index = block_index_param(ctx)?;
    let receipts = receipts_for_block(&ctx.state_reader(), index);
    Ok(Dict::new()
        .with_value(PARAM_BLOCK_INDEX, &index)
        .with(PARAM_RECEIPTS, codec::encode_list(&receipts)))
}

fn view_is_request_processed(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let id: RequestId = ctx.params().require(PARAM_REQUEST_ID)?;
    let processed = is_request_processed(&ctx.state_reader(), &id);
    Ok(Dict::new().with_value(PARAM_PROCESSED, &processed))
}

fn view_events_for_request(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let id: RequestId = ctx.params().require(PARAM_REQUEST_ID)?;
    let events = get_receipt(&ctx.state_reader(), &id)
        .map(|r| r.events)
        .unwrap_or_default();
    Ok(Dict::new().with(PARAM_EVENTS, codec::encode_list(&events)))
}

/// Contract interface
pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, "Block log")
        .view(VIEW_GET_BLOCK_INFO, view_block_info)
        .view(VIEW_GET_LATEST_BLOCK_INFO, view_latest_block_info)
        .view(VIEW_GET_REQUEST_RECEIPT, view_request_receipt)
        .view(VIEW_GET_REQUEST_RECEIPTS_FOR_BLOCK, view_receipts_for_block)
        .view(VIEW_IS_REQUEST_PROCESSED, view_is_request_processed)
        .view(VIEW_GET_EVENTS_FOR_REQUEST, view_events_for_request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_storage::StateSnapshot;
    use isc_types::{Event, Hname, H256};

    fn receipt(block: BlockIndex, index: u16, n: u8) -> RequestReceipt {
        RequestReceipt {
            request_id: RequestId::new(H256::from_bytes([n; 32]), 0),
            block_index: block,
            request_index: index,
            gas_budget: 1_000,
            gas_burned: 100,
            gas_fee_charged: 1,
            error: None,
            events: vec![Event::new(Hname(7), "t", vec![n])],
        }
    }

    #[test]
    fn test_latest_block() {
        let mut state = StateSnapshot::new();
        assert_eq!(latest_block_index(&state), None);
        for i in 0..3 {
            save_block_info(
                &mut state,
                &BlockInfo {
                    block_index: i,
                    ..BlockInfo::default()
                },
            );
        }
        assert_eq!(latest_block_index(&state), Some(2));
        assert_eq!(get_block_info(&state, 1).unwrap().block_index, 1);
        assert!(get_block_info(&state, 3).is_none());
    }

    #[test]
    fn test_receipts_lookup() {
        let mut state = StateSnapshot::new();
        let r0 = receipt(1, 0, 10);
        let r1 = receipt(1, 1, 11);
        save_receipt(&mut state, &r0);
        save_receipt(&mut state, &r1);
        save_block_info(
            &mut state,
            &BlockInfo {
                block_index: 1,
                total_requests: 2,
                ..BlockInfo::default()
            },
        );

        assert!(is_request_processed(&state, &r1.request_id));
        assert!(!is_request_processed(&state, &receipt(1, 2, 12).request_id));
        assert_eq!(get_receipt(&state, &r0.request_id), Some(r0.clone()));
        assert_eq!(receipts_for_block(&state, 1), vec![r0, r1]);
        assert!(receipts_for_block(&state, 5).is_empty());
    }
}
