//! `blob`: content-addressed store of immutable field sets.
//!
//! State layout (inside the contract partition):
//! - map `r`: blob hash → total size
//! - map `s ‖ hash`: field name → field size
//! - `v ‖ hash ‖ field`: field value

use crate::gas::BurnCode;
use crate::processors::ContractInterface;
use crate::sandbox::Sandbox;
use isc_crypto::keccak256;
use isc_storage::{KvReader, KvWriter, Map, MapReader, SubRealmReader};
use isc_types::codec;
use isc_types::{Dict, VmError, H256};
use std::collections::BTreeMap;

core_contract_name!("blob");

/// `storeBlob`: params are the blob fields; returns [`PARAM_HASH`]
pub const FUNC_STORE_BLOB: &str = "storeBlob";
/// `getBlobField`: [`PARAM_HASH`], [`PARAM_FIELD`] → [`PARAM_BYTES`]
pub const VIEW_GET_BLOB_FIELD: &str = "getBlobField";
/// `getBlobInfo`: [`PARAM_HASH`] → field name → size
pub const VIEW_GET_BLOB_INFO: &str = "getBlobInfo";
/// `listBlobs`: hex hash → total size
pub const VIEW_LIST_BLOBS: &str = "listBlobs";

/// Blob hash
pub const PARAM_HASH: &str = "hash";
/// Field name
pub const PARAM_FIELD: &str = "field";
/// Field value
pub const PARAM_BYTES: &str = "bytes";

/// Event topic for a newly stored blob
pub const EVENT_STORE: &str = "store";

const KEY_REGISTRY: &[u8] = b"r";
const PREFIX_SIZES: &[u8] = b"s";
const PREFIX_VALUES: &[u8] = b"v";

fn value_key(hash: &H256, field: &str) -> Vec<u8> {
    let mut key = PREFIX_VALUES.to_vec();
    key.extend_from_slice(hash.as_bytes());
    key.extend_from_slice(field.as_bytes());
    key
}

fn sizes_name(hash: &H256) -> Vec<u8> {
    let mut name = PREFIX_SIZES.to_vec();
    name.extend_from_slice(hash.as_bytes());
    name
}

/// Hash of a field set: `value ‖ name` of every field, in name order,
/// concatenated and hashed. Insertion order does not matter.
pub fn blob_hash(fields: &Dict) -> H256 {
    let mut stream = Vec::new();
    for (name, value) in fields.iter() {
        stream.extend_from_slice(value);
        stream.extend_from_slice(name.as_bytes());
    }
    keccak256(&stream)
}

/// Blob partition of the full chain state
pub fn partition(state: &dyn KvReader) -> SubRealmReader<'_> {
    super::partition(state, hname())
}

/// Value of `field` of blob `hash`
pub fn get_field<K: KvReader + ?Sized>(blobs: &K, hash: &H256, field: &str) -> Option<Vec<u8>> {
    blobs.get(&value_key(hash, field))
}

/// Whether blob `hash` is stored
pub fn has_blob(blobs: &dyn KvReader, hash: &H256) -> bool {
    MapReader::new(blobs, KEY_REGISTRY).has_at(hash.as_bytes())
}

/// Field sizes of blob `hash`
pub fn blob_info(blobs: &dyn KvReader, hash: &H256) -> Option<BTreeMap<String, u32>> {
    if !has_blob(blobs, hash) {
        return None;
    }
    let mut info = BTreeMap::new();
    MapReader::new(blobs, sizes_name(hash)).iterate(&mut |k, v| {
        if let (Ok(name), Ok(size)) = (std::str::from_utf8(k), codec::decode::<u32>(v)) {
            info.insert(name.to_string(), size);
        }
        true
    });
    Some(info)
}

/// All blobs with their total size
pub fn list_blobs(blobs: &dyn KvReader) -> BTreeMap<H256, u64> {
    let mut out = BTreeMap::new();
    MapReader::new(blobs, KEY_REGISTRY).iterate(&mut |k, v| {
        if let (Ok(hash), Ok(size)) = (H256::from_slice(k), codec::decode::<u64>(v)) {
            out.insert(hash, size);
        }
        true
    });
    out
}

/// Write blob `hash` with `fields`; returns the total size
pub fn put_blob(blobs: &mut dyn KvWriter, hash: &H256, fields: &Dict) -> u64 {
    let mut total = 0u64;
    for (name, value) in fields.iter() {
        blobs.set(&value_key(hash, name), value.to_vec());
        Map::new(&mut *blobs, sizes_name(hash))
            .set_at(name.as_bytes(), codec::encode(&(value.len() as u32)));
        total += value.len() as u64;
    }
    Map::new(blobs, KEY_REGISTRY).set_at(hash.as_bytes(), codec::encode(&total));
    total
}

fn store_blob(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let fields = ctx.params().clone();
    if fields.is_empty() {
        return Err(VmError::invalid_params("blob has no fields"));
    }
    let hash = blob_hash(&fields);
    let result = Dict::new().with_value(PARAM_HASH, &hash);
    if has_blob(&ctx.state_reader(), &hash) {
        return Ok(result);
    }

    let size: usize = fields.iter().map(|(k, v)| k.len() + v.len()).sum();
    ctx.burn_gas(BurnCode::StoreBlob, size as u64)?;
    let total = put_blob(&mut ctx.state(), &hash, &fields);
    ctx.log(&format!("stored blob {} ({} bytes)", hash.short(), total));
    ctx.event(EVENT_STORE, hash.as_bytes().to_vec())?;
    Ok(result)
}

fn get_blob_field(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let hash: H256 = ctx.params().require(PARAM_HASH)?;
    let field: String = ctx.params().require(PARAM_FIELD)?;
    let bytes = get_field(&ctx.state_reader(), &hash, &field).ok_or_else(|| {
        VmError::not_found(format!("blob {} has no field '{}'", hash.short(), field))
    })?;
    Ok(Dict::new().with(PARAM_BYTES, bytes))
}

fn get_blob_info(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    let hash: H256 = ctx.params().require(PARAM_HASH)?;
    let info = blob_info(&ctx.state_reader(), &hash)
        .ok_or_else(|| VmError::not_found(format!("blob {} not found", hash.short())))?;
    Ok(info
        .into_iter()
        .map(|(name, size)| (name, codec::encode(&size)))
        .collect())
}

fn view_list_blobs(ctx: &mut dyn Sandbox) -> Result<Dict, VmError> {
    Ok(list_blobs(&ctx.state_reader())
        .into_iter()
        .map(|(hash, size)| (hash.to_hex(), codec::encode(&size)))
        .collect())
}

/// Contract interface
pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, "Content-addressed blob store")
        .func(FUNC_STORE_BLOB, store_blob)
        .view(VIEW_GET_BLOB_FIELD, get_blob_field)
        .view(VIEW_GET_BLOB_INFO, get_blob_info)
        .view(VIEW_LIST_BLOBS, view_list_blobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::root;
    use crate::processors::{Processor, VmTypeFactory, FIELD_PROGRAM, FIELD_VM_TYPE};
    use crate::test_utils::{agent, TestVm, OWNER};
    use isc_storage::StateSnapshot;
    use isc_types::VmErrorCode;
    use std::sync::Arc;

    fn fields(pairs: &[(&str, &str)]) -> Dict {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    // ==================== Hashing ====================

    #[test]
    fn test_hash_ignores_insertion_order() {
        let a = Dict::new().with("x", b"1".to_vec()).with("y", b"2".to_vec());
        let b = Dict::new().with("y", b"2".to_vec()).with("x", b"1".to_vec());
        assert_eq!(blob_hash(&a), blob_hash(&b));
    }

    #[test]
    fn test_hash_separates_name_and_value() {
        let a = fields(&[("123", "ab")]);
        let b = fields(&[("123a", "b")]);
        assert_ne!(blob_hash(&a), blob_hash(&b));
    }

    #[test]
    fn test_hash_is_value_then_name_in_name_order() {
        let blob = fields(&[("b", "2"), ("a", "1")]);
        assert_eq!(blob_hash(&blob), keccak256(b"1a2b"));
        assert_eq!(blob_hash(&fields(&[("123", "ab")])), keccak256(b"ab123"));
        assert_eq!(blob_hash(&fields(&[("123a", "b")])), keccak256(b"b123a"));
    }

    #[test]
    fn test_hash_depends_on_values() {
        assert_ne!(
            blob_hash(&fields(&[("p", "1")])),
            blob_hash(&fields(&[("p", "2")]))
        );
    }

    // ==================== Storage ====================

    #[test]
    fn test_put_and_read() {
        let mut state = StateSnapshot::new();
        let blob = fields(&[("v", "echo"), ("p", "program")]);
        let hash = blob_hash(&blob);

        assert!(!has_blob(&state, &hash));
        assert_eq!(put_blob(&mut state, &hash, &blob), 11);
        assert!(has_blob(&state, &hash));
        assert_eq!(get_field(&state, &hash, "p"), Some(b"program".to_vec()));
        assert_eq!(get_field(&state, &hash, "missing"), None);

        let info = blob_info(&state, &hash).unwrap();
        assert_eq!(info.get("v"), Some(&4));
        assert_eq!(info.get("p"), Some(&7));
        assert_eq!(list_blobs(&state).get(&hash), Some(&11));
    }

    #[test]
    fn test_info_of_unknown_blob() {
        let state = StateSnapshot::new();
        assert!(blob_info(&state, &H256::from_bytes([3; 32])).is_none());
        assert!(list_blobs(&state).is_empty());
    }

    // ==================== Contract ====================

    struct EchoFactory;

    impl VmTypeFactory for EchoFactory {
        fn new_processor(&self, program: &[u8]) -> Result<Arc<dyn Processor>, VmError> {
            let answer = program.to_vec();
            let iface = ContractInterface::new("echo", "").view("answer", move |_| {
                Ok(Dict::new().with("answer", answer.clone()))
            });
            Ok(Arc::new(iface))
        }
    }

    fn echo_program() -> Dict {
        fields(&[(FIELD_VM_TYPE, "echo"), (FIELD_PROGRAM, "42")])
    }

    #[test]
    fn test_store_blob_request() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), NAME, FUNC_STORE_BLOB, echo_program());
        let receipt = vm.run_one(req);
        assert!(receipt.is_success());
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(receipt.events[0].topic, EVENT_STORE);

        let hash = blob_hash(&echo_program());
        let out = vm
            .view(
                NAME,
                VIEW_GET_BLOB_FIELD,
                Dict::new()
                    .with_value(PARAM_HASH, &hash)
                    .with_value(PARAM_FIELD, &FIELD_PROGRAM.to_string()),
            )
            .unwrap();
        assert_eq!(out.get(PARAM_BYTES), Some(&b"42"[..]));

        let info = vm
            .view(NAME, VIEW_GET_BLOB_INFO, Dict::new().with_value(PARAM_HASH, &hash))
            .unwrap();
        assert_eq!(info.require::<u32>(FIELD_VM_TYPE).unwrap(), 4);
    }

    #[test]
    fn test_store_blob_twice() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), NAME, FUNC_STORE_BLOB, echo_program());
        let first = vm.run_one(req);
        let req = vm.request(&agent(2), NAME, FUNC_STORE_BLOB, echo_program());
        let second = vm.run_one(req);
        assert!(second.is_success());
        assert!(second.events.is_empty());
        assert!(second.gas_burned <= first.gas_burned);
        assert_eq!(list_blobs(&partition(&vm.snapshot)).len(), 1);
    }

    #[test]
    fn test_store_empty_blob() {
        let mut vm = TestVm::new();
        let req = vm.request(&agent(1), NAME, FUNC_STORE_BLOB, Dict::new());
        let receipt = vm.run_one(req);
        assert_eq!(
            receipt.error.map(|e| e.code),
            Some(VmErrorCode::InvalidParams)
        );
        assert!(list_blobs(&partition(&vm.snapshot)).is_empty());
    }

    #[test]
    fn test_missing_field_view() {
        let vm = TestVm::new();
        let err = vm
            .view(
                NAME,
                VIEW_GET_BLOB_FIELD,
                Dict::new()
                    .with_value(PARAM_HASH, &H256::from_bytes([3; 32]))
                    .with_value(PARAM_FIELD, &"p".to_string()),
            )
            .unwrap_err();
        assert_eq!(err.code, VmErrorCode::NotFound);
    }

    #[test]
    fn test_deploy_program_from_blob() {
        let mut vm = TestVm::new();
        vm.processors.register_vm_type("echo", Arc::new(EchoFactory));
        let req = vm.request(&OWNER, NAME, FUNC_STORE_BLOB, echo_program());
        assert!(vm.run_one(req).is_success());

        let params = Dict::new()
            .with_value(root::PARAM_NAME, &"echo".to_string())
            .with_value(root::PARAM_PROGRAM_HASH, &blob_hash(&echo_program()));
        let req = vm.request(&OWNER, root::NAME, root::FUNC_DEPLOY_CONTRACT, params);
        assert!(vm.run_one(req).is_success());

        let out = vm.view("echo", "answer", Dict::new()).unwrap();
        assert_eq!(out.get("answer"), Some(&b"42"[..]));
    }
}
