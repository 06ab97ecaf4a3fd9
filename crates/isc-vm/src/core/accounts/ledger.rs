//! On-chain account ledger.
//!
//! All functions take the accounts contract partition. Base tokens are kept
//! with 18 decimals (the L1 amount times [`FULL_DECIMALS_FACTOR`]) so that
//! amounts below one L1 unit are not lost; native tokens and NFTs are kept
//! as they are.
//!
//! Every credit and debit updates the recorded totals in the same step, so
//! for each token the totals equal the sum over all accounts.
//! [`check_ledger`] verifies that.

use crate::error::LedgerMismatch;
use isc_storage::{KvReader, KvWriter, Map, MapReader};
use isc_types::codec;
use isc_types::{AgentId, Assets, NativeTokenId, NftId, Nonce, H256, U256};
use std::collections::{BTreeMap, BTreeSet};

/// L1 base token amount to full-decimal amount (10^12)
pub const FULL_DECIMALS_FACTOR: u64 = 1_000_000_000_000;

const KEY_ACCOUNTS: &[u8] = b"a";
const PREFIX_BASE: &[u8] = b"b";
const PREFIX_NATIVES: &[u8] = b"n";
const PREFIX_NFTS: &[u8] = b"f";
const KEY_NFT_OWNERS: &[u8] = b"o";
const KEY_TOTAL_BASE: &[u8] = b"tb";
const KEY_TOTAL_NATIVES: &[u8] = b"tn";
const PREFIX_NONCE: &[u8] = b"N";

const PRESENT: &[u8] = &[1];

fn agent_key(prefix: &[u8], agent: &AgentId) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(&agent.to_bytes());
    key
}

fn factor() -> U256 {
    U256::from(FULL_DECIMALS_FACTOR)
}

/// L1 amount to full decimals
pub fn to_full_decimals(base_tokens: u64) -> U256 {
    U256::from(base_tokens) * factor()
}

/// Full decimals to L1 amount, rounding down
pub fn from_full_decimals(amount: U256) -> u64 {
    let l1 = amount / factor();
    if l1 > U256::from(u64::MAX) {
        u64::MAX
    } else {
        l1.as_u64()
    }
}

fn read_u256<K: KvReader + ?Sized>(state: &K, key: &[u8]) -> U256 {
    state
        .get(key)
        .and_then(|b| codec::decode::<U256>(&b).ok())
        .unwrap_or_default()
}

fn write_u256(state: &mut dyn KvWriter, key: &[u8], value: U256) {
    if value.is_zero() {
        state.del(key);
    } else {
        state.set(key, codec::encode(&value));
    }
}

fn decode_u256(bytes: &[u8]) -> U256 {
    codec::decode::<U256>(bytes).unwrap_or_default()
}

fn token_from_key(key: &[u8]) -> Option<NativeTokenId> {
    H256::from_slice(key).ok().map(NativeTokenId)
}

fn nft_from_key(key: &[u8]) -> Option<NftId> {
    H256::from_slice(key).ok().map(NftId)
}

// ==================== Reads ====================

/// Whether `agent` ever received anything
pub fn account_exists(state: &dyn KvReader, agent: &AgentId) -> bool {
    MapReader::new(state, KEY_ACCOUNTS).has_at(&agent.to_bytes())
}

/// All accounts, in byte order of their agent IDs
pub fn all_accounts(state: &dyn KvReader) -> Vec<AgentId> {
    MapReader::new(state, KEY_ACCOUNTS)
        .keys()
        .iter()
        .filter_map(|k| AgentId::from_bytes(k).ok())
        .collect()
}

/// Base token balance, full decimals
pub fn get_base_full_decimals(state: &dyn KvReader, agent: &AgentId) -> U256 {
    read_u256(state, &agent_key(PREFIX_BASE, agent))
}

/// Base token balance, L1 units
pub fn get_base_tokens(state: &dyn KvReader, agent: &AgentId) -> u64 {
    from_full_decimals(get_base_full_decimals(state, agent))
}

/// Native token balances
pub fn get_native_tokens(state: &dyn KvReader, agent: &AgentId) -> BTreeMap<NativeTokenId, U256> {
    let mut out = BTreeMap::new();
    MapReader::new(state, agent_key(PREFIX_NATIVES, agent)).iterate(&mut |k, v| {
        if let Some(id) = token_from_key(k) {
            out.insert(id, decode_u256(v));
        }
        true
    });
    out
}

/// Balance of one native token
pub fn get_native_token(state: &dyn KvReader, agent: &AgentId, id: &NativeTokenId) -> U256 {
    MapReader::new(state, agent_key(PREFIX_NATIVES, agent))
        .get_at(id.0.as_bytes())
        .map(|v| decode_u256(&v))
        .unwrap_or_default()
}

/// NFTs owned
pub fn get_nfts(state: &dyn KvReader, agent: &AgentId) -> BTreeSet<NftId> {
    MapReader::new(state, agent_key(PREFIX_NFTS, agent))
        .keys()
        .iter()
        .filter_map(|k| nft_from_key(k))
        .collect()
}

/// Owner of an NFT held on chain
pub fn get_nft_owner(state: &dyn KvReader, nft: &NftId) -> Option<AgentId> {
    MapReader::new(state, KEY_NFT_OWNERS)
        .get_at(nft.0.as_bytes())
        .and_then(|b| AgentId::from_bytes(&b).ok())
}

/// Everything held by `agent`; base tokens in L1 units
pub fn get_assets(state: &dyn KvReader, agent: &AgentId) -> Assets {
    Assets {
        base_tokens: get_base_tokens(state, agent),
        native_tokens: get_native_tokens(state, agent),
        nfts: get_nfts(state, agent),
    }
}

/// Recorded base token total, full decimals
pub fn total_base_full_decimals(state: &dyn KvReader) -> U256 {
    read_u256(state, KEY_TOTAL_BASE)
}

/// Recorded native token totals
pub fn total_native_tokens(state: &dyn KvReader) -> BTreeMap<NativeTokenId, U256> {
    let mut out = BTreeMap::new();
    MapReader::new(state, KEY_TOTAL_NATIVES).iterate(&mut |k, v| {
        if let Some(id) = token_from_key(k) {
            out.insert(id, decode_u256(v));
        }
        true
    });
    out
}

/// Recorded totals of fungible tokens plus every NFT on chain
pub fn total_assets(state: &dyn KvReader) -> Assets {
    let mut nfts = BTreeSet::new();
    MapReader::new(state, KEY_NFT_OWNERS).iterate(&mut |k, _| {
        if let Some(nft) = nft_from_key(k) {
            nfts.insert(nft);
        }
        true
    });
    Assets {
        base_tokens: from_full_decimals(total_base_full_decimals(state)),
        native_tokens: total_native_tokens(state),
        nfts,
    }
}

/// Next expected off-ledger nonce of `agent`
pub fn get_nonce(state: &dyn KvReader, agent: &AgentId) -> Nonce {
    state
        .get(&agent_key(PREFIX_NONCE, agent))
        .and_then(|b| codec::decode::<Nonce>(&b).ok())
        .unwrap_or(0)
}

// ==================== Writes ====================

fn touch_account(state: &mut dyn KvWriter, agent: &AgentId) {
    let mut accounts = Map::new(state, KEY_ACCOUNTS);
    let key = agent.to_bytes();
    if !accounts.has_at(&key) {
        accounts.set_at(&key, PRESENT.to_vec());
    }
}

fn add_native(state: &mut dyn KvWriter, map_name: Vec<u8>, id: &NativeTokenId, amount: U256) {
    let mut map = Map::new(state, map_name);
    let have = map.get_at(id.0.as_bytes()).map(|v| decode_u256(&v)).unwrap_or_default();
    map.set_at(id.0.as_bytes(), codec::encode(&have.saturating_add(amount)));
}

fn sub_native(state: &mut dyn KvWriter, map_name: Vec<u8>, id: &NativeTokenId, amount: U256) {
    let mut map = Map::new(state, map_name);
    let have = map.get_at(id.0.as_bytes()).map(|v| decode_u256(&v)).unwrap_or_default();
    let left = have.saturating_sub(amount);
    if left.is_zero() {
        map.del_at(id.0.as_bytes());
    } else {
        map.set_at(id.0.as_bytes(), codec::encode(&left));
    }
}

/// Add a full-decimal base token amount to `agent`
pub fn credit_full_decimals(state: &mut dyn KvWriter, agent: &AgentId, amount: U256) {
    if amount.is_zero() {
        return;
    }
    touch_account(state, agent);
    let key = agent_key(PREFIX_BASE, agent);
    let balance = read_u256(&*state, &key);
    write_u256(state, &key, balance.saturating_add(amount));
    let total = read_u256(&*state, KEY_TOTAL_BASE);
    write_u256(state, KEY_TOTAL_BASE, total.saturating_add(amount));
}

/// Remove a full-decimal base token amount from `agent`; false, changing
/// nothing, if the balance is too low
pub fn debit_full_decimals(state: &mut dyn KvWriter, agent: &AgentId, amount: U256) -> bool {
    let key = agent_key(PREFIX_BASE, agent);
    let balance = read_u256(&*state, &key);
    if balance < amount {
        return false;
    }
    if amount.is_zero() {
        return true;
    }
    write_u256(state, &key, balance - amount);
    let total = read_u256(&*state, KEY_TOTAL_BASE);
    write_u256(state, KEY_TOTAL_BASE, total.saturating_sub(amount));
    true
}

/// Add `assets` to `agent`, creating the account if needed
pub fn credit(state: &mut dyn KvWriter, agent: &AgentId, assets: &Assets) {
    if assets.is_empty() {
        return;
    }
    touch_account(state, agent);
    credit_full_decimals(state, agent, to_full_decimals(assets.base_tokens));
    for (id, amount) in &assets.native_tokens {
        add_native(state, agent_key(PREFIX_NATIVES, agent), id, *amount);
        add_native(state, KEY_TOTAL_NATIVES.to_vec(), id, *amount);
    }
    for nft in &assets.nfts {
        Map::new(&mut *state, agent_key(PREFIX_NFTS, agent)).set_at(nft.0.as_bytes(), PRESENT.to_vec());
        Map::new(&mut *state, KEY_NFT_OWNERS).set_at(nft.0.as_bytes(), agent.to_bytes());
    }
}

fn covers(state: &dyn KvReader, agent: &AgentId, assets: &Assets) -> bool {
    get_base_full_decimals(state, agent) >= to_full_decimals(assets.base_tokens)
        && assets
            .native_tokens
            .iter()
            .all(|(id, amount)| get_native_token(state, agent, id) >= *amount)
        && assets
            .nfts
            .iter()
            .all(|nft| get_nft_owner(state, nft).as_ref() == Some(agent))
}

/// Remove `assets` from `agent`; false, changing nothing, if the account
/// does not hold all of them
pub fn debit(state: &mut dyn KvWriter, agent: &AgentId, assets: &Assets) -> bool {
    if !covers(&state, agent, assets) {
        return false;
    }
    debit_full_decimals(state, agent, to_full_decimals(assets.base_tokens));
    for (id, amount) in &assets.native_tokens {
        sub_native(state, agent_key(PREFIX_NATIVES, agent), id, *amount);
        sub_native(state, KEY_TOTAL_NATIVES.to_vec(), id, *amount);
    }
    for nft in &assets.nfts {
        Map::new(&mut *state, agent_key(PREFIX_NFTS, agent)).del_at(nft.0.as_bytes());
        Map::new(&mut *state, KEY_NFT_OWNERS).del_at(nft.0.as_bytes());
    }
    true
}

/// Move `assets` between accounts; totals are unchanged. False, changing
/// nothing, if `from` does not hold them.
pub fn move_between_accounts(
    state: &mut dyn KvWriter,
    from: &AgentId,
    to: &AgentId,
    assets: &Assets,
) -> bool {
    if from == to {
        return covers(&state, from, assets);
    }
    if !debit(state, from, assets) {
        return false;
    }
    credit(state, to, assets);
    true
}

/// Move a full-decimal base token amount between accounts
pub fn move_full_decimals(
    state: &mut dyn KvWriter,
    from: &AgentId,
    to: &AgentId,
    amount: U256,
) -> bool {
    if !debit_full_decimals(state, from, amount) {
        return false;
    }
    credit_full_decimals(state, to, amount);
    true
}

/// Bump the off-ledger nonce of `agent`
pub fn increment_nonce(state: &mut dyn KvWriter, agent: &AgentId) {
    let next = get_nonce(&state, agent) + 1;
    state.set(&agent_key(PREFIX_NONCE, agent), codec::encode(&next));
}

// ==================== Consistency ====================

/// Compare the recorded totals with the sum over all accounts, and check
/// that every NFT has exactly one owner that lists it
pub fn check_ledger(state: &dyn KvReader) -> Result<(), LedgerMismatch> {
    let accounts = all_accounts(state);

    let mut base_sum = U256::zero();
    let mut native_sums: BTreeMap<NativeTokenId, U256> = BTreeMap::new();
    for agent in &accounts {
        base_sum = base_sum.saturating_add(get_base_full_decimals(state, agent));
        for (id, amount) in get_native_tokens(state, agent) {
            let sum = native_sums.entry(id).or_default();
            *sum = sum.saturating_add(amount);
        }
        for nft in get_nfts(state, agent) {
            match get_nft_owner(state, &nft) {
                Some(owner) if owner == *agent => {}
                Some(owner) => {
                    return Err(LedgerMismatch::Nft {
                        nft: nft.0.to_hex(),
                        reason: format!("listed by {agent}, owned by {owner}"),
                    })
                }
                None => {
                    return Err(LedgerMismatch::Nft {
                        nft: nft.0.to_hex(),
                        reason: format!("listed by {agent}, no owner recorded"),
                    })
                }
            }
        }
    }

    let base_total = total_base_full_decimals(state);
    if base_total != base_sum {
        return Err(LedgerMismatch::BaseTokens {
            total: base_total,
            sum: base_sum,
        });
    }

    let totals = total_native_tokens(state);
    let tokens: BTreeSet<&NativeTokenId> = totals.keys().chain(native_sums.keys()).collect();
    for id in tokens {
        let total = totals.get(id).copied().unwrap_or_default();
        let sum = native_sums.get(id).copied().unwrap_or_default();
        if total != sum {
            return Err(LedgerMismatch::NativeToken {
                token: id.0.to_hex(),
                total,
                sum,
            });
        }
    }

    let mut orphan = None;
    MapReader::new(state, KEY_NFT_OWNERS).iterate(&mut |k, v| {
        let listed = match (nft_from_key(k), AgentId::from_bytes(v)) {
            (Some(nft), Ok(owner)) => get_nfts(state, &owner).contains(&nft),
            _ => false,
        };
        if !listed {
            orphan = Some(hex::encode(k));
        }
        listed
    });
    if let Some(nft) = orphan {
        return Err(LedgerMismatch::Nft {
            nft,
            reason: "owner does not list it".to_string(),
        });
    }
    Ok(())
}

/// [`check_ledger`], panicking on a mismatch
pub fn must_check_ledger(state: &dyn KvReader) {
    if let Err(mismatch) = check_ledger(state) {
        panic!("inconsistent on-chain account ledger: {mismatch}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_storage::StateSnapshot;
    use isc_types::{Address, ChainId};

    fn agent(n: u8) -> AgentId {
        AgentId::Address(Address::from_bytes([n; 20]))
    }

    fn token(n: u8) -> NativeTokenId {
        NativeTokenId::for_foundry(&ChainId::from_bytes([9; 32]), n as u32)
    }

    fn nft(n: u8) -> NftId {
        NftId(H256::from_bytes([n; 32]))
    }

    // ==================== Credit / Debit ====================

    #[test]
    fn test_credit_updates_totals() {
        let mut state = StateSnapshot::new();
        let assets = Assets::from_base_tokens(100)
            .with_native_token(token(1), U256::from(5u64))
            .with_nft(nft(1));
        credit(&mut state, &agent(1), &assets);

        assert_eq!(get_assets(&state, &agent(1)), assets);
        assert_eq!(total_assets(&state), assets);
        assert_eq!(all_accounts(&state), vec![agent(1)]);
        assert_eq!(get_nft_owner(&state, &nft(1)), Some(agent(1)));
        check_ledger(&state).unwrap();
    }

    #[test]
    fn test_debit_insufficient_changes_nothing() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::from_base_tokens(10));
        let before = state.clone();

        let too_much = Assets::from_base_tokens(5).with_native_token(token(1), U256::one());
        assert!(!debit(&mut state, &agent(1), &too_much));
        assert_eq!(state, before);
    }

    #[test]
    fn test_move_keeps_totals() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::from_base_tokens(100).with_nft(nft(2)));
        let moved = Assets::from_base_tokens(40).with_nft(nft(2));
        assert!(move_between_accounts(&mut state, &agent(1), &agent(2), &moved));

        assert_eq!(get_base_tokens(&state, &agent(1)), 60);
        assert_eq!(get_assets(&state, &agent(2)), moved);
        assert_eq!(total_assets(&state).base_tokens, 100);
        assert_eq!(get_nft_owner(&state, &nft(2)), Some(agent(2)));
        check_ledger(&state).unwrap();
    }

    #[test]
    fn test_native_token_entries_removed_at_zero() {
        let mut state = StateSnapshot::new();
        let t = Assets::new().with_native_token(token(3), U256::from(7u64));
        credit(&mut state, &agent(1), &t);
        assert!(debit(&mut state, &agent(1), &t));
        assert!(get_native_tokens(&state, &agent(1)).is_empty());
        assert!(total_native_tokens(&state).is_empty());
        // the account itself is kept
        assert!(account_exists(&state, &agent(1)));
    }

    // ==================== Full Decimals ====================

    #[test]
    fn test_full_decimal_remainder_is_kept() {
        let mut state = StateSnapshot::new();
        let half = U256::from(FULL_DECIMALS_FACTOR / 2);
        credit_full_decimals(&mut state, &agent(1), half);
        assert_eq!(get_base_tokens(&state, &agent(1)), 0);
        credit_full_decimals(&mut state, &agent(1), half);
        assert_eq!(get_base_tokens(&state, &agent(1)), 1);

        assert!(!debit_full_decimals(&mut state, &agent(1), half * 3));
        assert!(move_full_decimals(&mut state, &agent(1), &agent(2), half));
        assert_eq!(get_base_full_decimals(&state, &agent(2)), half);
        check_ledger(&state).unwrap();
    }

    // ==================== Nonces ====================

    #[test]
    fn test_nonce() {
        let mut state = StateSnapshot::new();
        assert_eq!(get_nonce(&state, &agent(1)), 0);
        increment_nonce(&mut state, &agent(1));
        increment_nonce(&mut state, &agent(1));
        assert_eq!(get_nonce(&state, &agent(1)), 2);
        assert_eq!(get_nonce(&state, &agent(2)), 0);
    }

    // ==================== Consistency ====================

    #[test]
    fn test_check_detects_base_mismatch() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::from_base_tokens(10));
        state.set(KEY_TOTAL_BASE, codec::encode(&to_full_decimals(11)));
        assert!(matches!(check_ledger(&state), Err(LedgerMismatch::BaseTokens { .. })));
    }

    #[test]
    fn test_check_detects_native_mismatch() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::new().with_native_token(token(1), U256::from(3u64)));
        Map::new(&mut state, KEY_TOTAL_NATIVES).del_at(token(1).0.as_bytes());
        assert!(matches!(check_ledger(&state), Err(LedgerMismatch::NativeToken { .. })));
    }

    #[test]
    fn test_check_detects_orphan_nft() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::new().with_nft(nft(4)));
        Map::new(&mut state, agent_key(PREFIX_NFTS, &agent(1))).del_at(nft(4).0.as_bytes());
        assert!(matches!(check_ledger(&state), Err(LedgerMismatch::Nft { .. })));
    }

    #[test]
    #[should_panic(expected = "inconsistent on-chain account ledger")]
    fn test_must_check_panics() {
        let mut state = StateSnapshot::new();
        credit(&mut state, &agent(1), &Assets::from_base_tokens(1));
        state.del(KEY_TOTAL_BASE);
        must_check_ledger(&state);
    }
}
