//! Native token foundries.
//!
//! A foundry is owned by the account that created it and mints one native
//! token, identified by [`NativeTokenId::for_foundry`]. Supply changes go
//! through the ledger so the token totals always match the balances.

use isc_storage::{KvReader, KvWriter, Map, MapReader};
use isc_types::codec::{self, Decodable, DecoderError, Encodable, Rlp, RlpStream};
use isc_types::{AgentId, ChainId, NativeTokenId, U256};

const KEY_FOUNDRIES: &[u8] = b"F";
const KEY_FOUNDRY_COUNTER: &[u8] = b"Fc";

/// Supply bookkeeping of one foundry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundryRecord {
    /// Serial number, unique per chain, starting at 1
    pub serial: u32,
    /// Creating account
    pub owner: AgentId,
    /// Upper bound of the circulating supply
    pub max_supply: U256,
    /// Total ever minted
    pub minted: U256,
    /// Total ever melted
    pub melted: U256,
}

impl FoundryRecord {
    /// Minted minus melted
    pub fn circulating_supply(&self) -> U256 {
        self.minted.saturating_sub(self.melted)
    }

    /// Token minted by this foundry
    pub fn token_id(&self, chain_id: &ChainId) -> NativeTokenId {
        NativeTokenId::for_foundry(chain_id, self.serial)
    }
}

impl Encodable for FoundryRecord {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(5);
        s.append(&self.serial);
        s.append(&self.owner);
        s.append(&self.max_supply);
        s.append(&self.minted);
        s.append(&self.melted);
    }
}

impl Decodable for FoundryRecord {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(FoundryRecord {
            serial: rlp.val_at(0)?,
            owner: rlp.val_at(1)?,
            max_supply: rlp.val_at(2)?,
            minted: rlp.val_at(3)?,
            melted: rlp.val_at(4)?,
        })
    }
}

/// Foundry `serial`
pub fn get_foundry(state: &dyn KvReader, serial: u32) -> Option<FoundryRecord> {
    MapReader::new(state, KEY_FOUNDRIES)
        .get_at(&codec::u32_be_key(serial))
        .and_then(|b| codec::decode(&b).ok())
}

/// Store a new foundry for `owner`; returns its serial
pub fn create_foundry(state: &mut dyn KvWriter, owner: &AgentId, max_supply: U256) -> u32 {
    let serial = state
        .get(KEY_FOUNDRY_COUNTER)
        .and_then(|b| codec::decode::<u32>(&b).ok())
        .unwrap_or(0)
        + 1;
    state.set(KEY_FOUNDRY_COUNTER, codec::encode(&serial));
    let record = FoundryRecord {
        serial,
        owner: owner.clone(),
        max_supply,
        minted: U256::zero(),
        melted: U256::zero(),
    };
    save_foundry(state, &record);
    serial
}

/// Overwrite a foundry record
pub fn save_foundry(state: &mut dyn KvWriter, record: &FoundryRecord) {
    Map::new(state, KEY_FOUNDRIES).set_at(&codec::u32_be_key(record.serial), codec::encode(record));
}

/// Remove a foundry
pub fn delete_foundry(state: &mut dyn KvWriter, serial: u32) {
    Map::new(state, KEY_FOUNDRIES).del_at(&codec::u32_be_key(serial));
}

/// Serials of the foundries owned by `owner`
pub fn foundries_of(state: &dyn KvReader, owner: &AgentId) -> Vec<u32> {
    let mut out = Vec::new();
    MapReader::new(state, KEY_FOUNDRIES).iterate(&mut |_, v| {
        if let Ok(record) = codec::decode::<FoundryRecord>(v) {
            if record.owner == *owner {
                out.push(record.serial);
            }
        }
        true
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_storage::StateSnapshot;
    use isc_types::Address;

    #[test]
    fn test_serials_increase() {
        let mut state = StateSnapshot::new();
        let owner = AgentId::Address(Address::from_bytes([1; 20]));
        let other = AgentId::Address(Address::from_bytes([2; 20]));
        assert_eq!(create_foundry(&mut state, &owner, U256::from(10u64)), 1);
        assert_eq!(create_foundry(&mut state, &other, U256::from(10u64)), 2);
        assert_eq!(create_foundry(&mut state, &owner, U256::from(10u64)), 3);

        assert_eq!(foundries_of(&state, &owner), vec![1, 3]);
        delete_foundry(&mut state, 1);
        assert!(get_foundry(&state, 1).is_none());
        assert_eq!(get_foundry(&state, 3).unwrap().owner, owner);
    }

    #[test]
    fn test_circulating_supply() {
        let record = FoundryRecord {
            serial: 1,
            owner: AgentId::Nil,
            max_supply: U256::from(100u64),
            minted: U256::from(30u64),
            melted: U256::from(12u64),
        };
        assert_eq!(record.circulating_supply(), U256::from(18u64));
        assert_eq!(codec::decode::<FoundryRecord>(&codec::encode(&record)).unwrap(), record);
    }
}
