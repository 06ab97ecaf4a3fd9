//! Fungible and non-fungible assets held by on-chain accounts

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use crate::ChainId;
use isc_crypto::keccak256_concat;
use isc_primitives::{H256, U256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a native token, derived from the foundry that mints it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct NativeTokenId(pub H256);

impl NativeTokenId {
    /// Token minted by foundry `serial` of `chain_id`
    pub fn for_foundry(chain_id: &ChainId, serial: u32) -> Self {
        let serial = serial.to_be_bytes();
        let parts: [&[u8]; 3] = [b"foundry", chain_id.as_bytes(), &serial];
        NativeTokenId(keccak256_concat(parts))
    }
}

/// Identifier of an NFT
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
pub struct NftId(pub H256);

macro_rules! h256_newtype_codec {
    ($t:ident) => {
        impl Encodable for $t {
            fn rlp_append(&self, s: &mut RlpStream) {
                self.0.rlp_append(s);
            }
        }

        impl Decodable for $t {
            fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
                Ok($t(H256::decode(rlp)?))
            }
        }
    };
}

h256_newtype_codec!(NativeTokenId);
h256_newtype_codec!(NftId);

/// A bag of assets.
///
/// Native token amounts are never stored as zero: arithmetic removes
/// entries that drop to zero, so two equal bags compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assets {
    /// Base tokens, in L1 units
    pub base_tokens: u64,
    /// Native token amounts
    pub native_tokens: BTreeMap<NativeTokenId, U256>,
    /// NFTs
    pub nfts: BTreeSet<NftId>,
}

impl Assets {
    /// Empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Bag holding only base tokens
    pub fn from_base_tokens(amount: u64) -> Self {
        Self {
            base_tokens: amount,
            ..Self::default()
        }
    }

    /// Builder: add native tokens
    pub fn with_native_token(mut self, id: NativeTokenId, amount: U256) -> Self {
        self.add_native_token(id, amount);
        self
    }

    /// Builder: add an NFT
    pub fn with_nft(mut self, id: NftId) -> Self {
        self.nfts.insert(id);
        self
    }

    /// Add native tokens
    pub fn add_native_token(&mut self, id: NativeTokenId, amount: U256) {
        if amount.is_zero() {
            return;
        }
        let entry = self.native_tokens.entry(id).or_insert_with(U256::zero);
        *entry = entry.saturating_add(amount);
    }

    /// Amount of a native token
    pub fn native_token(&self, id: &NativeTokenId) -> U256 {
        self.native_tokens.get(id).copied().unwrap_or_default()
    }

    /// Whether the bag holds nothing
    pub fn is_empty(&self) -> bool {
        self.base_tokens == 0 && self.native_tokens.is_empty() && self.nfts.is_empty()
    }

    /// Add everything in `other`
    pub fn add(&mut self, other: &Assets) {
        self.base_tokens = self.base_tokens.saturating_add(other.base_tokens);
        for (id, amount) in &other.native_tokens {
            self.add_native_token(*id, *amount);
        }
        self.nfts.extend(other.nfts.iter().copied());
    }

    /// Whether this bag holds at least everything in `other`
    pub fn covers(&self, other: &Assets) -> bool {
        self.base_tokens >= other.base_tokens
            && other
                .native_tokens
                .iter()
                .all(|(id, amount)| self.native_token(id) >= *amount)
            && other.nfts.is_subset(&self.nfts)
    }

    /// Remove `other` from this bag. Returns false, leaving the bag
    /// untouched, when it does not cover `other`.
    pub fn spend(&mut self, other: &Assets) -> bool {
        if !self.covers(other) {
            return false;
        }
        self.base_tokens -= other.base_tokens;
        for (id, amount) in &other.native_tokens {
            if let Some(have) = self.native_tokens.get_mut(id) {
                *have -= *amount;
                if have.is_zero() {
                    self.native_tokens.remove(id);
                }
            }
        }
        for nft in &other.nfts {
            self.nfts.remove(nft);
        }
        true
    }
}

impl fmt::Display for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "base: {}", self.base_tokens)?;
        for (id, amount) in &self.native_tokens {
            write!(f, ", {}: {}", id.0.short(), amount)?;
        }
        if !self.nfts.is_empty() {
            write!(f, ", nfts: {}", self.nfts.len())?;
        }
        Ok(())
    }
}

impl Encodable for Assets {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.base_tokens);
        s.begin_list(self.native_tokens.len());
        for (id, amount) in &self.native_tokens {
            s.begin_list(2);
            s.append(id);
            s.append(amount);
        }
        s.begin_list(self.nfts.len());
        for nft in &self.nfts {
            s.append(nft);
        }
    }
}

impl Decodable for Assets {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let mut assets = Assets::from_base_tokens(rlp.val_at(0)?);
        for item in rlp.at(1)?.iter() {
            assets.add_native_token(item.val_at(0)?, item.val_at(1)?);
        }
        for item in rlp.at(2)?.iter() {
            assets.nfts.insert(item.as_val()?);
        }
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    fn token(n: u8) -> NativeTokenId {
        NativeTokenId(H256::from_bytes([n; 32]))
    }

    #[test]
    fn test_add_and_spend() {
        let mut bag = Assets::from_base_tokens(100).with_native_token(token(1), U256::from(50u64));
        bag.add(&Assets::from_base_tokens(20).with_nft(NftId(H256::from_bytes([3; 32]))));
        assert_eq!(bag.base_tokens, 120);
        assert_eq!(bag.nfts.len(), 1);

        let spent = Assets::from_base_tokens(30).with_native_token(token(1), U256::from(50u64));
        assert!(bag.spend(&spent));
        assert_eq!(bag.base_tokens, 90);
        assert!(bag.native_tokens.is_empty(), "zero entries are removed");
    }

    #[test]
    fn test_spend_insufficient_leaves_bag_untouched() {
        let mut bag = Assets::from_base_tokens(10).with_native_token(token(1), U256::from(5u64));
        let before = bag.clone();
        let too_much = Assets::from_base_tokens(1).with_native_token(token(1), U256::from(6u64));
        assert!(!bag.spend(&too_much));
        assert_eq!(bag, before);
    }

    #[test]
    fn test_covers_nfts() {
        let nft = NftId(H256::from_bytes([4; 32]));
        let bag = Assets::new().with_nft(nft);
        assert!(bag.covers(&Assets::new().with_nft(nft)));
        assert!(!Assets::new().covers(&Assets::new().with_nft(nft)));
    }

    #[test]
    fn test_zero_native_amount_is_ignored() {
        let bag = Assets::new().with_native_token(token(2), U256::zero());
        assert!(bag.is_empty());
    }

    #[test]
    fn test_codec() {
        let bag = Assets::from_base_tokens(7)
            .with_native_token(token(1), U256::from(9u64))
            .with_nft(NftId(H256::from_bytes([8; 32])));
        assert_eq!(codec::decode::<Assets>(&codec::encode(&bag)).unwrap(), bag);
    }

    #[test]
    fn test_foundry_token_ids_are_distinct() {
        let chain = ChainId::from_bytes([1; 32]);
        assert_ne!(
            NativeTokenId::for_foundry(&chain, 1),
            NativeTokenId::for_foundry(&chain, 2)
        );
    }
}
