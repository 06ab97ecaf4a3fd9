//! L1 address (20 bytes)

use std::fmt;
use thiserror::Error;

/// Address parsing error
#[derive(Debug, Error)]
pub enum AddressError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid address length: expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

/// 20-byte address of an L1 account, derived from a secp256k1 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Address([u8; 20]);

impl Address {
    /// Size in bytes
    pub const LEN: usize = 20;

    /// Zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    /// Create from a slice of exactly 20 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, AddressError> {
        let bytes: [u8; 20] = slice
            .try_into()
            .map_err(|_| AddressError::InvalidLength(slice.len()))?;
        Ok(Address(bytes))
    }

    /// Parse from hex, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(feature = "rlp")]
mod rlp_impl {
    use super::Address;
    use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

    impl Encodable for Address {
        fn rlp_append(&self, s: &mut RlpStream) {
            s.encoder().encode_value(&self.0);
        }
    }

    impl Decodable for Address {
        fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
            rlp.decoder().decode_value(|bytes| {
                Address::from_slice(bytes).map_err(|_| DecoderError::RlpInvalidLength)
            })
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::Address;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for Address {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_hex())
        }
    }

    impl<'de> Deserialize<'de> for Address {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Address::from_hex(&s).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_roundtrip() {
        let addr = Address::from_hex("0x742d35Cc6634C0532925a3b844Bc9e7595f0aB3d").unwrap();
        assert_eq!(addr.to_hex(), "0x742d35cc6634c0532925a3b844bc9e7595f0ab3d");
        assert_eq!(addr, "742d35cc6634c0532925a3b844bc9e7595f0ab3d".parse().unwrap());
    }

    #[test]
    fn test_invalid_length() {
        assert!(matches!(
            Address::from_slice(&[1u8; 19]),
            Err(AddressError::InvalidLength(19))
        ));
        assert!(matches!(Address::from_hex("0xabc"), Err(AddressError::InvalidHex(_))));
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_bytes([1u8; 20]).is_zero());
        assert_eq!(Address::default(), Address::ZERO);
    }

    #[cfg(feature = "rlp")]
    #[test]
    fn test_rlp_encoding_is_raw_value() {
        let addr = Address::from_bytes([0x11; 20]);
        let encoded = rlp::encode(&addr);
        assert_eq!(encoded.len(), 21);
        assert_eq!(encoded[0], 0x80 + 20);
        assert_eq!(rlp::decode::<Address>(&encoded).unwrap(), addr);
    }
}
