//! 32-byte hash type

use std::fmt;
use thiserror::Error;

/// Hash parsing error
#[derive(Debug, Error)]
pub enum HashError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid hash length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected length in bytes
        expected: usize,
        /// Actual length in bytes
        got: usize,
    },
}

/// 256-bit hash.
///
/// Ordered bytewise so it can key ordered maps; iteration over such maps is
/// therefore deterministic across nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct H256([u8; 32]);

impl H256 {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// All-zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from a slice of exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| HashError::InvalidLength {
            expected: Self::LEN,
            got: slice.len(),
        })?;
        Ok(H256(bytes))
    }

    /// Parse from hex, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// First eight hex digits, for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for H256 {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(feature = "rlp")]
mod rlp_impl {
    use super::H256;
    use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

    impl Encodable for H256 {
        fn rlp_append(&self, s: &mut RlpStream) {
            s.encoder().encode_value(&self.0);
        }
    }

    impl Decodable for H256 {
        fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
            rlp.decoder().decode_value(|bytes| {
                H256::from_slice(bytes).map_err(|_| DecoderError::RlpInvalidLength)
            })
        }
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use super::H256;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for H256 {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&self.to_hex())
        }
    }

    impl<'de> Deserialize<'de> for H256 {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            H256::from_hex(&s).map_err(de::Error::custom)
        }
    }
}
