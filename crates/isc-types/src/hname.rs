//! Hashed names of contracts and entry points

use crate::codec::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use isc_crypto::keccak256;
use std::fmt;

/// 32-bit hash of a name.
///
/// Contracts are keyed in the registry by the hname of their name, and
/// entry points are addressed by the hname of their function name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hname(pub u32);

impl Hname {
    /// Reserved "no contract" hname
    pub const NIL: Hname = Hname(0);

    /// Hname of `name`: the first 4-byte little-endian word of its hash that
    /// is neither 0 nor `u32::MAX` (both are reserved)
    pub fn from_name(name: &str) -> Self {
        let hash = keccak256(name.as_bytes());
        hash.as_bytes()
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .find(|v| *v != 0 && *v != u32::MAX)
            .map(Hname)
            .unwrap_or(Hname(1))
    }

    /// Byte form used as a state key prefix
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Parse the byte form
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 4] = bytes.try_into().ok()?;
        Some(Hname(u32::from_be_bytes(arr)))
    }

    /// Whether this is [`Hname::NIL`]
    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }
}

/// Shorthand for [`Hname::from_name`]
pub fn hn(name: &str) -> Hname {
    Hname::from_name(name)
}

impl fmt::Display for Hname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for Hname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hname({:08x})", self.0)
    }
}

impl Encodable for Hname {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0);
    }
}

impl Decodable for Hname {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Hname(rlp.as_val()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    #[test]
    fn test_hname_is_deterministic() {
        assert_eq!(hn("accounts"), hn("accounts"));
        assert_ne!(hn("accounts"), hn("blob"));
    }

    #[test]
    fn test_hname_never_reserved() {
        for name in ["root", "accounts", "blob", "blocklog", "governance", "", "x"] {
            let h = hn(name);
            assert!(!h.is_nil(), "{name}");
            assert_ne!(h.0, u32::MAX, "{name}");
        }
    }

    #[test]
    fn test_bytes_roundtrip() {
        let h = hn("deployContract");
        assert_eq!(Hname::from_bytes(&h.to_bytes()), Some(h));
        assert_eq!(Hname::from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_display_is_padded_hex() {
        assert_eq!(Hname(0xab).to_string(), "000000ab");
    }

    #[test]
    fn test_codec() {
        let h = hn("storeBlob");
        assert_eq!(codec::decode::<Hname>(&codec::encode(&h)).unwrap(), h);
    }
}
