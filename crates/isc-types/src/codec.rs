//! Deterministic encoding of values stored in chain state and passed as
//! call parameters.
//!
//! Everything goes through RLP: the encoding of a value is unique, so two
//! nodes that execute the same batch write byte-identical state.

pub use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use thiserror::Error;

/// Encoding/decoding failure
#[derive(Debug, Error)]
pub enum CodecError {
    /// Malformed RLP
    #[error("decode error: {0}")]
    Decode(#[from] DecoderError),

    /// Required parameter absent from a [`crate::Dict`]
    #[error("missing parameter: {0}")]
    MissingParam(String),

    /// Value decoded but is not acceptable
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Parameter or field name
        key: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Encode a value
pub fn encode<T: Encodable>(value: &T) -> Vec<u8> {
    rlp::encode(value).to_vec()
}

/// Decode a value
pub fn decode<T: Decodable>(data: &[u8]) -> Result<T, CodecError> {
    Ok(rlp::decode(data)?)
}

/// Encode a list of values
pub fn encode_list<T: Encodable>(values: &[T]) -> Vec<u8> {
    rlp::encode_list::<T, T>(values).to_vec()
}

/// Decode a list of values
pub fn decode_list<T: Decodable>(data: &[u8]) -> Result<Vec<T>, CodecError> {
    Ok(Rlp::new(data).as_list()?)
}

/// Big-endian `u32` key; sorts numerically under byte order
pub fn u32_be_key(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

/// Decode a big-endian `u32` key
pub fn u32_from_be_key(bytes: &[u8]) -> Result<u32, CodecError> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| CodecError::InvalidValue {
        key: "u32".to_string(),
        reason: format!("expected 4 bytes, got {}", bytes.len()),
    })?;
    Ok(u32::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use isc_primitives::U256;

    #[test]
    fn test_integers_are_minimal() {
        assert_eq!(encode(&0u64), vec![0x80]);
        assert_eq!(encode(&5u64), vec![0x05]);
        assert_eq!(decode::<u64>(&encode(&1_000_000u64)).unwrap(), 1_000_000);
    }

    #[test]
    fn test_u256_value() {
        let v = U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(decode::<U256>(&encode(&v)).unwrap(), v);
    }

    #[test]
    fn test_list() {
        let names = vec!["root".to_string(), "blob".to_string()];
        let bytes = encode_list(&names);
        assert_eq!(decode_list::<String>(&bytes).unwrap(), names);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode::<u64>(&[0xc1]), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_be_key_sorts_numerically() {
        assert!(u32_be_key(2) < u32_be_key(256));
        assert_eq!(u32_from_be_key(&u32_be_key(77)).unwrap(), 77);
        assert!(u32_from_be_key(&[1, 2]).is_err());
    }
}
