//! Keccak-256, the chain hash

use isc_primitives::H256;
use sha3::{Digest, Keccak256};

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_bytes(Keccak256::digest(data).into())
}

/// Keccak-256 over the concatenation of `parts`, without allocating the
/// concatenated buffer
pub fn keccak256_concat<'a, I>(parts: I) -> H256
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    H256::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        assert_eq!(
            keccak256(&[]).to_hex(),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_keccak256_hello() {
        assert_eq!(
            keccak256(b"hello").to_hex(),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_concat_matches_contiguous() {
        let joined = keccak256(b"accountsdeposit");
        let parts: [&[u8]; 2] = [b"accounts", b"deposit"];
        assert_eq!(keccak256_concat(parts), joined);
    }

    #[test]
    fn test_concat_of_nothing_is_empty_hash() {
        let parts: [&[u8]; 0] = [];
        assert_eq!(keccak256_concat(parts), keccak256(&[]));
    }
}
