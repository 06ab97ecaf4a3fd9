//! secp256k1 signatures used to authenticate off-ledger requests

use crate::{keccak256, CryptoError};
use isc_primitives::{Address, H256};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use std::fmt;

/// Public key
pub type PublicKey = VerifyingKey;

/// Private key
pub type PrivateKey = SigningKey;

/// Recoverable signature, `r || s || recovery_id`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    /// Size in bytes
    pub const LEN: usize = 65;

    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 65]) -> Self {
        Signature(bytes)
    }

    /// Parse from a slice of exactly 65 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 65] = slice.try_into().map_err(|_| {
            CryptoError::InvalidSignature(format!("expected 65 bytes, got {}", slice.len()))
        })?;
        Ok(Signature(bytes))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Recovery ID byte
    pub fn recovery_id(&self) -> u8 {
        self.0[64]
    }

    fn to_ecdsa(self) -> Result<EcdsaSignature, CryptoError> {
        EcdsaSignature::from_slice(&self.0[..64])
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(0x{})", hex::encode(self.0))
    }
}

/// Sign a prehashed message. The result always carries a low `s`.
pub fn sign(message_hash: &H256, private_key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (signature, recovery_id) = private_key
        .sign_prehash_recoverable(message_hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    let (signature, recovery_id) = match signature.normalize_s() {
        Some(low) => (
            low,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    };

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&signature.to_bytes());
    bytes[64] = recovery_id.to_byte();
    Ok(Signature(bytes))
}

/// Verify a signature against a public key. High-`s` signatures are rejected.
pub fn verify(message_hash: &H256, signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(sig) = signature.to_ecdsa() else {
        return false;
    };
    if sig.normalize_s().is_some() {
        return false;
    }
    public_key.verify_prehash(message_hash.as_bytes(), &sig).is_ok()
}

/// Recover the signing public key
pub fn recover_signer(message_hash: &H256, signature: &Signature) -> Result<PublicKey, CryptoError> {
    let sig = signature.to_ecdsa()?;
    let recovery_id = RecoveryId::from_byte(signature.recovery_id())
        .ok_or(CryptoError::InvalidRecoveryId(signature.recovery_id()))?;
    VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &sig, recovery_id)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))
}

/// Parse a SEC1-encoded (compressed or uncompressed) public key
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    VerifyingKey::from_sec1_bytes(bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// L1 address of a public key: last 20 bytes of the hash of the uncompressed point
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

/// Private key together with its derived L1 address
#[derive(Clone)]
pub struct KeyPair {
    private_key: SigningKey,
    address: Address,
}

impl KeyPair {
    /// Fresh random key
    pub fn random() -> Self {
        Self::from_private_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Key from 32 raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_private_key(key))
    }

    /// Key from hex, with or without `0x`
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Self::from_bytes(&bytes)
    }

    fn from_private_key(private_key: SigningKey) -> Self {
        let address = public_key_to_address(private_key.verifying_key());
        Self { private_key, address }
    }

    /// L1 address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Public key
    pub fn public_key(&self) -> &PublicKey {
        self.private_key.verifying_key()
    }

    /// Compressed SEC1 public key (33 bytes)
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key().to_encoded_point(true).as_bytes().to_vec()
    }

    /// Sign a prehashed message
    pub fn sign(&self, message_hash: &H256) -> Result<Signature, CryptoError> {
        sign(message_hash, &self.private_key)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("address", &self.address).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_sign_verify() {
        let key = KeyPair::random();
        let hash = keccak256(b"off-ledger essence");
        let sig = key.sign(&hash).unwrap();
        assert!(verify(&hash, &sig, key.public_key()));
        assert!(!verify(&keccak256(b"other"), &sig, key.public_key()));
    }

    #[test]
    fn test_signatures_are_low_s() {
        let key = KeyPair::random();
        for i in 0u8..16 {
            let hash = keccak256(&[i]);
            let sig = key.sign(&hash).unwrap();
            let ecdsa = EcdsaSignature::from_slice(&sig.as_bytes()[..64]).unwrap();
            assert!(ecdsa.normalize_s().is_none());
        }
    }

    #[test]
    fn test_recover_signer_matches_address() {
        let key = KeyPair::random();
        let hash = keccak256(b"recover me");
        let sig = key.sign(&hash).unwrap();
        let recovered = recover_signer(&hash, &sig).unwrap();
        assert_eq!(public_key_to_address(&recovered), key.address());
    }

    #[test]
    fn test_known_key_address() {
        let key = KeyPair::from_hex(KNOWN_KEY).unwrap();
        assert_eq!(
            key.address().to_hex(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_public_key_bytes_roundtrip() {
        let key = KeyPair::random();
        let bytes = key.public_key_bytes();
        assert_eq!(bytes.len(), 33);
        let parsed = public_key_from_bytes(&bytes).unwrap();
        assert_eq!(public_key_to_address(&parsed), key.address());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(KeyPair::from_bytes(&[0u8; 32]).is_err());
        assert!(Signature::from_slice(&[0u8; 64]).is_err());
        assert!(public_key_from_bytes(&[2u8; 5]).is_err());

        let mut bytes = [0u8; 65];
        bytes[64] = 9;
        let sig = Signature::from_bytes(bytes);
        assert!(recover_signer(&H256::ZERO, &sig).is_err());
    }
}
