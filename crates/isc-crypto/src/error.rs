//! Cryptographic errors

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signing failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Malformed signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Recovery ID outside 0..=3
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Public key recovery failed
    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),

    /// Malformed public key bytes
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Malformed private key bytes
    #[error("invalid private key")]
    InvalidPrivateKey,
}
