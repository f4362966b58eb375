//! Error types for parley-crypto.

use thiserror::Error;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid hex encoding
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Invalid key, hash, or token length
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (wrong key, wrong nonce, or tampered ciphertext)
    #[error("decryption failed")]
    DecryptionFailed,

    /// Signature verification failed
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    /// Envelope too short to contain nonce and tag
    #[error("envelope too short: {0} bytes")]
    EnvelopeTooShort(usize),
}
