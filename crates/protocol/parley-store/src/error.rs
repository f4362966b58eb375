//! Error types for parley-store.

use parley_crypto::Hash;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Object bytes did not match the claimed hash
    #[error("hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Hash, got: Hash },

    /// Object failed to encode or decode
    #[error("serialization: {0}")]
    Serialization(String),

    /// A versioned operation was attempted on an unversioned object
    #[error("object type {0} has no identity")]
    NotVersioned(String),

    /// The store directory holds objects but the keychain is gone, or the
    /// object log is corrupt beyond the recovery pass. Writes must stop.
    #[error("fatal storage fault: {0}")]
    Fatal(String),
}

impl From<parley_types::ParleyError> for StoreError {
    fn from(err: parley_types::ParleyError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
