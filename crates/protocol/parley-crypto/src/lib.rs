//! Cryptographic primitives for the Parley protocol.
//!
//! This crate provides all cryptographic functionality required by the
//! content-addressed object graph and the session layer:
//!
//! - **Content hashing**: SHA-256 over serialized object bytes
//! - **Identity hashing**: SHA-256 over a versioned object's id fields
//! - **Signing identities**: Ed25519 keypair generation and verification
//! - **Key exchange**: X25519 Diffie-Hellman for static and ephemeral keys
//! - **Authenticated encryption**: XChaCha20-Poly1305 with 24-byte nonces
//! - **Key derivation**: HKDF-SHA256 for static and session keys
//!
//! # Example
//!
//! ```
//! use parley_crypto::{content_hash, ExchangeKeypair, derive_session_key, seal, open, counter_nonce};
//!
//! let hash = content_hash(b"hello parley");
//! assert_eq!(hash.as_bytes().len(), 32);
//!
//! // Two parties agree on a session key from ephemeral keypairs.
//! let a = ExchangeKeypair::generate();
//! let b = ExchangeKeypair::generate();
//! let key_a = derive_session_key(&a, &b.public());
//! let key_b = derive_session_key(&b, &a.public());
//!
//! let nonce = counter_nonce(0);
//! let ct = seal(&key_a, &nonce, b"frame").unwrap();
//! assert_eq!(open(&key_b, &nonce, &ct).unwrap(), b"frame");
//! ```

mod aead;
mod error;
mod hash;
mod identity;
mod kdf;
mod serde_impl;
mod signature;

pub use aead::{counter_nonce, open, open_enveloped, random_nonce, seal, seal_enveloped};
pub use error::CryptoError;
pub use hash::{content_hash, identity_hash, verify_content};
pub use identity::{random_token, ExchangeKeypair, SignKeypair};
pub use kdf::{derive_session_key, derive_static_key, derive_wrapping_key};
pub use signature::{sign, verify};

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of all hashes, keys, and tokens in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// A 32-byte SHA-256 hash over an object's serialized content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Get the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render the hash as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex_string(&self.0)
    }

    /// Parse a 64-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex_decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidLength { expected: 32, actual: s.len() / 2 })?;
        Ok(Hash(arr))
    }
}

impl std::fmt::Debug for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", hex_string(&self.0[..8]))
    }
}

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The stable identity hash of a versioned object.
///
/// Derived from the object's type tag and declared id fields; every version
/// of the object shares this value while each version carries its own
/// content [`Hash`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdHash(pub [u8; 32]);

impl IdHash {
    /// Get the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex_string(&self.0)
    }

    /// Parse a 64-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Hash::from_hex(s).map(|h| IdHash(h.0))
    }

    /// View the identity hash as a plain [`Hash`] for map keys and
    /// reverse-reference lookups, which share one hash space.
    pub fn as_hash(&self) -> Hash {
        Hash(self.0)
    }
}

impl std::fmt::Debug for IdHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdHash({})", hex_string(&self.0[..8]))
    }
}

impl std::fmt::Display for IdHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for IdHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A public key (Ed25519 verifying key or X25519 public key, 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Render as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex_string(&self.0)
    }

    /// Parse a 64-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        Hash::from_hex(s).map(|h| PublicKey(h.0))
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex_string(&self.0[..8]))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A symmetric encryption key (32 bytes).
///
/// Implements Zeroize + ZeroizeOnDrop to clear key material from memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// An Ed25519 signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex_string(&self.0[..8]))
    }
}

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Render bytes as lowercase hex.
pub fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Decode a lowercase hex string into bytes.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    if s.len() % 2 != 0 {
        return Err(CryptoError::InvalidHex(s.to_string()));
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for pair in bytes.chunks(2) {
        let hi = hex_val(pair[0]).ok_or_else(|| CryptoError::InvalidHex(s.to_string()))?;
        let lo = hex_val(pair[1]).ok_or_else(|| CryptoError::InvalidHex(s.to_string()))?;
        out.push(hi << 4 | lo);
    }
    Ok(out)
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_round_trip() {
        let hash = content_hash(b"round trip");
        let parsed = Hash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn hex_rejects_uppercase() {
        assert!(Hash::from_hex(&"AB".repeat(32)).is_err());
    }

    #[test]
    fn hex_rejects_wrong_length() {
        assert!(Hash::from_hex("abcd").is_err());
    }
}
