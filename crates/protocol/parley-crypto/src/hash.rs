//! Content and identity hashing.
//!
//! Content hashes are SHA-256 over an object's full serialized bytes, so
//! two serializations hashing to the same value are the same object.
//! Identity hashes cover only a versioned object's type tag and declared
//! id fields:
//!
//! ```text
//! ContentHash(bytes)        = SHA-256(bytes)
//! IdentityHash(tag, fields) = SHA-256(tag || 0x1f || field_1 || 0x1f || ... || field_n)
//! ```
//!
//! The 0x1f unit separator keeps adjacent fields from gluing into the same
//! digest input.

use sha2::{Digest, Sha256};

use crate::{Hash, IdHash};

/// Field separator inside identity-hash input.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute the content hash of serialized object bytes.
///
/// # Example
/// ```
/// use parley_crypto::content_hash;
///
/// let hash = content_hash(b"Hello, Parley!");
/// assert_eq!(hash.as_bytes().len(), 32);
/// ```
pub fn content_hash(content: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    Hash(hasher.finalize().into())
}

/// Compute the identity hash of a versioned object.
///
/// `type_tag` is the object's declared type name and `id_fields` the
/// serialized values of its id fields in declaration order. The result is
/// stable across all versions of the object.
///
/// # Example
/// ```
/// use parley_crypto::identity_hash;
///
/// let a = identity_hash("Person", &[b"alice@example.com"]);
/// let b = identity_hash("Person", &[b"alice@example.com"]);
/// assert_eq!(a, b);
/// assert_ne!(a, identity_hash("Person", &[b"bob@example.com"]));
/// ```
pub fn identity_hash(type_tag: &str, id_fields: &[&[u8]]) -> IdHash {
    let mut hasher = Sha256::new();
    hasher.update(type_tag.as_bytes());
    for field in id_fields {
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(field);
    }
    IdHash(hasher.finalize().into())
}

/// Verify that content matches the expected hash.
pub fn verify_content(content: &[u8], expected: &Hash) -> bool {
    content_hash(content) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        assert_eq!(content_hash(b"test"), content_hash(b"test"));
    }

    #[test]
    fn content_hash_different_inputs() {
        assert_ne!(content_hash(b"test1"), content_hash(b"test2"));
    }

    #[test]
    fn identity_hash_separates_fields() {
        // ("ab", "c") and ("a", "bc") must not collide
        let a = identity_hash("Topic", &[b"ab", b"c"]);
        let b = identity_hash("Topic", &[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn identity_hash_depends_on_type_tag() {
        let a = identity_hash("Person", &[b"x"]);
        let b = identity_hash("Keyword", &[b"x"]);
        assert_ne!(a, b);
    }

    #[test]
    fn verify_content_detects_tampering() {
        let hash = content_hash(b"verify me");
        assert!(verify_content(b"verify me", &hash));
        assert!(!verify_content(b"tampered", &hash));
    }
}
