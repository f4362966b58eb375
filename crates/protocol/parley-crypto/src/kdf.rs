//! Key derivation.
//!
//! Raw X25519 shared secrets are never used as encryption keys directly;
//! they pass through HKDF-SHA256 with a purpose label:
//!
//! - static keys protect handshake envelopes between long-term instance keys
//! - session keys protect frames after the ephemeral exchange
//! - wrapping keys protect secret keys at rest in the keychain

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{ExchangeKeypair, PublicKey, SymmetricKey};

const STATIC_INFO: &[u8] = b"parley-static-key";
const SESSION_INFO: &[u8] = b"parley-session-key";
const WRAPPING_INFO: &[u8] = b"parley-keychain-wrap";

fn expand(secret: &[u8], info: &[u8]) -> SymmetricKey {
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut key = [0u8; 32];
    hk.expand(info, &mut key)
        .expect("32 bytes is within HKDF-SHA256 output limit");
    SymmetricKey::from_bytes(key)
}

/// Derive the static symmetric key between two long-term instance keys.
///
/// Both sides compute the same key from their own secret and the peer's
/// public key; it protects only the handshake envelopes.
pub fn derive_static_key(own: &ExchangeKeypair, peer: &PublicKey) -> SymmetricKey {
    expand(&own.shared_secret(peer), STATIC_INFO)
}

/// Derive the session key from the ephemeral exchange.
pub fn derive_session_key(own_ephemeral: &ExchangeKeypair, peer_ephemeral: &PublicKey) -> SymmetricKey {
    expand(&own_ephemeral.shared_secret(peer_ephemeral), SESSION_INFO)
}

/// Derive the keychain wrapping key from the local instance secret.
pub fn derive_wrapping_key(instance_secret: &[u8; 32]) -> SymmetricKey {
    expand(instance_secret, WRAPPING_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_key_agrees_across_sides() {
        let a = ExchangeKeypair::generate();
        let b = ExchangeKeypair::generate();
        let key_a = derive_static_key(&a, &b.public());
        let key_b = derive_static_key(&b, &a.public());
        assert_eq!(key_a.as_bytes(), key_b.as_bytes());
    }

    #[test]
    fn static_and_session_keys_differ() {
        let a = ExchangeKeypair::generate();
        let b = ExchangeKeypair::generate();
        let static_key = derive_static_key(&a, &b.public());
        let session_key = derive_session_key(&a, &b.public());
        assert_ne!(static_key.as_bytes(), session_key.as_bytes());
    }
}
