//! Keypair generation for signing and key-exchange identities.
//!
//! Every person and every instance carries two keypairs: an Ed25519
//! signing keypair and an X25519 key-exchange keypair. The exchange keypair
//! terminates session transports; the signing keypair authenticates
//! objects and relay challenges.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::{PublicKey, Signature};

/// An Ed25519 signing keypair.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SignKeypair {
    secret: [u8; 32],
}

impl SignKeypair {
    /// Generate a new signing keypair from the OS random number generator.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self { secret: signing_key.to_bytes() }
    }

    /// Restore a keypair from its secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self { secret: bytes }
    }

    /// The secret key bytes. Handle with care.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The public verifying key.
    pub fn public(&self) -> PublicKey {
        let signing_key = SigningKey::from_bytes(&self.secret);
        PublicKey(signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::from_bytes(&self.secret);
        Signature(signing_key.sign(message).to_bytes())
    }

    /// Verify a signature against a public key.
    pub fn verify(
        public: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> Result<(), CryptoError> {
        let verifying_key = VerifyingKey::from_bytes(&public.0)
            .map_err(|_| CryptoError::SignatureVerificationFailed)?;
        let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl std::fmt::Debug for SignKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SignKeypair(public: {})", self.public())
    }
}

/// An X25519 key-exchange keypair.
///
/// Used both for long-term instance keys (static) and for the per-session
/// ephemeral keys consumed by the handshake.
#[derive(Clone)]
pub struct ExchangeKeypair {
    secret: StaticSecret,
    public: X25519Public,
}

impl ExchangeKeypair {
    /// Generate a new exchange keypair from the OS random number generator.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// Restore a keypair from its secret bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    /// The secret key bytes. Handle with care.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// The public key.
    pub fn public(&self) -> PublicKey {
        PublicKey(self.public.to_bytes())
    }

    /// Compute the raw X25519 shared secret with a peer's public key.
    ///
    /// Callers should not use this directly as an encryption key; run it
    /// through [`crate::derive_static_key`] or [`crate::derive_session_key`].
    pub fn shared_secret(&self, peer: &PublicKey) -> [u8; 32] {
        let their_public = X25519Public::from(peer.0);
        self.secret.diffie_hellman(&their_public).to_bytes()
    }
}

impl std::fmt::Debug for ExchangeKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExchangeKeypair(public: {})", self.public())
    }
}

/// Generate a 32-byte cryptographically random token.
///
/// Used for one-time pairing invitation secrets.
pub fn random_token() -> [u8; 32] {
    let mut token = [0u8; 32];
    OsRng.fill_bytes(&mut token);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let keypair = SignKeypair::generate();
        let sig = keypair.sign(b"message");
        assert!(SignKeypair::verify(&keypair.public(), b"message", &sig).is_ok());
        assert!(SignKeypair::verify(&keypair.public(), b"other", &sig).is_err());
    }

    #[test]
    fn shared_secret_agrees() {
        let a = ExchangeKeypair::generate();
        let b = ExchangeKeypair::generate();
        assert_eq!(a.shared_secret(&b.public()), b.shared_secret(&a.public()));
    }

    #[test]
    fn keypair_restores_from_secret() {
        let a = ExchangeKeypair::generate();
        let restored = ExchangeKeypair::from_secret_bytes(a.secret_bytes());
        assert_eq!(a.public(), restored.public());
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(random_token(), random_token());
    }
}
