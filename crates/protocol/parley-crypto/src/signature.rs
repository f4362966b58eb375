//! Message signing and verification.

use crate::error::CryptoError;
use crate::{PublicKey, SignKeypair, Signature};

/// Sign a message with a signing keypair.
pub fn sign(keypair: &SignKeypair, message: &[u8]) -> Signature {
    keypair.sign(message)
}

/// Verify a signature over a message.
pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    SignKeypair::verify(public, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tampered_message_rejected() {
        let keypair = SignKeypair::generate();
        let sig = sign(&keypair, b"relay challenge");
        assert!(verify(&keypair.public(), b"relay challenge", &sig).is_ok());
        assert!(verify(&keypair.public(), b"relay challengE", &sig).is_err());
    }

    #[test]
    fn wrong_key_rejected() {
        let keypair = SignKeypair::generate();
        let other = SignKeypair::generate();
        let sig = sign(&keypair, b"data");
        assert!(verify(&other.public(), b"data", &sig).is_err());
    }
}
