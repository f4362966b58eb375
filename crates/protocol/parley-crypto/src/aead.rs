//! Authenticated encryption with XChaCha20-Poly1305.
//!
//! Session frames use counter-derived 24-byte nonces; handshake envelopes
//! use random nonces carried alongside the ciphertext.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;
use crate::{SymmetricKey, NONCE_SIZE, TAG_SIZE};

/// Encrypt plaintext under an explicit nonce.
pub fn seal(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

/// Decrypt ciphertext under an explicit nonce.
pub fn open(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt with a fresh random nonce, returning `nonce || ciphertext`.
///
/// This is the handshake envelope format: for a 32-byte plaintext the
/// result is 24 + 32 + 16 = 72 bytes.
pub fn seal_enveloped(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = seal(key, &nonce, plaintext)?;
    let mut envelope = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt a `nonce || ciphertext` envelope produced by [`seal_enveloped`].
pub fn open_enveloped(key: &SymmetricKey, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::EnvelopeTooShort(envelope.len()));
    }
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&envelope[..NONCE_SIZE]);
    open(key, &nonce, &envelope[NONCE_SIZE..])
}

/// Generate a random 24-byte nonce.
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Build the session-frame nonce for a counter value.
///
/// The nonce is all zeros except the counter, written little-endian
/// growing from the final byte: counter 5 yields 23 zero bytes followed by
/// 0x05. Counters above 255 spill into earlier bytes.
pub fn counter_nonce(counter: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    for (i, byte) in counter.to_le_bytes().iter().enumerate() {
        nonce[NONCE_SIZE - 1 - i] = *byte;
    }
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn seal_open_round_trip() {
        let k = key(42);
        let nonce = counter_nonce(7);
        let ct = seal(&k, &nonce, b"hello session").unwrap();
        assert_eq!(open(&k, &nonce, &ct).unwrap(), b"hello session");
    }

    #[test]
    fn wrong_key_fails() {
        let nonce = counter_nonce(0);
        let ct = seal(&key(42), &nonce, b"secret").unwrap();
        assert!(open(&key(99), &nonce, &ct).is_err());
    }

    #[test]
    fn wrong_nonce_fails() {
        let k = key(42);
        let ct = seal(&k, &counter_nonce(0), b"secret").unwrap();
        assert!(open(&k, &counter_nonce(1), &ct).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let k = key(42);
        let nonce = counter_nonce(2);
        let mut ct = seal(&k, &nonce, b"secret").unwrap();
        ct[0] ^= 0xff;
        assert!(open(&k, &nonce, &ct).is_err());
    }

    #[test]
    fn envelope_round_trip_is_72_bytes_for_key_material() {
        let k = key(3);
        let envelope = seal_enveloped(&k, &[0xAA; 32]).unwrap();
        assert_eq!(envelope.len(), 72);
        assert_eq!(open_enveloped(&k, &envelope).unwrap(), vec![0xAA; 32]);
    }

    #[test]
    fn short_envelope_rejected() {
        assert!(matches!(
            open_enveloped(&key(1), &[0u8; 10]),
            Err(CryptoError::EnvelopeTooShort(10))
        ));
    }

    #[test]
    fn counter_nonce_layout() {
        let nonce = counter_nonce(5);
        assert_eq!(&nonce[..23], &[0u8; 23]);
        assert_eq!(nonce[23], 5);

        // 0x0102 spans the last two bytes, least-significant last.
        let nonce = counter_nonce(0x0102);
        assert_eq!(nonce[23], 0x02);
        assert_eq!(nonce[22], 0x01);
        assert_eq!(&nonce[..22], &[0u8; 22]);
    }
}
