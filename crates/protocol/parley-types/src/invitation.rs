//! The transient pairing invitation and its opaque text form.
//!
//! Invitations are never persisted in the object store. The text handed to
//! the UI is URL-safe base64 of the JSON representation, e.g.
//! `{"token":"<hex-32>","publicKey":"<hex-32>","url":"wss://..."}`.
//!
//! The public key is the accepting **instance's** exchange key, the one
//! that terminates the transport, not the person's.

use base64::Engine;
use parley_crypto::{hex_decode, hex_string, PublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ParleyError};

/// A one-time pairing invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingInvitation {
    /// One-time random secret, hex-encoded.
    pub token: String,
    /// The accepting instance's exchange public key.
    pub public_key: PublicKey,
    /// The endpoint URL to connect to.
    pub url: String,
}

impl PairingInvitation {
    /// Build an invitation from raw token bytes.
    pub fn new(token: [u8; 32], public_key: PublicKey, url: impl Into<String>) -> Self {
        Self { token: hex_string(&token), public_key, url: url.into() }
    }

    /// The raw token bytes.
    pub fn token_bytes(&self) -> Result<[u8; 32], ParleyError> {
        let bytes = hex_decode(&self.token)
            .map_err(|e| ParleyError::new(ErrorKind::UnknownToken, e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| ParleyError::new(ErrorKind::UnknownToken, "token must be 32 bytes"))
    }

    /// Render the opaque URL-safe text handed to the UI.
    pub fn to_text(&self) -> Result<String, ParleyError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ParleyError::new(ErrorKind::Corrupt, e.to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
    }

    /// Parse the opaque text form.
    pub fn from_text(text: &str) -> Result<Self, ParleyError> {
        let json = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(text.trim())
            .map_err(|e| ParleyError::new(ErrorKind::UnknownToken, format!("invitation: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| ParleyError::new(ErrorKind::UnknownToken, format!("invitation: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let invitation = PairingInvitation::new(
            [7u8; 32],
            PublicKey([9u8; 32]),
            "wss://example.org/session",
        );
        let text = invitation.to_text().unwrap();
        assert!(!text.contains('+') && !text.contains('/'));
        assert_eq!(PairingInvitation::from_text(&text).unwrap(), invitation);
    }

    #[test]
    fn garbage_text_rejected() {
        assert!(PairingInvitation::from_text("not base64 !!!").is_err());
    }

    #[test]
    fn token_bytes_round_trip() {
        let invitation = PairingInvitation::new([0xAB; 32], PublicKey([1u8; 32]), "wss://x");
        assert_eq!(invitation.token_bytes().unwrap(), [0xAB; 32]);
    }
}
