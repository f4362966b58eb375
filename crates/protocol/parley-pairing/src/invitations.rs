//! One-time invitation tokens.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use parley_crypto::{random_token, PublicKey};
use parley_types::{PairingInvitation, INVITATION_TTL};
use tracing::debug;

use crate::error::{PairingError, PairingResult};

struct TokenState {
    issued_at: Instant,
    consumed: bool,
}

/// Issues and validates one-time pairing tokens.
///
/// Internally synchronized; the accepting instance shares one registry
/// across its listener tasks.
pub struct InvitationRegistry {
    tokens: Mutex<HashMap<[u8; 32], TokenState>>,
    ttl: Duration,
}

impl InvitationRegistry {
    /// Create a registry with the default invitation TTL.
    pub fn new() -> Self {
        Self::with_ttl(INVITATION_TTL)
    }

    /// Create a registry with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { tokens: Mutex::new(HashMap::new()), ttl }
    }

    /// Issue a fresh invitation carrying the accepting instance's exchange
    /// key and endpoint URL.
    pub fn create(&self, instance_key: PublicKey, url: impl Into<String>) -> PairingInvitation {
        let token = random_token();
        self.tokens
            .lock()
            .expect("token lock")
            .insert(token, TokenState { issued_at: Instant::now(), consumed: false });
        debug!("issued pairing invitation");
        PairingInvitation::new(token, instance_key, url)
    }

    /// Validate and consume a presented token.
    ///
    /// The consumed marker survives so a replay reports
    /// `InvitationConsumed` rather than `UnknownToken`.
    pub fn consume(&self, token: &[u8; 32]) -> PairingResult<()> {
        let mut tokens = self.tokens.lock().expect("token lock");
        let state = tokens.get_mut(token).ok_or(PairingError::UnknownToken)?;
        if state.consumed {
            return Err(PairingError::InvitationConsumed);
        }
        if state.issued_at.elapsed() > self.ttl {
            return Err(PairingError::InvitationExpired);
        }
        state.consumed = true;
        Ok(())
    }

    /// Invalidate a token, e.g. when the operator cancels the pairing.
    pub fn cancel(&self, token: &[u8; 32]) {
        self.tokens.lock().expect("token lock").remove(token);
    }
}

impl Default for InvitationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_consumes_exactly_once() {
        let registry = InvitationRegistry::new();
        let invitation = registry.create(PublicKey([1u8; 32]), "wss://x");
        let token = invitation.token_bytes().unwrap();

        assert!(registry.consume(&token).is_ok());
        assert!(matches!(registry.consume(&token), Err(PairingError::InvitationConsumed)));
    }

    #[test]
    fn unknown_token_is_distinguished() {
        let registry = InvitationRegistry::new();
        assert!(matches!(registry.consume(&[9u8; 32]), Err(PairingError::UnknownToken)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let registry = InvitationRegistry::with_ttl(Duration::from_millis(0));
        let invitation = registry.create(PublicKey([1u8; 32]), "wss://x");
        let token = invitation.token_bytes().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(registry.consume(&token), Err(PairingError::InvitationExpired)));
    }

    #[test]
    fn cancelled_token_becomes_unknown() {
        let registry = InvitationRegistry::new();
        let invitation = registry.create(PublicKey([1u8; 32]), "wss://x");
        let token = invitation.token_bytes().unwrap();
        registry.cancel(&token);
        assert!(matches!(registry.consume(&token), Err(PairingError::UnknownToken)));
    }
}
