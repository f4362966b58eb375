//! Error types for parley-pairing.

use thiserror::Error;

/// Result alias for pairing operations.
pub type PairingResult<T> = std::result::Result<T, PairingError>;

/// Errors that can occur during pairing.
#[derive(Debug, Error)]
pub enum PairingError {
    /// Token never issued by this instance
    #[error("unknown pairing token")]
    UnknownToken,

    /// Token already used once
    #[error("invitation already consumed")]
    InvitationConsumed,

    /// Token past its validity window
    #[error("invitation expired")]
    InvitationExpired,

    /// The peer deviated from the pairing message order
    #[error("pairing protocol violation: {0}")]
    ProtocolViolation(String),

    /// Session setup or frame transfer failed
    #[error("session: {0}")]
    Net(#[from] parley_net::NetError),

    /// Frame encode/decode failed
    #[error("wire: {0}")]
    Wire(#[from] parley_wire::WireError),

    /// Persisting the peer failed
    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),
}

impl PairingError {
    /// The taxonomy name sent to the peer in a token rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            PairingError::UnknownToken => "unknown_token",
            PairingError::InvitationConsumed => "invitation_consumed",
            PairingError::InvitationExpired => "invitation_expired",
            _ => "handshake_failed",
        }
    }

    /// Rebuild a token rejection from the peer's taxonomy name.
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "unknown_token" => PairingError::UnknownToken,
            "invitation_consumed" => PairingError::InvitationConsumed,
            "invitation_expired" => PairingError::InvitationExpired,
            other => PairingError::ProtocolViolation(format!("token rejected: {other}")),
        }
    }
}
