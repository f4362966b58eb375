//! The protocol error taxonomy.
//!
//! [`ErrorKind`] is the closed set of conditions the protocol
//! distinguishes; [`ParleyError`] pairs a kind with context. Per-crate
//! error enums convert into this type at the operations boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The protocol-level error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// Object or identity missing locally; recoverable by sync.
    NotFound,
    /// Attempt to append to a channel one does not own.
    NotAuthor,
    /// Operation issued before a local identity exists.
    NotAuthenticated,
    /// The requested topic does not exist locally.
    UnknownTopic,
    /// Decryption, nonce mismatch, or protocol-order violation during setup.
    HandshakeFailed,
    /// Pairing token already used.
    InvitationConsumed,
    /// Pairing token past its validity window.
    InvitationExpired,
    /// Pairing token never issued here.
    UnknownToken,
    /// Request for an object the peer is not permitted to receive.
    AccessDenied,
    /// Delivered object's recomputed hash disagrees with the claimed hash.
    Corrupt,
    /// Peer disconnected; recoverable by reconnect.
    TransportLost,
    /// LLM output failed to parse; nothing was persisted.
    MalformedAnalysis,
    /// Proposal configuration weights are unusable.
    InvalidWeights,
    /// Keychain missing or on-disk log corruption beyond recovery.
    Fatal,
}

impl ErrorKind {
    /// Whether a session hitting this error should retry after backoff
    /// rather than drop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NotFound | ErrorKind::TransportLost)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotAuthor => "not_author",
            ErrorKind::NotAuthenticated => "not_authenticated",
            ErrorKind::UnknownTopic => "unknown_topic",
            ErrorKind::HandshakeFailed => "handshake_failed",
            ErrorKind::InvitationConsumed => "invitation_consumed",
            ErrorKind::InvitationExpired => "invitation_expired",
            ErrorKind::UnknownToken => "unknown_token",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::TransportLost => "transport_lost",
            ErrorKind::MalformedAnalysis => "malformed_analysis",
            ErrorKind::InvalidWeights => "invalid_weights",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A protocol error: a taxonomy kind plus human-readable context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ParleyError {
    /// The taxonomy kind.
    pub kind: ErrorKind,
    /// Context for operators and logs.
    pub message: String,
}

impl ParleyError {
    /// Create an error with context.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, what.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = ParleyError::new(ErrorKind::AccessDenied, "hash abc");
        assert_eq!(err.to_string(), "access_denied: hash abc");
    }

    #[test]
    fn transport_loss_is_retryable() {
        assert!(ErrorKind::TransportLost.is_retryable());
        assert!(!ErrorKind::Corrupt.is_retryable());
    }
}
