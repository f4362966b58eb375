//! Error types for parley-net.

use thiserror::Error;

/// Result alias for networking operations.
pub type NetResult<T> = std::result::Result<T, NetError>;

/// Errors that can occur in transports and sessions.
#[derive(Debug, Error)]
pub enum NetError {
    /// Underlying websocket or socket fault
    #[error("transport: {0}")]
    Transport(String),

    /// The peer disconnected; recoverable by reconnect
    #[error("transport lost")]
    TransportLost,

    /// Decryption, nonce mismatch, or protocol-order violation during setup
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A handshake step exceeded its wall-clock budget
    #[error("handshake step timed out")]
    HandshakeTimeout,

    /// A frame failed to decrypt mid-session
    #[error("frame failed to decrypt (nonce or key mismatch)")]
    DecryptFailed,

    /// Frame encoding or decoding fault
    #[error("wire: {0}")]
    Wire(#[from] parley_wire::WireError),

    /// The relay rejected or mishandled a control command
    #[error("relay: {0}")]
    Relay(String),

    /// Endpoint URL could not be parsed
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
}

impl NetError {
    /// Whether reconnecting may clear the condition.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, NetError::TransportLost | NetError::Transport(_))
    }
}
