//! Error types for parley-chum.

use parley_crypto::Hash;
use thiserror::Error;

/// Result alias for sync operations.
pub type ChumResult<T> = std::result::Result<T, ChumError>;

/// Errors that can occur in the sync engine.
#[derive(Debug, Error)]
pub enum ChumError {
    /// A delivered object's bytes hash to something else. The session is
    /// dropped and the hash quarantined.
    #[error("corrupt delivery for {claimed}: bytes hash to {actual}")]
    Corrupt { claimed: Hash, actual: Hash },

    /// Session transport fault
    #[error("session: {0}")]
    Net(#[from] parley_net::NetError),

    /// Frame encode/decode fault
    #[error("wire: {0}")]
    Wire(#[from] parley_wire::WireError),

    /// Storage fault
    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),

    /// Access resolution fault
    #[error("access: {0}")]
    Access(#[from] parley_access::AccessError),

    /// The peer was silent past twice the idle interval
    #[error("peer idle past deadline")]
    IdleExpired,

    /// Runtime fault inside the engine, e.g. a lost worker task
    #[error("internal: {0}")]
    Internal(String),
}
