//! Error types for parley-ops.

use parley_types::ErrorKind;
use thiserror::Error;

/// Result alias for node operations.
pub type OpsResult<T> = std::result::Result<T, OpsError>;

/// Errors surfacing from the operations layer.
#[derive(Debug, Error)]
pub enum OpsError {
    /// Operation issued before a local identity exists
    #[error("not authenticated: no local identity")]
    NotAuthenticated,

    /// No route to the peer: never paired, or no endpoint recorded
    #[error("no route to peer {0}")]
    NoRoute(String),

    /// Storage fault
    #[error(transparent)]
    Store(#[from] parley_store::StoreError),

    /// Access resolution fault
    #[error(transparent)]
    Access(#[from] parley_access::AccessError),

    /// Transport or session fault
    #[error(transparent)]
    Net(#[from] parley_net::NetError),

    /// Pairing fault
    #[error(transparent)]
    Pairing(#[from] parley_pairing::PairingError),

    /// Sync fault
    #[error(transparent)]
    Chum(#[from] parley_chum::ChumError),

    /// Topic fabric fault
    #[error(transparent)]
    Topic(#[from] parley_topics::TopicError),

    /// Analysis fault
    #[error(transparent)]
    Analysis(#[from] parley_analysis::AnalysisError),

    /// Protocol-level fault
    #[error(transparent)]
    Core(#[from] parley_types::ParleyError),
}

impl OpsError {
    /// Map onto the protocol error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::NotAuthenticated => ErrorKind::NotAuthenticated,
            OpsError::NoRoute(_) => ErrorKind::NotFound,
            OpsError::Store(parley_store::StoreError::Fatal(_)) => ErrorKind::Fatal,
            OpsError::Store(parley_store::StoreError::HashMismatch { .. }) => ErrorKind::Corrupt,
            OpsError::Store(_) => ErrorKind::Fatal,
            OpsError::Access(_) => ErrorKind::AccessDenied,
            OpsError::Net(parley_net::NetError::TransportLost) => ErrorKind::TransportLost,
            OpsError::Net(_) => ErrorKind::HandshakeFailed,
            OpsError::Pairing(parley_pairing::PairingError::UnknownToken) => ErrorKind::UnknownToken,
            OpsError::Pairing(parley_pairing::PairingError::InvitationConsumed) => {
                ErrorKind::InvitationConsumed
            }
            OpsError::Pairing(parley_pairing::PairingError::InvitationExpired) => {
                ErrorKind::InvitationExpired
            }
            OpsError::Pairing(_) => ErrorKind::HandshakeFailed,
            OpsError::Chum(parley_chum::ChumError::Corrupt { .. }) => ErrorKind::Corrupt,
            OpsError::Chum(_) => ErrorKind::TransportLost,
            OpsError::Topic(parley_topics::TopicError::NotAuthor { .. }) => ErrorKind::NotAuthor,
            OpsError::Topic(parley_topics::TopicError::UnknownTopic(_)) => ErrorKind::UnknownTopic,
            OpsError::Topic(_) => ErrorKind::NotFound,
            OpsError::Analysis(parley_analysis::AnalysisError::Malformed(_)) => {
                ErrorKind::MalformedAnalysis
            }
            OpsError::Analysis(parley_analysis::AnalysisError::Config(e)) => e.kind,
            OpsError::Analysis(_) => ErrorKind::MalformedAnalysis,
            OpsError::Core(e) => e.kind,
        }
    }
}
