//! Transports and encrypted sessions for the Parley protocol.
//!
//! A session is a bidirectional stream of length-prefixed encrypted
//! frames over one of two interchangeable transports:
//!
//! - **Direct WebSocket** to a known URL ([`transport::WsTransport`])
//! - **Relay**: both endpoints connect to a relay service as clients; the
//!   relay forwards by target public key ([`relay::RelayTransport`])
//!
//! One session carries exactly one symmetric key from an ephemeral X25519
//! exchange. Frame confidentiality is XChaCha20-Poly1305 with
//! counter-derived nonces: the responder sends even counters and expects
//! odd, the initiator sends odd and expects even. See [`session`] for the
//! handshake.

pub mod config;
pub mod error;
pub mod relay;
pub mod session;
pub mod transport;

pub use config::NetConfig;
pub use error::{NetError, NetResult};
pub use relay::{RelayServer, RelayTransport};
pub use session::{
    initiate, respond, respond_any, CipherState, Role, Session, SessionReader, SessionWriter,
};
pub use transport::{
    memory_transport_pair, Transport, TransportReader, TransportWriter, WsListener, WsTransport,
};
