//! Pairing protocol for the Parley protocol.
//!
//! Pairing is the one-time authenticated flow establishing mutual trust
//! between two instances:
//!
//! 1. The accepting instance issues an invitation — a one-time token, its
//!    **instance** exchange key (the key terminating the transport, not
//!    the person's), and an endpoint URL
//! 2. The connecting instance opens a session with connection group
//!    `pairing` and presents the token; unknown or reused tokens abort
//! 3. Both sides exchange identity tuples
//! 4. Both sides issue a trust certificate admitting the peer's person
//!    keys and persist a Profile + Someone for the peer
//!
//! Sessions after pairing use connection group `chum` and never replay
//! the token.

mod error;
mod invitations;
mod protocol;

pub use error::{PairingError, PairingResult};
pub use invitations::InvitationRegistry;
pub use protocol::{record_peer, run_initiator, run_responder, PairedPeer};
