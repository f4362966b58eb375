//! Wire format for the Parley protocol.
//!
//! Post-handshake session traffic is length-prefixed encrypted frames:
//!
//! ```text
//! [length: u32 BE] [ciphertext]
//! ```
//!
//! where the plaintext is UTF-8 JSON tagged by a `type` field (sync
//! frames) or a `command` field (handshake, pairing, and relay frames).
//!
//! # Module Organization
//!
//! - [`message`] - Frame and command types
//! - [`encoding`] - JSON encode/decode plus length-prefix framing
//! - [`error`] - Encode/decode error types

mod encoding;
mod error;
mod message;

pub use encoding::{decode_command, decode_frame, encode_command, encode_frame, frame_bytes, unframe_bytes};
pub use error::WireError;
pub use message::{
    CommandFrame, ConnectionGroup, IdentityTuple, RelayCommand, SyncFrame, CONNECTION_GROUP_COMMAND,
};
