//! Data structures for the Parley protocol.
//!
//! This crate provides all persisted entity types used across the Parley
//! protocol. It contains no business logic, only type definitions with
//! serialization support and the recipes that drive content addressing.
//!
//! # Module Organization
//!
//! - [`object`] - The tagged [`Object`] sum type and addressing recipes
//! - [`person`] - Identity entities (Person, Keys, Instance, Profile, ...)
//! - [`access`] - Grant records and local-only groups
//! - [`channel`] - Channels, entries, topics, messages, attachments
//! - [`analysis`] - Subjects, keywords, summaries, proposal configuration
//! - [`invitation`] - The transient pairing invitation and its text form
//! - [`constants`] - Protocol constants (limits, timing, defaults)
//! - [`error`] - The protocol error taxonomy
//!
//! # Type Conventions
//!
//! - Derive `Debug`, `Clone`, `PartialEq` where appropriate
//! - Derive `Serialize`, `Deserialize` for every persisted type
//! - Use `#[serde(rename_all = "camelCase")]` for consistent JSON
//! - Hash-valued fields use [`parley_crypto::Hash`] / [`parley_crypto::IdHash`],
//!   which render as lowercase hex
//! - Versioned entities implement [`Versioned`] and declare their id fields;
//!   unversioned entities implement [`Unversioned`]

/// Protocol version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod access;
pub mod analysis;
pub mod channel;
pub mod constants;
pub mod error;
pub mod invitation;
pub mod object;
pub mod person;

pub use access::{Access, Group, IdAccess};
pub use analysis::{AnalysisConfig, Keyword, Subject, Summary};
pub use channel::{Blob, Channel, ChannelEntry, ChatMessage, Clob, Topic};
pub use constants::*;
pub use error::{ErrorKind, ParleyError};
pub use invitation::PairingInvitation;
pub use object::{referenced_hashes, Object, ObjectType, Unversioned, Versioned};
pub use person::{Instance, InstanceEndpoint, Keys, Llm, Person, Profile, Someone, TrustCertificate};

/// The identity hash of a Person object.
pub type PersonId = parley_crypto::IdHash;

/// The identity hash of an Instance object.
pub type InstanceId = parley_crypto::IdHash;
