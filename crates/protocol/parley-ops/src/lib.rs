//! Instance context and operations for the Parley protocol.
//!
//! [`Node`] is the single context value binding the object store,
//! keychain, access resolver, session listener, sync engines, topic
//! fabric, and analysis pipeline. There is no ambient state: every
//! component lifecycle hangs off one `Node`.
//!
//! The query surface consumed by UIs and the CLI lives here:
//! contacts, topics, messages, invitations, proposals, and the proposal
//! configuration.

mod config;
mod error;
mod identity;
mod node;

pub use config::{LlmSettings, NodeConfig};
pub use error::{OpsError, OpsResult};
pub use identity::LocalIdentity;
pub use node::{ContactView, Node, StatusView};
