//! Store events.
//!
//! Every successful put emits an event on a bounded broadcast channel.
//! Reverse-map updates for the object are always visible before its event
//! fires. Slow consumers lag and lose the oldest events rather than
//! blocking writers.

use parley_crypto::{Hash, IdHash};

/// Events emitted by the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreEvent {
    /// A new unversioned object was persisted.
    NewUnversioned {
        hash: Hash,
        /// The object's type tag.
        object_type: String,
    },

    /// A new version of an identity was persisted and became the head.
    NewVersion {
        id: IdHash,
        version: Hash,
        /// The object's type tag.
        object_type: String,
    },
}

impl StoreEvent {
    /// The content hash of the persisted object.
    pub fn hash(&self) -> Hash {
        match self {
            StoreEvent::NewUnversioned { hash, .. } => *hash,
            StoreEvent::NewVersion { version, .. } => *version,
        }
    }

    /// The object's type tag.
    pub fn object_type(&self) -> &str {
        match self {
            StoreEvent::NewUnversioned { object_type, .. } => object_type,
            StoreEvent::NewVersion { object_type, .. } => object_type,
        }
    }
}
