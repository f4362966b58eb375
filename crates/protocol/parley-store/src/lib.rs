//! Local object storage for the Parley protocol.
//!
//! This crate persists the content-addressed object graph:
//!
//! - **Object log** (filesystem): append-only, checksummed records of
//!   canonical object bytes, segmented by 64 MiB
//! - **Reverse-map log** (filesystem): inverted `referenced → referencing`
//!   index in parallel segmentation, with per-segment checksum sidecars
//! - **Version index** (filesystem): small append-only map from identity
//!   hash to current version hash
//! - **Keychain** (filesystem): secret keys wrapped at rest, plus trusted
//!   peer keys admitted at pairing
//!
//! # Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── objects/
//! │   ├── seg-00000.log        # append-only object records
//! │   └── seg-00001.log
//! ├── rmap/
//! │   ├── seg-00000.rmap       # reverse-map records for object seg 0
//! │   ├── seg-00000.sum        # segment checksum sidecar
//! │   └── ...
//! ├── versions.idx             # id_hash → current version hash
//! ├── keychain.json            # wrapped secret keys
//! └── local.key                # instance wrapping secret
//! ```
//!
//! The object log is canonical. On startup a recovery pass drops a
//! partially written tail record and rebuilds any reverse-map segment
//! whose sidecar checksum is missing or disagrees, by re-scanning the
//! matching object-log segment.
//!
//! # Example
//!
//! ```no_run
//! use parley_store::ObjectStore;
//! use parley_types::{ChatMessage, Object};
//! use parley_crypto::IdHash;
//!
//! let store = ObjectStore::open("/tmp/parley-data").unwrap();
//! let message = ChatMessage {
//!     author: IdHash([1u8; 32]),
//!     text: "hello".into(),
//!     attachments: vec![],
//!     source: None,
//! };
//! let hash = store.put_unversioned(Object::ChatMessage(message)).unwrap();
//! assert!(store.get(&hash).unwrap().is_some());
//! ```

mod error;
mod events;
mod keychain;
mod log;
mod rmap;
mod store;
mod versions;

pub use error::{Result, StoreError};
pub use events::StoreEvent;
pub use keychain::Keychain;
pub use store::ObjectStore;
