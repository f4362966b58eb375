//! Access resolution for the Parley protocol.
//!
//! Given a remote identity, the [`AccessResolver`] computes the set of
//! hashes that peer is permitted to receive:
//!
//! 1. Collect grant records naming the person directly
//! 2. Collect grant records naming a group the person belongs to
//! 3. For each grant, the latest record targeting the same object wins,
//!    which is what makes revocation by superseding record work
//! 4. Close transitively over field references: what an accessible object
//!    references becomes accessible
//! 5. Exclude local-only types (currently `Group`)
//!
//! The resolver is incremental: [`AccessResolver::newly_accessible`]
//! derives the delta a single new grant record contributes without
//! recomputing the full set.

mod resolver;

pub use resolver::AccessResolver;

use thiserror::Error;

/// Result alias for access resolution.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors that can occur resolving access.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Underlying storage fault
    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),
}
