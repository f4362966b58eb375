//! Topic and channel fabric for the Parley protocol.
//!
//! A topic aggregates every channel sharing its topic id:
//!
//! - **2-party topics** are identified by
//!   `smaller(personA, personB) || "<->" || larger(personA, personB)` and
//!   have exactly one channel with no owner; both parties append to it
//! - **N-party topics** (N ≥ 3) carry a slug-derived id; each participant
//!   owns exactly one channel and appends only to their own, and a Group
//!   object scopes access for all of them
//!
//! Reading a topic merges all its channel chains by timestamp, ties
//! broken by author id bytes, so every honest replica orders messages
//! identically.

mod error;
mod fabric;
mod slug;

pub use error::{TopicError, TopicResult};
pub use fabric::{TopicFabric, TopicMessage, TopicView};
pub use slug::slugify;
