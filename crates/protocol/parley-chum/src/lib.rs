//! Object synchronization for the Parley protocol.
//!
//! CHUM runs symmetrically on both ends of an established `chum` session:
//!
//! - **ANNOUNCE** newly accessible objects to the peer
//! - **REQUEST** announced objects we lack; each request carries an
//!   implicit credit for exactly one **DELIVER**
//! - **DELIVER** objects back on request, after checking access at
//!   delivery time; refuse with **DENY** without leaking existence
//! - Verify every delivered object against its claimed hash; a mismatch
//!   is `Corrupt`, drops the session, and quarantines the hash
//! - Buffer received objects whose in-flight references have not yet
//!   arrived, releasing them in causal order
//! - Never emit objects of local-only types, whatever the resolver says
//!
//! The send side prescribes no order; correctness rests on the receive
//! side's reference buffering.

mod engine;
mod error;

pub use engine::{ChumEngine, ChumHandle, ChumStats};
pub use error::{ChumError, ChumResult};
