//! Shared test fixtures for the Parley protocol.
//!
//! Provides convenience functions for generating test identities, paired
//! node pairs, in-process session pairs, and canned model output.

pub mod helpers;

pub use helpers::*;
