//! Error types for parley-wire.

use thiserror::Error;

/// Errors that can occur encoding or decoding frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// Frame serialization failed
    #[error("encode failed: {0}")]
    Encode(String),

    /// Frame deserialization failed
    #[error("decode failed: {0}")]
    Decode(String),

    /// Frame exceeds the maximum frame size
    #[error("frame too large: {actual} > {max}")]
    FrameTooLarge { actual: usize, max: u32 },

    /// Length prefix disagrees with the available bytes
    #[error("truncated frame: prefix says {expected}, got {actual}")]
    Truncated { expected: usize, actual: usize },
}
