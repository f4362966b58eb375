//! JSON frame encoding and length-prefix framing.
//!
//! Each transport-level frame is `len(u32 BE) || ciphertext`. This module
//! handles the plaintext JSON and the prefix; encryption happens in the
//! session layer between the two.

use serde::de::DeserializeOwned;

use parley_types::MAX_FRAME_SIZE;

use crate::error::WireError;
use crate::message::{CommandFrame, SyncFrame};

/// Serialize a sync frame to plaintext bytes.
pub fn encode_frame(frame: &SyncFrame) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(frame).map_err(|e| WireError::Encode(e.to_string()))
}

/// Deserialize a sync frame from plaintext bytes.
pub fn decode_frame(bytes: &[u8]) -> Result<SyncFrame, WireError> {
    serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// Serialize a command frame to plaintext bytes.
pub fn encode_command(frame: &CommandFrame) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(frame).map_err(|e| WireError::Encode(e.to_string()))
}

/// Deserialize any `command`-tagged frame from plaintext bytes.
pub fn decode_command<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

/// Prepend the big-endian length prefix to a ciphertext.
pub fn frame_bytes(ciphertext: &[u8]) -> Result<Vec<u8>, WireError> {
    if ciphertext.len() > MAX_FRAME_SIZE as usize {
        return Err(WireError::FrameTooLarge { actual: ciphertext.len(), max: MAX_FRAME_SIZE });
    }
    let mut out = Vec::with_capacity(4 + ciphertext.len());
    out.extend_from_slice(&(ciphertext.len() as u32).to_be_bytes());
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Strip and validate the length prefix, returning the ciphertext.
pub fn unframe_bytes(frame: &[u8]) -> Result<&[u8], WireError> {
    if frame.len() < 4 {
        return Err(WireError::Truncated { expected: 4, actual: frame.len() });
    }
    let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge { actual: len as usize, max: MAX_FRAME_SIZE });
    }
    let body = &frame[4..];
    if body.len() != len as usize {
        return Err(WireError::Truncated { expected: len as usize, actual: body.len() });
    }
    Ok(body)
}
