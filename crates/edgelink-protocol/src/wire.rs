//! Wire format: length-prefixed bincode v2 frames.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian length][bincode v2 payload]

use bincode::{Decode, Encode};

use crate::error::{DecodeError, ProtocolError};

/// Maximum message size (1 MiB). Prevents allocation bombs.
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Encode a message to a length-prefixed byte vector.
pub fn encode_message<T: Encode>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let config = bincode::config::standard();
    let payload = bincode::encode_to_vec(msg, config)
        .map_err(|e| ProtocolError::Serialization(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::Serialization("message too large".to_string()))?;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Serialization(format!(
            "message size {len} exceeds maximum {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decode a message from a bincode v2 payload (without the length prefix).
///
/// The payload must be consumed exactly; trailing bytes mean the frame
/// length lied about its contents.
pub fn decode_message<T: Decode<()>>(payload: &[u8]) -> Result<T, DecodeError> {
    let config = bincode::config::standard();
    let (msg, consumed) =
        bincode::decode_from_slice(payload, config).map_err(classify_decode_error)?;
    if consumed != payload.len() {
        return Err(DecodeError::BadLength);
    }
    Ok(msg)
}

fn classify_decode_error(err: bincode::error::DecodeError) -> DecodeError {
    match err {
        bincode::error::DecodeError::UnexpectedEnd { .. } => DecodeError::Truncated,
        bincode::error::DecodeError::UnexpectedVariant { .. } => DecodeError::UnknownKind,
        _ => DecodeError::BadLength,
    }
}
