//! CBOR encoding for byte-oriented transports.
//!
//! The manager protocol does not mandate a wire format. Transports that move
//! bytes (sockets, pipes) can use these helpers so both ends agree on one.

use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Upper bound on a decoded message, matching the largest descriptor plus
/// property strings with a wide margin.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Encode a value as CBOR.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR value.
///
/// Rejects input larger than [`MAX_MESSAGE_SIZE`] before parsing.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::Decode(format!(
            "message of {} bytes exceeds limit of {MAX_MESSAGE_SIZE}",
            bytes.len()
        )));
    }
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
