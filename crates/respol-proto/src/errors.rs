//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while validating or (de)serializing wire values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Raw resource kind code outside the known range
    #[error("unknown resource kind code {0}")]
    UnknownResourceKind(u32),

    /// Resource kind name that matches no known kind
    #[error("unknown resource kind name {0:?}")]
    UnknownResourceKindName(String),

    /// Raw request kind code outside the known range
    #[error("unknown request kind code {0}")]
    UnknownRequestKind(u8),

    /// CBOR encoding failed
    #[error("CBOR encode failed: {0}")]
    Encode(String),

    /// CBOR decoding failed
    #[error("CBOR decode failed: {0}")]
    Decode(String),
}
