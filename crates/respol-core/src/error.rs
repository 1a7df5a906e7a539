//! Error types for the resource set client.

use std::convert::Infallible;

use respol_proto::ProtocolError;
use thiserror::Error;

/// Failures reported by a [`crate::Transport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The manager could not be reached
    #[error("policy manager unreachable: {0}")]
    Unreachable(String),

    /// The connection is closed
    #[error("connection to policy manager closed")]
    Closed,

    /// Lower-level I/O failure
    #[error("transport I/O error: {0}")]
    Io(String),
}

/// Synchronous failures of the resource set API.
///
/// Arbitration outcomes (denied, lost) and manager-reported errors are not
/// errors here; they arrive as [`crate::ResourceSetEvent`]s.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceSetError {
    /// A policy flag was changed after the set started talking to the manager
    #[error("{flag} can only be set before the first acquire, update or release")]
    PolicyLatched {
        /// Flag the caller tried to set
        flag: &'static str,
    },

    /// Acquire was called on a set without resources
    #[error("resource set has no resources to acquire")]
    EmptySet,

    /// The kind passed to add_resource is not a known resource kind
    #[error("invalid resource kind: {0}")]
    InvalidResourceKind(#[from] ProtocolError),

    /// The transport could not connect to or reach the manager
    #[error("cannot reach policy manager: {0}")]
    Connection(#[from] TransportError),

    /// Event delivered to a set that no longer exists
    #[error("resource set was dropped")]
    SetDropped,
}

impl From<Infallible> for ResourceSetError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}
