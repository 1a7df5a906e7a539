//! Transport abstraction towards the policy manager.
//!
//! The client only needs three primitives: connect a set, send one of its
//! requests, and disconnect it. Framing, reconnection backoff and the wire
//! format belong to the implementation. Production transports wrap an IPC
//! channel; tests use the simulated manager in `respol-harness`.
//!
//! Inbound traffic goes the other way: the transport hands every event it
//! receives to [`crate::InboundHandle::deliver`]. It must do so from its own
//! dispatch path, never from inside `connect` or `send`, since those run
//! while the set is locked.

use respol_proto::{Registration, Request};

use crate::error::TransportError;

/// Connection of one resource set to the policy manager.
pub trait Transport: Send + 'static {
    /// Start connecting the set described by `registration`.
    ///
    /// Returns once the attempt is under way. Readiness is signalled later by
    /// a `ManagerUp` event that carries the identifier the manager assigned.
    fn connect(&mut self, registration: &Registration) -> Result<(), TransportError>;

    /// Send a request. Does not wait for the manager's decision.
    fn send(&mut self, request: &Request) -> Result<(), TransportError>;

    /// Tear the connection down. Called when the set is dropped.
    fn disconnect(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, registration: &Registration) -> Result<(), TransportError> {
        (**self).connect(registration)
    }

    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        (**self).send(request)
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}
