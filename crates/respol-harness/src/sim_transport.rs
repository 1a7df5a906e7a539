//! Transport connecting a resource set to a [`SimManager`].

use std::sync::Arc;

use respol_core::{Transport, TransportError};
use respol_proto::{Registration, Request};

use crate::sim_manager::{ConnectionId, SimManager};

/// One simulated connection to the manager.
///
/// Outbound calls go straight into the manager's state. Inbound events wait
/// in the manager's outbox until [`SimManager::deliver_all`] runs.
pub struct SimTransport {
    manager: Arc<SimManager>,
    connection: ConnectionId,
}

impl SimTransport {
    pub(crate) fn new(manager: Arc<SimManager>, connection: ConnectionId) -> Self {
        Self { manager, connection }
    }

    /// Connection this transport represents.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl Transport for SimTransport {
    fn connect(&mut self, registration: &Registration) -> Result<(), TransportError> {
        self.manager.connect(self.connection, registration)
    }

    fn send(&mut self, request: &Request) -> Result<(), TransportError> {
        self.manager.receive(self.connection, request)
    }

    fn disconnect(&mut self) {
        self.manager.disconnect(self.connection);
    }
}
