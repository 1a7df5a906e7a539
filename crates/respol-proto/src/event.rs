//! Inbound messages from the policy manager.

use serde::{Deserialize, Serialize};

use crate::{
    kind::{ResourceKind, ResourceKinds},
    request::ResourceSetId,
};

/// Asynchronous event delivered by the transport.
///
/// Events that carry an `identifier` are routed to the set with that
/// identifier only. `ManagerUp`, `ManagerDown` and `Error` concern the
/// connection itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerEvent {
    /// Some or all requested resources are usable
    Granted {
        /// Set addressed
        identifier: ResourceSetId,
        /// Every kind granted, mandatory and optional
        granted: ResourceKinds,
    },

    /// A mandatory resource could not be granted
    Denied {
        /// Set addressed
        identifier: ResourceSetId,
    },

    /// A release request completed
    Released {
        /// Set addressed
        identifier: ResourceSetId,
    },

    /// The manager revoked the grant on its own (e.g. shutdown)
    ReleasedByManager {
        /// Set addressed
        identifier: ResourceSetId,
    },

    /// A higher priority application preempted the grant
    ResourcesLost {
        /// Set addressed
        identifier: ResourceSetId,
    },

    /// Kinds the set is interested in have become free
    ResourcesBecameAvailable {
        /// Set addressed
        identifier: ResourceSetId,
        /// Free kinds
        available: ResourceKinds,
    },

    /// An update request completed without changing the grant
    UpdateOk {
        /// Set addressed
        identifier: ResourceSetId,
    },

    /// The manager changed a negotiated property
    PropertyChanged {
        /// Set addressed
        identifier: ResourceSetId,
        /// Kind the property belongs to
        kind: ResourceKind,
        /// Property name
        name: String,
        /// New value
        value: String,
    },

    /// Connection to the manager is ready
    ManagerUp {
        /// Identifier the manager assigned (or confirmed) for this set
        identifier: ResourceSetId,
    },

    /// Connection to the manager was lost
    ManagerDown,

    /// Out-of-band failure reported by the manager
    Error {
        /// Manager error code
        code: u32,
        /// Human readable message
        message: String,
    },
}

impl ManagerEvent {
    /// Identifier the event is addressed to, `None` for connection events.
    pub fn identifier(&self) -> Option<ResourceSetId> {
        match self {
            Self::Granted { identifier, .. }
            | Self::Denied { identifier }
            | Self::Released { identifier }
            | Self::ReleasedByManager { identifier }
            | Self::ResourcesLost { identifier }
            | Self::ResourcesBecameAvailable { identifier, .. }
            | Self::UpdateOk { identifier }
            | Self::PropertyChanged { identifier, .. } => Some(*identifier),
            Self::ManagerUp { .. } | Self::ManagerDown | Self::Error { .. } => None,
        }
    }

    /// Short name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "granted",
            Self::Denied { .. } => "denied",
            Self::Released { .. } => "released",
            Self::ReleasedByManager { .. } => "released_by_manager",
            Self::ResourcesLost { .. } => "resources_lost",
            Self::ResourcesBecameAvailable { .. } => "resources_became_available",
            Self::UpdateOk { .. } => "update_ok",
            Self::PropertyChanged { .. } => "property_changed",
            Self::ManagerUp { .. } => "manager_up",
            Self::ManagerDown => "manager_down",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_events_have_no_identifier() {
        assert_eq!(ManagerEvent::ManagerUp { identifier: ResourceSetId(3) }.identifier(), None);
        assert_eq!(ManagerEvent::ManagerDown.identifier(), None);
        assert_eq!(
            ManagerEvent::Error { code: 1, message: "nope".into() }.identifier(),
            None
        );
        assert_eq!(
            ManagerEvent::Denied { identifier: ResourceSetId(3) }.identifier(),
            Some(ResourceSetId(3))
        );
    }
}
