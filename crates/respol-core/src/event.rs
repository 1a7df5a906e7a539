//! Notifications delivered to the application owning a resource set.

use respol_proto::ResourceKind;

/// What happened to a resource set.
///
/// Delivered in order through the receiver returned by
/// [`crate::ResourceSet::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSetEvent {
    /// The manager granted the set. Mandatory resources are all held.
    Granted {
        /// Optional resources that were granted as well
        optional: Vec<ResourceKind>,
    },

    /// A mandatory resource could not be granted; nothing is held.
    Denied,

    /// A release request completed.
    Released,

    /// The manager revoked the grant on its own.
    ReleasedByManager,

    /// A higher priority application took the resources. Stop using them.
    ///
    /// Without auto-release the manager grants them back later on its own.
    /// With auto-release the application has to acquire again.
    LostResources,

    /// Resources in the set that are not held have become free.
    BecameAvailable {
        /// Free kinds of this set
        kinds: Vec<ResourceKind>,
    },

    /// An update request completed without changing the grant.
    UpdateOk,

    /// Contact with the manager was (re)established.
    ManagerIsUp,

    /// Contact with the manager was lost.
    ManagerIsDown,

    /// The manager changed a negotiated property.
    PropertiesChanged {
        /// Kind the property belongs to
        kind: ResourceKind,
        /// Property name
        name: String,
        /// New value
        value: String,
    },

    /// The manager reported an error.
    Error {
        /// Manager error code
        code: u32,
        /// Manager error message
        message: String,
    },
}
