//! Wire-level types for talking to the resource policy manager.
//!
//! Everything in this crate is a plain value: resource kinds and kind masks,
//! the request a resource set sends, the registration it connects with, and
//! the asynchronous events the manager sends back. The types carry no
//! behaviour beyond conversion and validation, so transports and the client
//! state machine can share them without pulling in each other.
//!
//! The manager's own arbitration algorithm and the physical transport are
//! outside this crate. [`codec`] offers a CBOR encoding for transports that
//! move bytes, but nothing here depends on it.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod errors;
pub mod event;
pub mod kind;
pub mod request;

pub use errors::{ProtocolError, Result};
pub use event::ManagerEvent;
pub use kind::{ResourceKind, ResourceKinds};
pub use request::{
    AudioProperties, Registration, Request, RequestKind, ResourceDescriptor, ResourceSetId,
    StreamTag,
};
