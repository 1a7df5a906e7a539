//! Resource policy client core.
//!
//! Applications on a shared device compete for hardware-bound resources
//! (audio and video paths, recorders, buttons, LEDs). A central policy
//! manager, running in another process, decides who gets what. This crate is
//! the client side: a [`ResourceSet`] collects the resources an application
//! wants, talks to the manager through a [`Transport`], and turns the
//! manager's asynchronous answers into [`ResourceSetEvent`]s.
//!
//! # Architecture
//!
//! Protocol logic lives in [`ResourceEngine`], a deterministic state machine
//! without I/O. It returns [`EngineAction`]s describing what should happen
//! (connect, send, notify). [`ResourceSet`] is the thread-safe driver that
//! executes them. The same engine is exercised directly by unit tests and
//! through the simulated manager in `respol-harness`.
//!
//! Requests of one set are strictly serialized by a [`RequestQueue`]: the
//! manager sees them in call order and never more than one at a time.
//!
//! # Components
//!
//! - [`resource`]: resource value types (generic, audio, video)
//! - [`state`]: resource membership, grant state, reply handling
//! - [`queue`]: request serialization
//! - [`engine`]: sequencing, connection and routing state machine
//! - [`set`]: public, thread-safe resource set
//! - [`transport`]: transport abstraction
//! - [`error`]: error types

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod queue;
pub mod resource;
pub mod set;
pub mod state;
pub mod transport;

pub use config::ResourceSetConfig;
pub use engine::{ConnectionState, EngineAction, EngineState, Origin, ResourceEngine};
pub use error::{ResourceSetError, TransportError};
pub use event::ResourceSetEvent;
pub use queue::RequestQueue;
pub use resource::{AudioResource, GenericResource, Resource, VideoResource};
pub use respol_proto::{ManagerEvent, RequestKind, ResourceKind, ResourceKinds, ResourceSetId};
pub use set::{InboundHandle, ResourceSet};
pub use state::{GrantState, Policy, ResourceMap, SetState};
pub use transport::Transport;
