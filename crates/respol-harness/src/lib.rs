//! Deterministic simulation harness for resource set testing.
//!
//! [`SimManager`] plays the policy manager in-process. Requests sent through
//! a [`SimTransport`] are recorded and answered into an outbox; nothing is
//! delivered until the test calls [`SimManager::deliver_all`]. That makes
//! every interleaving of API calls and replies reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_manager;
pub mod sim_transport;

pub use sim_manager::{Arbitration, Observed, SimManager, priority_of};
pub use sim_transport::SimTransport;
