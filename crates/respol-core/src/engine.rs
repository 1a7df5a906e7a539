//! Resource engine: sequencing and routing between a set and its manager.
//!
//! # Architecture: Action-Based State Machine
//!
//! The engine performs no I/O. Every operation returns the
//! [`EngineAction`]s the caller has to execute: connect the transport, send
//! a request, or notify the application. [`crate::ResourceSet`] is the
//! driver that executes them; tests can drive the engine directly.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ dispatch ┌────────────┐ ManagerUp ┌──────┐ enqueue ┌───────────────┐
//! │ Disconnected │─────────>│ Connecting │──────────>│ Idle │────────>│ AwaitingReply │
//! └──────────────┘          └────────────┘           └──────┘<────────└───────────────┘
//!        ↑                                                      reply,     │   ↑
//!        │                     ManagerDown (any state)          queue      └───┘
//!        └──────────────────────────────────────────────────    empty   reply, queue
//!                                                                        non-empty
//! ```
//!
//! # Invariants
//!
//! - At most one request is in flight. The head of the [`RequestQueue`] is
//!   the awaited request whenever one is in flight.
//! - The identifier is assigned once, by the first `ManagerUp`, and never
//!   changes afterwards.
//! - Policy flags are latched once the first request was submitted.
//! - Only API calls start a connection attempt. Reply handling never does,
//!   so a connect failure can always be reported to the caller.

use respol_proto::{ManagerEvent, Registration, Request, RequestKind, ResourceSetId};
use tracing::{debug, info, warn};

use crate::{
    error::ResourceSetError,
    event::ResourceSetEvent,
    queue::RequestQueue,
    state::{Outcome, Policy, SetState},
};

/// Actions returned by the engine.
///
/// The driver executes them in order:
/// - `Connect`: start connecting the transport with this registration
/// - `Send`: hand the request to the transport
/// - `Notify`: deliver the event to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    /// Connect the transport
    Connect(Registration),
    /// Send a request to the manager
    Send(Request),
    /// Deliver a notification to the application
    Notify(ResourceSetEvent),
}

/// Connection status towards the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection, none being attempted
    Disconnected,
    /// Connect issued, waiting for `ManagerUp`
    Connecting,
    /// Manager reachable
    Connected,
}

/// Externally visible engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No connection to the manager
    Disconnected,
    /// Waiting for the manager to come up
    Connecting,
    /// Connected, nothing in flight
    Idle,
    /// Connected, a request is awaiting its reply
    AwaitingReply,
}

/// Who triggered a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A public API call; may start a connection attempt
    Api,
    /// Inbound event handling
    Reply,
}

/// Protocol state machine of one resource set.
#[derive(Debug, Clone)]
pub struct ResourceEngine {
    identifier: ResourceSetId,
    connection: ConnectionState,
    queue: RequestQueue,
    in_flight: bool,
    /// Acquire mode before the in-flight request was sent
    mode_before_send: bool,
    started: bool,
    state: SetState,
}

impl ResourceEngine {
    /// Create an engine for a new, never connected set.
    pub fn new(application_class: impl Into<String>, policy: Policy) -> Self {
        Self {
            identifier: ResourceSetId::UNSET,
            connection: ConnectionState::Disconnected,
            queue: RequestQueue::new(),
            in_flight: false,
            mode_before_send: false,
            started: false,
            state: SetState::new(application_class.into(), policy),
        }
    }

    /// Identifier assigned by the manager, [`ResourceSetId::UNSET`] before.
    pub fn identifier(&self) -> ResourceSetId {
        self.identifier
    }

    /// Connection status.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Combined connection and request state.
    pub fn engine_state(&self) -> EngineState {
        match self.connection {
            ConnectionState::Disconnected => EngineState::Disconnected,
            ConnectionState::Connecting => EngineState::Connecting,
            ConnectionState::Connected if self.in_flight => EngineState::AwaitingReply,
            ConnectionState::Connected => EngineState::Idle,
        }
    }

    /// Pending requests, head first.
    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Request awaiting its reply, if any.
    pub fn awaited(&self) -> Option<RequestKind> {
        if self.in_flight { self.queue.head() } else { None }
    }

    /// Whether the set has begun talking to the manager.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Set state.
    pub fn state(&self) -> &SetState {
        &self.state
    }

    /// Mutable set state, for resource membership edits.
    pub fn state_mut(&mut self) -> &mut SetState {
        &mut self.state
    }

    /// Latch auto-release on.
    ///
    /// # Errors
    ///
    /// `PolicyLatched` once the first request was submitted.
    pub fn set_auto_release(&mut self) -> Result<(), ResourceSetError> {
        if self.started {
            return Err(ResourceSetError::PolicyLatched { flag: "auto-release" });
        }
        self.state.policy_mut().auto_release = true;
        Ok(())
    }

    /// Latch always-reply on.
    ///
    /// # Errors
    ///
    /// `PolicyLatched` once the first request was submitted.
    pub fn set_always_reply(&mut self) -> Result<(), ResourceSetError> {
        if self.started {
            return Err(ResourceSetError::PolicyLatched { flag: "always-reply" });
        }
        self.state.policy_mut().always_reply = true;
        Ok(())
    }

    /// Submit a request from the public API.
    ///
    /// # Errors
    ///
    /// `EmptySet` for an acquire on a set without resources. Nothing is
    /// enqueued in that case.
    pub fn submit(&mut self, kind: RequestKind) -> Result<Vec<EngineAction>, ResourceSetError> {
        if kind == RequestKind::Acquire && self.state.resources().is_empty() {
            return Err(ResourceSetError::EmptySet);
        }

        self.started = true;
        let is_head = self.queue.enqueue(kind);
        debug!(set_id = %self.identifier, request = %kind, is_head, "request enqueued");

        let mut actions = Vec::new();
        self.dispatch(Origin::Api, &mut actions);
        Ok(actions)
    }

    /// Record a transport failure while executing actions from `origin`.
    ///
    /// The connection is considered lost. For an API call the request it
    /// submitted is withdrawn, since it was never sent; the call reports the
    /// failure synchronously. Requests already queued stay queued. A failed
    /// send leaves the acquire mode as it was before that request.
    pub fn transport_failed(&mut self, origin: Origin) -> Vec<EngineAction> {
        let was_connected = self.connection == ConnectionState::Connected;
        if self.in_flight {
            self.state.set_acquire_mode(self.mode_before_send);
        }
        self.disconnected();

        if origin == Origin::Api {
            let withdrawn = self.queue.pop_tail();
            debug!(
                set_id = %self.identifier,
                ?withdrawn,
                "request withdrawn after transport failure"
            );
        }

        if was_connected {
            vec![EngineAction::Notify(ResourceSetEvent::ManagerIsDown)]
        } else {
            Vec::new()
        }
    }

    /// Request to send when the set goes away while holding or wanting a
    /// grant.
    pub fn farewell(&self) -> Option<Request> {
        let wants = self.state.grant().is_granted() || self.state.in_acquire_mode();
        (self.connection == ConnectionState::Connected && wants)
            .then(|| self.request(RequestKind::Release))
    }

    /// Handle an inbound event.
    pub fn handle(&mut self, event: ManagerEvent) -> Vec<EngineAction> {
        if let Some(identifier) = event.identifier() {
            if !self.identifier.is_assigned() || identifier != self.identifier {
                debug!(
                    set_id = %self.identifier,
                    addressed = %identifier,
                    event = event.name(),
                    "dropping event for another set"
                );
                return Vec::new();
            }
        }

        let mut actions = Vec::new();
        let awaited = self.awaited();
        let outcome = match event {
            ManagerEvent::ManagerUp { identifier } => {
                self.on_manager_up(identifier, &mut actions);
                return actions;
            },
            ManagerEvent::ManagerDown => {
                self.on_manager_down(&mut actions);
                return actions;
            },
            ManagerEvent::Error { code, message } => {
                warn!(
                    set_id = %self.identifier,
                    code,
                    %message,
                    ?awaited,
                    "manager reported an error"
                );
                Outcome {
                    event: Some(ResourceSetEvent::Error { code, message }),
                    completes: awaited.is_some(),
                }
            },
            ManagerEvent::Granted { granted, .. } => self.state.on_granted(granted, awaited),
            ManagerEvent::Denied { .. } => self.state.on_denied(awaited),
            ManagerEvent::Released { .. } => self.state.on_released(awaited),
            ManagerEvent::ReleasedByManager { .. } => self.state.on_released_by_manager(),
            ManagerEvent::ResourcesLost { .. } => self.state.on_lost(),
            ManagerEvent::ResourcesBecameAvailable { available, .. } => {
                self.state.on_became_available(available)
            },
            ManagerEvent::UpdateOk { .. } => self.state.on_update_ok(awaited),
            ManagerEvent::PropertyChanged { kind, name, value, .. } => {
                self.state.on_property_changed(kind, name, value)
            },
        };

        if let Some(event) = outcome.event {
            actions.push(EngineAction::Notify(event));
        }
        if outcome.completes {
            self.complete();
            self.dispatch(Origin::Reply, &mut actions);
        }
        actions
    }

    fn on_manager_up(&mut self, identifier: ResourceSetId, actions: &mut Vec<EngineAction>) {
        if !self.identifier.is_assigned() {
            if identifier.is_assigned() {
                self.identifier = identifier;
            } else {
                warn!(
                    class = self.state.application_class(),
                    "manager came up without assigning an identifier"
                );
            }
        } else if identifier != self.identifier {
            warn!(
                set_id = %self.identifier,
                offered = %identifier,
                "manager offered a different identifier, keeping the assigned one"
            );
        }

        let reconnected = self.connection != ConnectionState::Connected;
        if reconnected {
            // Anything sent before the connection dropped is resent.
            self.in_flight = false;
        }
        self.connection = ConnectionState::Connected;
        info!(set_id = %self.identifier, class = self.state.application_class(), "manager is up");

        // A restarted manager holds nothing for us; ask again if we still want it.
        let interest_queued =
            self.queue.iter().any(|k| matches!(k, RequestKind::Acquire | RequestKind::Release));
        if reconnected && self.state.in_acquire_mode() && !interest_queued {
            debug!(set_id = %self.identifier, "re-acquiring after reconnect");
            self.queue.enqueue(RequestKind::Acquire);
        }

        actions.push(EngineAction::Notify(ResourceSetEvent::ManagerIsUp));
        self.dispatch(Origin::Reply, actions);
    }

    fn on_manager_down(&mut self, actions: &mut Vec<EngineAction>) {
        info!(set_id = %self.identifier, awaited = ?self.awaited(), "manager is down");
        self.disconnected();
        actions.push(EngineAction::Notify(ResourceSetEvent::ManagerIsDown));
    }

    fn disconnected(&mut self) {
        self.connection = ConnectionState::Disconnected;
        self.in_flight = false;
        self.state.on_connection_lost();
    }

    fn complete(&mut self) {
        let done = self.queue.head();
        self.in_flight = false;
        let next = self.queue.advance();
        debug!(set_id = %self.identifier, ?done, ?next, "request complete");
    }

    fn request(&self, kind: RequestKind) -> Request {
        Request {
            identifier: self.identifier,
            kind,
            descriptor: self.state.resources().descriptor(),
        }
    }

    fn registration(&self) -> Registration {
        let policy = self.state.policy();
        Registration {
            identifier: self.identifier.is_assigned().then_some(self.identifier),
            application_class: self.state.application_class().to_string(),
            auto_release: policy.auto_release,
            always_reply: policy.always_reply,
            descriptor: self.state.resources().descriptor(),
        }
    }

    /// Dispatch the head of the queue if nothing is in flight.
    fn dispatch(&mut self, origin: Origin, actions: &mut Vec<EngineAction>) {
        while let Some(head) = self.queue.head() {
            if self.in_flight {
                return;
            }

            match self.connection {
                ConnectionState::Connecting => return,
                ConnectionState::Disconnected => {
                    if head == RequestKind::Release && !self.identifier.is_assigned() {
                        // Never registered: nothing to release.
                        debug!("release before first connection completes locally");
                        self.queue.advance();
                        continue;
                    }
                    if origin == Origin::Reply {
                        return;
                    }
                    debug!(
                        class = self.state.application_class(),
                        request = %head,
                        "connecting to manager"
                    );
                    self.connection = ConnectionState::Connecting;
                    actions.push(EngineAction::Connect(self.registration()));
                    return;
                },
                ConnectionState::Connected => {
                    let policy = self.state.policy();
                    if head == RequestKind::Acquire
                        && self.state.grant().is_granted()
                        && !policy.always_reply
                    {
                        debug!(
                            set_id = %self.identifier,
                            "already granted, acquire completes locally"
                        );
                        self.queue.advance();
                        continue;
                    }

                    self.mode_before_send = self.state.in_acquire_mode();
                    match head {
                        RequestKind::Acquire => self.state.set_acquire_mode(true),
                        RequestKind::Release => self.state.set_acquire_mode(false),
                        RequestKind::Update => {},
                    }
                    self.in_flight = true;
                    debug!(set_id = %self.identifier, request = %head, "sending request");
                    actions.push(EngineAction::Send(self.request(head)));
                    return;
                },
            }
        }
    }
}
