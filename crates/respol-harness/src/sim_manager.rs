//! Simulated policy manager.
//!
//! Two modes:
//! - [`Arbitration::Automatic`]: a small priority model. Every kind is
//!   exclusive; a higher application class preempts a lower one; preempted
//!   sets without auto-release are granted back when the resources free up,
//!   everyone else interested gets an availability notice.
//! - [`Arbitration::Scripted`]: requests are only recorded. The test writes
//!   the replies with [`SimManager::reply`] and [`SimManager::push`].
//!
//! The manager also checks the client contract: it counts every request
//! that arrives while the previous reply to the same set is undelivered.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use respol_core::{InboundHandle, ResourceSet, ResourceSetConfig, TransportError};
use respol_proto::{
    ManagerEvent, Registration, Request, RequestKind, ResourceDescriptor, ResourceKind,
    ResourceKinds, ResourceSetId,
};
use tracing::{debug, trace};

use crate::sim_transport::SimTransport;

/// Identifies one simulated connection.
pub type ConnectionId = u64;

/// How the simulated manager answers requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arbitration {
    /// Answer with the built-in priority model
    Automatic,
    /// Record only; the test scripts the replies
    Scripted,
}

/// Something the manager saw, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    /// A set connected
    Registered {
        /// Identifier assigned
        identifier: ResourceSetId,
        /// Application class
        class: String,
    },
    /// A request arrived
    Request(Request),
    /// A set disconnected
    Disconnected {
        /// Identifier of the set
        identifier: ResourceSetId,
    },
}

/// Priority of an application class; higher wins.
pub fn priority_of(class: &str) -> u32 {
    match class {
        "call" => 100,
        "ringtone" => 90,
        "alarm" => 80,
        "navigator" => 70,
        "camera" => 60,
        "game" => 50,
        "player" => 40,
        "event" => 30,
        "background" => 10,
        _ => 0,
    }
}

#[derive(Debug)]
struct Client {
    connection: ConnectionId,
    priority: u32,
    auto_release: bool,
    always_reply: bool,
    descriptor: ResourceDescriptor,
    wants: bool,
    granted: ResourceKinds,
}

struct Outgoing {
    connection: ConnectionId,
    identifier: ResourceSetId,
    event: ManagerEvent,
    reply: bool,
}

struct ManagerState {
    arbitration: Arbitration,
    reachable: bool,
    next_identifier: u32,
    next_connection: ConnectionId,
    clients: BTreeMap<ResourceSetId, Client>,
    connections: BTreeMap<ConnectionId, ResourceSetId>,
    registrations: BTreeMap<ConnectionId, Registration>,
    handles: BTreeMap<ConnectionId, InboundHandle<SimTransport>>,
    owners: BTreeMap<ResourceKind, ResourceSetId>,
    outbox: VecDeque<Outgoing>,
    observed: Vec<Observed>,
    awaiting: BTreeSet<ResourceSetId>,
    overlaps: usize,
}

/// In-process stand-in for the policy manager.
pub struct SimManager {
    state: Mutex<ManagerState>,
}

impl SimManager {
    /// Manager answering with the built-in priority model.
    pub fn new() -> Arc<Self> {
        Self::with_arbitration(Arbitration::Automatic)
    }

    /// Manager whose replies are written by the test.
    pub fn scripted() -> Arc<Self> {
        Self::with_arbitration(Arbitration::Scripted)
    }

    /// Manager in the given mode.
    pub fn with_arbitration(arbitration: Arbitration) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ManagerState {
                arbitration,
                reachable: true,
                next_identifier: 1,
                next_connection: 1,
                clients: BTreeMap::new(),
                connections: BTreeMap::new(),
                registrations: BTreeMap::new(),
                handles: BTreeMap::new(),
                owners: BTreeMap::new(),
                outbox: VecDeque::new(),
                observed: Vec::new(),
                awaiting: BTreeSet::new(),
                overlaps: 0,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New unattached transport. [`Self::attach`] wires up its inbound path.
    pub fn transport(self: &Arc<Self>) -> SimTransport {
        let mut state = self.lock();
        let connection = state.next_connection;
        state.next_connection += 1;
        SimTransport::new(Arc::clone(self), connection)
    }

    /// Route events for `connection` to `handle`.
    pub fn attach(&self, connection: ConnectionId, handle: InboundHandle<SimTransport>) {
        self.lock().handles.insert(connection, handle);
    }

    /// Resource set connected to this manager, policy flags off.
    pub fn resource_set(self: &Arc<Self>, class: &str) -> ResourceSet<SimTransport> {
        self.resource_set_with(ResourceSetConfig::new(class))
    }

    /// Resource set connected to this manager.
    pub fn resource_set_with(
        self: &Arc<Self>,
        config: ResourceSetConfig,
    ) -> ResourceSet<SimTransport> {
        let transport = self.transport();
        let connection = transport.connection();
        let set = ResourceSet::with_config(config, transport);
        self.attach(connection, set.inbound());
        set
    }

    /// Make connection attempts fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Simulate a manager crash: every connection gets `ManagerDown`, all
    /// grants are forgotten and new connections fail until
    /// [`Self::come_up`].
    pub fn go_down(&self) {
        let mut state = self.lock();
        state.reachable = false;
        state.clients.clear();
        state.owners.clear();
        state.awaiting.clear();
        state.outbox.clear();
        let live: Vec<(ConnectionId, ResourceSetId)> =
            state.connections.iter().map(|(c, id)| (*c, *id)).collect();
        state.connections.clear();
        for (connection, identifier) in live {
            state.outbox.push_back(Outgoing {
                connection,
                identifier,
                event: ManagerEvent::ManagerDown,
                reply: false,
            });
        }
        debug!("simulated manager went down");
    }

    /// Restart the manager. Transports that were registered reconnect with
    /// their last registration, as a real transport's reconnect loop would.
    pub fn come_up(&self) {
        let mut state = self.lock();
        state.reachable = true;
        let registrations: Vec<(ConnectionId, Registration)> =
            state.registrations.iter().map(|(c, r)| (*c, r.clone())).collect();
        for (connection, registration) in registrations {
            state.register(connection, &registration);
        }
        debug!("simulated manager came up");
    }

    pub(crate) fn connect(
        &self,
        connection: ConnectionId,
        registration: &Registration,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(TransportError::Unreachable("simulated manager is down".into()));
        }
        state.register(connection, registration);
        Ok(())
    }

    pub(crate) fn receive(
        &self,
        connection: ConnectionId,
        request: &Request,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let Some(identifier) = state.connections.get(&connection).copied() else {
            return Err(TransportError::Closed);
        };

        state.observed.push(Observed::Request(request.clone()));
        if !state.awaiting.insert(identifier) {
            state.overlaps += 1;
        }
        if let Some(client) = state.clients.get_mut(&identifier) {
            client.descriptor = request.descriptor.clone();
        }
        trace!(%identifier, request = %request.kind, "simulated manager received request");

        if state.arbitration == Arbitration::Automatic {
            state.arbitrate(identifier, request.kind);
        }
        Ok(())
    }

    pub(crate) fn disconnect(&self, connection: ConnectionId) {
        let mut state = self.lock();
        state.handles.remove(&connection);
        state.registrations.remove(&connection);
        let Some(identifier) = state.connections.remove(&connection) else {
            return;
        };
        state.observed.push(Observed::Disconnected { identifier });
        state.awaiting.remove(&identifier);
        if state.clients.remove(&identifier).is_some() {
            let freed = state.free_all(identifier);
            if state.arbitration == Arbitration::Automatic && !freed.is_empty() {
                state.reconsider();
            }
        }
    }

    /// Queue the reply to the request `identifier` has outstanding.
    pub fn reply(&self, identifier: ResourceSetId, event: ManagerEvent) {
        self.lock().send(identifier, event, true);
    }

    /// Queue an unsolicited event for `identifier`.
    pub fn push(&self, identifier: ResourceSetId, event: ManagerEvent) {
        self.lock().send(identifier, event, false);
    }

    /// Deliver the oldest queued event. Returns `false` if none was queued.
    pub fn deliver_one(&self) -> bool {
        let (outgoing, handle) = {
            let mut state = self.lock();
            let Some(outgoing) = state.outbox.pop_front() else {
                return false;
            };
            if outgoing.reply {
                state.awaiting.remove(&outgoing.identifier);
            }
            let handle = state.handles.get(&outgoing.connection).cloned();
            (outgoing, handle)
        };

        // Delivery takes the set's lock; ours must be released by now.
        if let Some(handle) = handle {
            if let Err(error) = handle.deliver(outgoing.event) {
                debug!(connection = outgoing.connection, %error, "event for dropped set discarded");
            }
        }
        true
    }

    /// Deliver queued events, including those produced while delivering,
    /// until the outbox is empty. Returns how many were delivered.
    pub fn deliver_all(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_one() {
            delivered += 1;
        }
        delivered
    }

    /// Events waiting for delivery.
    pub fn pending_deliveries(&self) -> usize {
        self.lock().outbox.len()
    }

    /// Everything the manager saw, in arrival order.
    pub fn observed(&self) -> Vec<Observed> {
        self.lock().observed.clone()
    }

    /// Request kinds received from `identifier`, in arrival order.
    pub fn requests_of(&self, identifier: ResourceSetId) -> Vec<RequestKind> {
        self.lock()
            .observed
            .iter()
            .filter_map(|observed| match observed {
                Observed::Request(request) if request.identifier == identifier => {
                    Some(request.kind)
                },
                _ => None,
            })
            .collect()
    }

    /// Requests that arrived while the same set still awaited a reply.
    pub fn overlaps(&self) -> usize {
        self.lock().overlaps
    }

    /// Current owner of `kind`.
    pub fn owner_of(&self, kind: ResourceKind) -> Option<ResourceSetId> {
        self.lock().owners.get(&kind).copied()
    }

    /// Kinds the manager considers granted to `identifier`.
    pub fn granted_to(&self, identifier: ResourceSetId) -> ResourceKinds {
        self.lock().clients.get(&identifier).map(|c| c.granted).unwrap_or_default()
    }
}

impl ManagerState {
    fn register(&mut self, connection: ConnectionId, registration: &Registration) {
        let identifier = match registration.identifier {
            Some(identifier) if identifier.is_assigned() => identifier,
            _ => {
                let identifier = ResourceSetId(self.next_identifier);
                self.next_identifier += 1;
                identifier
            },
        };

        if let Some(previous) = self.connections.insert(connection, identifier) {
            if previous != identifier {
                self.clients.remove(&previous);
            }
        }
        self.clients.insert(
            identifier,
            Client {
                connection,
                priority: priority_of(&registration.application_class),
                auto_release: registration.auto_release,
                always_reply: registration.always_reply,
                descriptor: registration.descriptor.clone(),
                wants: false,
                granted: ResourceKinds::empty(),
            },
        );
        let mut remembered = registration.clone();
        remembered.identifier = Some(identifier);
        self.registrations.insert(connection, remembered);
        self.observed.push(Observed::Registered {
            identifier,
            class: registration.application_class.clone(),
        });
        self.outbox.push_back(Outgoing {
            connection,
            identifier,
            event: ManagerEvent::ManagerUp { identifier },
            reply: false,
        });
    }

    fn send(&mut self, identifier: ResourceSetId, event: ManagerEvent, reply: bool) {
        let connection = self
            .clients
            .get(&identifier)
            .map(|c| c.connection)
            .or_else(|| {
                self.connections.iter().find(|(_, id)| **id == identifier).map(|(c, _)| *c)
            });
        match connection {
            Some(connection) => {
                self.outbox.push_back(Outgoing { connection, identifier, event, reply });
            },
            None => debug!(%identifier, event = event.name(), "no connection for event"),
        }
    }

    fn arbitrate(&mut self, identifier: ResourceSetId, kind: RequestKind) {
        match kind {
            RequestKind::Acquire => {
                if let Some(client) = self.clients.get_mut(&identifier) {
                    client.wants = true;
                }
                match self.grant(identifier) {
                    Some(granted) => {
                        self.send(identifier, ManagerEvent::Granted { identifier, granted }, true);
                    },
                    None => {
                        if let Some(client) = self.clients.get_mut(&identifier) {
                            client.wants = false;
                        }
                        self.send(identifier, ManagerEvent::Denied { identifier }, true);
                    },
                }
            },
            RequestKind::Update => {
                let Some(client) = self.clients.get(&identifier) else { return };
                let before = client.granted;
                let always_reply = client.always_reply;
                if before.is_empty() {
                    self.send(identifier, ManagerEvent::UpdateOk { identifier }, true);
                    return;
                }

                let removed = before.difference(client.descriptor.all);
                self.free(identifier, removed);
                match self.grant(identifier) {
                    Some(granted) if granted == before && !always_reply => {
                        self.send(identifier, ManagerEvent::UpdateOk { identifier }, true);
                    },
                    Some(granted) => {
                        self.send(identifier, ManagerEvent::Granted { identifier, granted }, true);
                    },
                    None => {
                        self.free_all(identifier);
                        self.send(identifier, ManagerEvent::Denied { identifier }, true);
                    },
                }
                if !removed.is_empty() {
                    self.reconsider();
                }
            },
            RequestKind::Release => {
                let freed = self.free_all(identifier);
                if let Some(client) = self.clients.get_mut(&identifier) {
                    client.wants = false;
                }
                self.send(identifier, ManagerEvent::Released { identifier }, true);
                if !freed.is_empty() {
                    self.reconsider();
                }
            },
        }
    }

    /// Kinds `identifier` could hold now and the owners it would preempt.
    /// `None` if a mandatory kind is held by an equal or higher priority set.
    fn evaluate(
        &self,
        identifier: ResourceSetId,
    ) -> Option<(ResourceKinds, BTreeSet<ResourceSetId>)> {
        let client = self.clients.get(&identifier)?;
        let mut grantable = ResourceKinds::empty();
        let mut victims = BTreeSet::new();

        for kind in client.descriptor.all.kinds() {
            match self.owners.get(&kind) {
                None => grantable |= kind.bit(),
                Some(owner) if *owner == identifier => grantable |= kind.bit(),
                Some(owner) => {
                    let owner_priority = self.clients.get(owner).map_or(0, |c| c.priority);
                    if owner_priority < client.priority {
                        grantable |= kind.bit();
                        victims.insert(*owner);
                    }
                },
            }
        }

        grantable.contains(client.descriptor.mandatory()).then_some((grantable, victims))
    }

    /// Grant whatever `identifier` can hold, preempting lower priority
    /// owners. Returns the new grant, or `None` if it must be denied.
    fn grant(&mut self, identifier: ResourceSetId) -> Option<ResourceKinds> {
        let (granted, victims) = self.evaluate(identifier)?;
        if granted.is_empty() {
            return None;
        }
        for victim in victims {
            self.preempt(victim);
        }
        for kind in granted.kinds() {
            self.owners.insert(kind, identifier);
        }
        if let Some(client) = self.clients.get_mut(&identifier) {
            client.granted = granted;
        }
        debug!(%identifier, granted = granted.bits(), "simulated manager granted");
        Some(granted)
    }

    fn preempt(&mut self, victim: ResourceSetId) {
        self.free_all(victim);
        if let Some(client) = self.clients.get_mut(&victim) {
            if client.auto_release {
                client.wants = false;
            }
        }
        debug!(%victim, "simulated manager preempted");
        self.send(victim, ManagerEvent::ResourcesLost { identifier: victim }, false);
    }

    fn free(&mut self, identifier: ResourceSetId, kinds: ResourceKinds) {
        self.owners.retain(|kind, owner| !(*owner == identifier && kinds.has(*kind)));
        if let Some(client) = self.clients.get_mut(&identifier) {
            client.granted = client.granted.difference(kinds);
        }
    }

    fn free_all(&mut self, identifier: ResourceSetId) -> ResourceKinds {
        let held: ResourceKinds = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == identifier)
            .map(|(kind, _)| *kind)
            .collect();
        self.free(identifier, held);
        held
    }

    /// Re-grant waiting sets, then tell everyone else what became free.
    fn reconsider(&mut self) {
        let mut waiting: Vec<(u32, ResourceSetId)> = self
            .clients
            .iter()
            .filter(|(_, c)| c.wants && c.granted.is_empty() && !c.auto_release)
            .map(|(id, c)| (c.priority, *id))
            .collect();
        waiting.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, identifier) in waiting {
            if let Some(granted) = self.grant(identifier) {
                self.send(identifier, ManagerEvent::Granted { identifier, granted }, false);
            }
        }

        let notices: Vec<(ResourceSetId, ResourceKinds)> = self
            .clients
            .iter()
            .filter(|(_, c)| !c.wants || c.auto_release)
            .map(|(id, c)| {
                let free: ResourceKinds = c
                    .descriptor
                    .all
                    .difference(c.granted)
                    .kinds()
                    .filter(|kind| !self.owners.contains_key(kind))
                    .collect();
                (*id, free)
            })
            .filter(|(_, free)| !free.is_empty())
            .collect();

        for (identifier, available) in notices {
            let event = ManagerEvent::ResourcesBecameAvailable { identifier, available };
            self.send(identifier, event, false);
        }
    }
}
