//! Thread-safe resource set driver.
//!
//! [`ResourceSet`] is what applications hold. It wraps the
//! [`ResourceEngine`] and the set's [`Transport`] in one lock, executes the
//! engine's actions and fans notifications out to subscribers.
//!
//! The transport reaches back into the set through an [`InboundHandle`]
//! obtained from [`ResourceSet::inbound`]. API calls and inbound events take
//! the same lock, so requests and replies are processed strictly one at a
//! time.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use respol_proto::{ManagerEvent, RequestKind, ResourceKind, ResourceSetId};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::{
    config::ResourceSetConfig,
    engine::{EngineAction, EngineState, Origin, ResourceEngine},
    error::ResourceSetError,
    event::ResourceSetEvent,
    resource::Resource,
    state::GrantState,
    transport::Transport,
};

struct Inner<T> {
    engine: ResourceEngine,
    transport: T,
    subscribers: Vec<UnboundedSender<ResourceSetEvent>>,
}

impl<T: Transport> Inner<T> {
    fn notify(&mut self, event: &ResourceSetEvent) {
        self.subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Execute engine actions in order.
    ///
    /// A transport failure stops execution. API calls get the error back;
    /// for inbound handling it is only logged, since nobody is waiting.
    fn run(&mut self, actions: Vec<EngineAction>, origin: Origin) -> Result<(), ResourceSetError> {
        for action in actions {
            let result = match action {
                EngineAction::Notify(event) => {
                    self.notify(&event);
                    Ok(())
                },
                EngineAction::Connect(registration) => self.transport.connect(&registration),
                EngineAction::Send(request) => self.transport.send(&request),
            };

            if let Err(error) = result {
                warn!(
                    set_id = %self.engine.identifier(),
                    class = self.engine.state().application_class(),
                    %error,
                    "transport failure"
                );
                for action in self.engine.transport_failed(origin) {
                    if let EngineAction::Notify(event) = action {
                        self.notify(&event);
                    }
                }
                return match origin {
                    Origin::Api => Err(ResourceSetError::Connection(error)),
                    Origin::Reply => Ok(()),
                };
            }
        }
        Ok(())
    }
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An application's set of resources and its arbitration state.
///
/// Calls never block on the manager: `acquire`, `update` and `release`
/// return once the request is queued (or sent), and the outcome arrives as a
/// [`ResourceSetEvent`].
///
/// Dropping the set releases a held grant and disconnects the transport.
pub struct ResourceSet<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> ResourceSet<T> {
    /// Create a set for `application_class` with both policy flags off.
    pub fn new(application_class: impl Into<String>, transport: T) -> Self {
        Self::with_config(ResourceSetConfig::new(application_class), transport)
    }

    /// Create a set from a configuration.
    pub fn with_config(config: ResourceSetConfig, transport: T) -> Self {
        let policy = config.policy();
        let engine = ResourceEngine::new(config.application_class, policy);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner { engine, transport, subscribers: Vec::new() }),
            }),
        }
    }

    /// Receive every notification emitted from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<ResourceSetEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.lock().subscribers.push(tx);
        rx
    }

    /// Handle the transport uses to deliver inbound events.
    pub fn inbound(&self) -> InboundHandle<T> {
        InboundHandle { shared: Arc::downgrade(&self.shared) }
    }

    /// Add the default resource of a kind, replacing any resource of that kind.
    ///
    /// Accepts a [`ResourceKind`] or a raw wire code.
    ///
    /// # Errors
    ///
    /// `InvalidResourceKind` if `kind` does not name a known kind.
    pub fn add_resource<K>(&self, kind: K) -> Result<(), ResourceSetError>
    where
        K: TryInto<ResourceKind>,
        K::Error: Into<ResourceSetError>,
    {
        let kind: ResourceKind = kind.try_into().map_err(Into::<ResourceSetError>::into)?;
        self.add_resource_object(Resource::new(kind));
        Ok(())
    }

    /// Add a resource, replacing any resource of the same kind.
    ///
    /// The set takes ownership; the replaced resource is dropped.
    pub fn add_resource_object(&self, resource: impl Into<Resource>) {
        let resource = resource.into();
        let kind = resource.kind();
        let replaced = self.shared.lock().engine.state_mut().resources_mut().insert(resource);
        debug!(%kind, replaced = replaced.is_some(), "resource added");
    }

    /// Remove and drop the resource of `kind`, if present.
    pub fn delete_resource(&self, kind: ResourceKind) {
        self.shared.lock().engine.state_mut().resources_mut().remove(kind);
    }

    /// Snapshot of all resources, in kind order.
    pub fn resources(&self) -> Vec<Resource> {
        self.shared.lock().engine.state().resources().iter().cloned().collect()
    }

    /// Snapshot of the resource of `kind`.
    pub fn resource(&self, kind: ResourceKind) -> Option<Resource> {
        self.shared.lock().engine.state().resources().get(kind).cloned()
    }

    /// Edit the resource of `kind` in place. Call [`Self::update`] afterwards
    /// to tell the manager.
    pub fn with_resource_mut<R>(
        &self,
        kind: ResourceKind,
        edit: impl FnOnce(&mut Resource) -> R,
    ) -> Option<R> {
        self.shared.lock().engine.state_mut().resources_mut().get_mut(kind).map(edit)
    }

    /// Whether the set contains a resource of `kind`.
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.shared.lock().engine.state().resources().contains(kind)
    }

    /// Whether the set contains a resource of every kind in `kinds`.
    pub fn contains_all(&self, kinds: &[ResourceKind]) -> bool {
        let inner = self.shared.lock();
        let resources = inner.engine.state().resources();
        kinds.iter().all(|kind| resources.contains(*kind))
    }

    /// Ask the manager for the resources.
    ///
    /// Answered by `Granted` or `Denied`. If the set already holds its grant
    /// and always-reply is off, nothing is sent and nothing is notified.
    ///
    /// # Errors
    ///
    /// `EmptySet` without resources; `Connection` if the manager cannot be
    /// reached.
    pub fn acquire(&self) -> Result<(), ResourceSetError> {
        self.submit(RequestKind::Acquire)
    }

    /// Tell the manager the membership of the set changed.
    ///
    /// Answered by `UpdateOk`, or by `Granted` if the set holds a grant that
    /// the change affects.
    ///
    /// # Errors
    ///
    /// `Connection` if the manager cannot be reached.
    pub fn update(&self) -> Result<(), ResourceSetError> {
        self.submit(RequestKind::Update)
    }

    /// Give up the resources. Answered by `Released`.
    ///
    /// # Errors
    ///
    /// `Connection` if the manager cannot be reached.
    pub fn release(&self) -> Result<(), ResourceSetError> {
        self.submit(RequestKind::Release)
    }

    fn submit(&self, kind: RequestKind) -> Result<(), ResourceSetError> {
        let mut inner = self.shared.lock();
        let actions = inner.engine.submit(kind)?;
        inner.run(actions, Origin::Api)
    }

    /// Release instead of waiting for re-grant when preempted.
    ///
    /// # Errors
    ///
    /// `PolicyLatched` after the first acquire, update or release.
    pub fn set_auto_release(&self) -> Result<(), ResourceSetError> {
        self.shared.lock().engine.set_auto_release()
    }

    /// Always get a grant notification, even if nothing changed.
    ///
    /// # Errors
    ///
    /// `PolicyLatched` after the first acquire, update or release.
    pub fn set_always_reply(&self) -> Result<(), ResourceSetError> {
        self.shared.lock().engine.set_always_reply()
    }

    /// Identifier assigned by the manager, [`ResourceSetId::UNSET`] before
    /// the first connection.
    pub fn id(&self) -> ResourceSetId {
        self.shared.lock().engine.identifier()
    }

    /// Application class given at construction.
    pub fn application_class(&self) -> String {
        self.shared.lock().engine.state().application_class().to_string()
    }

    /// Whether auto-release is on.
    pub fn will_auto_release(&self) -> bool {
        self.shared.lock().engine.state().policy().auto_release
    }

    /// Whether always-reply is on.
    pub fn always_get_reply(&self) -> bool {
        self.shared.lock().engine.state().policy().always_reply
    }

    /// Whether the manager currently grants the set.
    pub fn has_resources_granted(&self) -> bool {
        self.shared.lock().engine.state().grant().is_granted()
    }

    /// Grant as last reported by the manager.
    pub fn grant_state(&self) -> GrantState {
        self.shared.lock().engine.state().grant()
    }

    /// Whether the resource of `kind` is in the set and granted.
    pub fn is_granted(&self, kind: ResourceKind) -> bool {
        self.shared.lock().engine.state().is_granted(kind)
    }

    /// Connection and request state.
    pub fn engine_state(&self) -> EngineState {
        self.shared.lock().engine.engine_state()
    }

    /// Requests not yet answered, head first.
    pub fn pending_requests(&self) -> Vec<RequestKind> {
        self.shared.lock().engine.queue().iter().collect()
    }

    /// Properties the manager negotiated for `kind`.
    pub fn negotiated_properties(&self, kind: ResourceKind) -> BTreeMap<String, String> {
        self.shared.lock().engine.state().negotiated(kind).cloned().unwrap_or_default()
    }
}

impl<T: Transport> Drop for ResourceSet<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if let Some(release) = inner.engine.farewell() {
            debug!(set_id = %release.identifier, "releasing grant of dropped set");
            if let Err(error) = inner.transport.send(&release) {
                warn!(set_id = %release.identifier, %error, "release of dropped set failed");
            }
        }
        inner.transport.disconnect();
    }
}

/// Delivers inbound manager events to a resource set.
///
/// Holds a weak reference; delivering to a dropped set fails with
/// `SetDropped`.
pub struct InboundHandle<T: Transport> {
    shared: Weak<Shared<T>>,
}

impl<T: Transport> InboundHandle<T> {
    /// Route an event to the set and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// `SetDropped` if the set no longer exists.
    pub fn deliver(&self, event: ManagerEvent) -> Result<(), ResourceSetError> {
        let shared = self.shared.upgrade().ok_or(ResourceSetError::SetDropped)?;
        let mut inner = shared.lock();
        let actions = inner.engine.handle(event);
        inner.run(actions, Origin::Reply)
    }

    /// Whether the set still exists.
    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }
}

impl<T: Transport> Clone for InboundHandle<T> {
    fn clone(&self) -> Self {
        Self { shared: Weak::clone(&self.shared) }
    }
}
