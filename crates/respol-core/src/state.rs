//! Resource set state and its reaction to manager replies.
//!
//! [`SetState`] is everything a set knows about itself: its resources, its
//! latched policy, whether it wants a grant and what the manager last said.
//! Reply handlers here decide which notification (if any) a manager event
//! turns into and whether it completes the awaited request. Sequencing and
//! connection handling live in [`crate::engine`].

use std::collections::BTreeMap;

use respol_proto::{RequestKind, ResourceDescriptor, ResourceKind, ResourceKinds};
use tracing::{debug, warn};

use crate::{event::ResourceSetEvent, resource::Resource};

/// Grant status of a set as last reported by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrantState {
    /// Nothing asked yet, or released
    #[default]
    NoGrant,
    /// These kinds are held
    Granted(ResourceKinds),
    /// The last request was denied
    Denied,
    /// The grant was preempted
    Lost,
}

impl GrantState {
    /// Kinds currently held.
    pub fn granted(self) -> ResourceKinds {
        match self {
            Self::Granted(kinds) => kinds,
            Self::NoGrant | Self::Denied | Self::Lost => ResourceKinds::empty(),
        }
    }

    /// Whether any resource is held.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Latched policy flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Policy {
    /// Preemption releases the set instead of waiting for re-grant
    pub auto_release: bool,
    /// Request a reply even when the grant would not change
    pub always_reply: bool,
}

/// At most one resource per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    entries: BTreeMap<ResourceKind, Resource>,
}

impl ResourceMap {
    /// Insert or replace the resource of its kind. Returns the replaced one.
    pub fn insert(&mut self, resource: Resource) -> Option<Resource> {
        self.entries.insert(resource.kind(), resource)
    }

    /// Remove the resource of `kind`.
    pub fn remove(&mut self, kind: ResourceKind) -> Option<Resource> {
        self.entries.remove(&kind)
    }

    /// Resource of `kind`.
    pub fn get(&self, kind: ResourceKind) -> Option<&Resource> {
        self.entries.get(&kind)
    }

    /// Mutable resource of `kind`.
    pub fn get_mut(&mut self, kind: ResourceKind) -> Option<&mut Resource> {
        self.entries.get_mut(&kind)
    }

    /// Whether a resource of `kind` is present.
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Resources in kind order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.entries.values()
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no resources.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every kind present.
    pub fn kinds(&self) -> ResourceKinds {
        self.entries.keys().collect()
    }

    /// Optional kinds present.
    pub fn optional_kinds(&self) -> ResourceKinds {
        self.entries.values().filter(|r| r.is_optional()).map(Resource::kind).collect()
    }

    /// Mandatory kinds present.
    pub fn mandatory_kinds(&self) -> ResourceKinds {
        self.kinds().difference(self.optional_kinds())
    }

    /// Descriptor sent to the manager.
    pub fn descriptor(&self) -> ResourceDescriptor {
        ResourceDescriptor {
            all: self.kinds(),
            optional: self.optional_kinds(),
            audio: self
                .get(ResourceKind::AudioPlayback)
                .and_then(Resource::as_audio)
                .map(|audio| audio.properties().clone()),
            video_pid: self
                .get(ResourceKind::VideoPlayback)
                .and_then(Resource::as_video)
                .and_then(|video| video.process_id()),
        }
    }
}

/// Reaction to one manager reply.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Outcome {
    /// Notification for the application
    pub event: Option<ResourceSetEvent>,
    /// Whether the awaited request is complete
    pub completes: bool,
}

impl Outcome {
    fn notify(event: ResourceSetEvent, completes: bool) -> Self {
        Self { event: Some(event), completes }
    }

    fn silent(completes: bool) -> Self {
        Self { event: None, completes }
    }
}

/// Everything a resource set knows about itself.
#[derive(Debug, Clone)]
pub struct SetState {
    application_class: String,
    policy: Policy,
    resources: ResourceMap,
    grant: GrantState,
    acquire_mode: bool,
    negotiated: BTreeMap<ResourceKind, BTreeMap<String, String>>,
}

impl SetState {
    /// Fresh state for an application class.
    pub fn new(application_class: String, policy: Policy) -> Self {
        Self {
            application_class,
            policy,
            resources: ResourceMap::default(),
            grant: GrantState::NoGrant,
            acquire_mode: false,
            negotiated: BTreeMap::new(),
        }
    }

    /// Application class given at construction.
    pub fn application_class(&self) -> &str {
        &self.application_class
    }

    /// Current policy flags.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub(crate) fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// Resources of the set.
    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    /// Mutable resources of the set.
    pub fn resources_mut(&mut self) -> &mut ResourceMap {
        &mut self.resources
    }

    /// Grant as last reported by the manager.
    pub fn grant(&self) -> GrantState {
        self.grant
    }

    /// Whether `kind` is in the set and currently granted.
    pub fn is_granted(&self, kind: ResourceKind) -> bool {
        self.resources.contains(kind) && self.grant.granted().has(kind)
    }

    /// Whether the application currently wants its resources.
    pub fn in_acquire_mode(&self) -> bool {
        self.acquire_mode
    }

    pub(crate) fn set_acquire_mode(&mut self, acquire_mode: bool) {
        self.acquire_mode = acquire_mode;
    }

    /// Properties the manager negotiated for `kind`.
    pub fn negotiated(&self, kind: ResourceKind) -> Option<&BTreeMap<String, String>> {
        self.negotiated.get(&kind)
    }

    /// Optional kinds among `held`, as reported in a grant notification.
    fn granted_optional(&self, held: ResourceKinds) -> Vec<ResourceKind> {
        held.intersection(self.resources.optional_kinds()).to_vec()
    }

    pub(crate) fn on_granted(
        &mut self,
        granted: ResourceKinds,
        awaited: Option<RequestKind>,
    ) -> Outcome {
        let solicited = matches!(awaited, Some(RequestKind::Acquire | RequestKind::Update));
        if !solicited && !self.acquire_mode {
            warn!(class = %self.application_class, "ignoring grant the set is not waiting for");
            return Outcome::silent(false);
        }

        let held = granted.intersection(self.resources.kinds());
        if held.is_empty() || !held.contains(self.resources.mandatory_kinds()) {
            debug!(
                class = %self.application_class,
                granted = granted.bits(),
                "grant misses mandatory resources, treating as denied"
            );
            self.grant = GrantState::Denied;
            return Outcome::notify(ResourceSetEvent::Denied, solicited);
        }

        let unchanged = self.grant == GrantState::Granted(held);
        self.grant = GrantState::Granted(held);
        if unchanged && !self.policy.always_reply {
            return match awaited {
                Some(RequestKind::Update) => Outcome::notify(ResourceSetEvent::UpdateOk, true),
                _ => Outcome::silent(solicited),
            };
        }

        Outcome::notify(
            ResourceSetEvent::Granted { optional: self.granted_optional(held) },
            solicited,
        )
    }

    pub(crate) fn on_denied(&mut self, awaited: Option<RequestKind>) -> Outcome {
        self.grant = GrantState::Denied;
        let solicited = matches!(awaited, Some(RequestKind::Acquire | RequestKind::Update));
        Outcome::notify(ResourceSetEvent::Denied, solicited)
    }

    pub(crate) fn on_released(&mut self, awaited: Option<RequestKind>) -> Outcome {
        if awaited == Some(RequestKind::Release) {
            self.grant = GrantState::NoGrant;
            return Outcome::notify(ResourceSetEvent::Released, true);
        }
        debug!(class = %self.application_class, "unrequested release, manager revoked the grant");
        self.on_released_by_manager()
    }

    pub(crate) fn on_released_by_manager(&mut self) -> Outcome {
        self.grant = GrantState::NoGrant;
        self.acquire_mode = false;
        Outcome::notify(ResourceSetEvent::ReleasedByManager, false)
    }

    pub(crate) fn on_lost(&mut self) -> Outcome {
        self.grant = GrantState::Lost;
        if self.policy.auto_release {
            // Preemption counts as a release; only a new acquire brings the
            // resources back.
            self.acquire_mode = false;
        }
        Outcome::notify(ResourceSetEvent::LostResources, false)
    }

    pub(crate) fn on_became_available(&self, available: ResourceKinds) -> Outcome {
        let kinds = available
            .intersection(self.resources.kinds())
            .difference(self.grant.granted());
        if kinds.is_empty() {
            return Outcome::silent(false);
        }
        Outcome::notify(ResourceSetEvent::BecameAvailable { kinds: kinds.to_vec() }, false)
    }

    pub(crate) fn on_update_ok(&mut self, awaited: Option<RequestKind>) -> Outcome {
        if awaited == Some(RequestKind::Update) {
            // The grant cannot outlive membership.
            if let GrantState::Granted(held) = self.grant {
                let held = held.intersection(self.resources.kinds());
                self.grant =
                    if held.is_empty() { GrantState::NoGrant } else { GrantState::Granted(held) };
            }
            return Outcome::notify(ResourceSetEvent::UpdateOk, true);
        }
        warn!(
            class = %self.application_class,
            ?awaited,
            "update acknowledged without pending update"
        );
        Outcome::silent(false)
    }

    /// The manager connection went away; whatever it granted is gone.
    pub(crate) fn on_connection_lost(&mut self) {
        if self.grant.is_granted() {
            debug!(class = %self.application_class, "grant lost with the manager connection");
            self.grant = GrantState::Lost;
        }
    }

    pub(crate) fn on_property_changed(
        &mut self,
        kind: ResourceKind,
        name: String,
        value: String,
    ) -> Outcome {
        if !self.resources.contains(kind) {
            debug!(
                class = %self.application_class,
                %kind,
                %name,
                "property for a kind not in the set"
            );
            return Outcome::silent(false);
        }
        self.negotiated.entry(kind).or_default().insert(name.clone(), value.clone());
        Outcome::notify(ResourceSetEvent::PropertiesChanged { kind, name, value }, false)
    }
}
