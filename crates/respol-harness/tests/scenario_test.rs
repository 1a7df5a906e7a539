//! End-to-end scenarios against the simulated manager.
//!
//! Each test drives a real `ResourceSet` through a `SimTransport`, delivers
//! the manager's replies explicitly and checks the notifications the
//! application saw.

use respol_core::{
    GrantState, Resource, ResourceSet, ResourceSetConfig, ResourceSetError, ResourceSetEvent,
    TransportError,
};
use respol_harness::{Observed, SimManager, SimTransport};
use respol_proto::{ManagerEvent, RequestKind, ResourceKind, ResourceKinds, ResourceSetId};
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(events: &mut UnboundedReceiver<ResourceSetEvent>) -> Vec<ResourceSetEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn grants(events: &[ResourceSetEvent]) -> usize {
    events.iter().filter(|e| matches!(e, ResourceSetEvent::Granted { .. })).count()
}

fn player_with_audio(manager: &std::sync::Arc<SimManager>) -> ResourceSet<SimTransport> {
    let set = manager.resource_set("player");
    set.add_resource(ResourceKind::AudioPlayback).expect("known kind");
    set
}

#[test]
fn acquire_mandatory_audio_is_granted_once() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    manager.deliver_all();

    let seen = drain(&mut events);
    assert_eq!(
        seen,
        vec![ResourceSetEvent::ManagerIsUp, ResourceSetEvent::Granted { optional: vec![] }]
    );
    assert!(set.has_resources_granted());
    assert!(set.is_granted(ResourceKind::AudioPlayback));
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), Some(set.id()));
}

#[test]
fn denied_acquire_never_reports_a_grant() {
    let manager = SimManager::scripted();
    let set = manager.resource_set("player");
    set.add_resource_object(Resource::new(ResourceKind::VideoPlayback).optional());
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    manager.deliver_all();
    assert_eq!(manager.requests_of(set.id()), vec![RequestKind::Acquire]);

    manager.reply(set.id(), ManagerEvent::Denied { identifier: set.id() });
    manager.deliver_all();

    let seen = drain(&mut events);
    assert_eq!(seen, vec![ResourceSetEvent::ManagerIsUp, ResourceSetEvent::Denied]);
    assert!(!set.has_resources_granted());
    assert_eq!(set.grant_state(), GrantState::Denied);
    assert!(set.pending_requests().is_empty());
}

#[test]
fn update_after_delete_reports_reduced_grant() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.add_resource(ResourceKind::VideoPlayback).expect("known kind");
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    assert_eq!(
        set.grant_state().granted(),
        ResourceKinds::AUDIO_PLAYBACK | ResourceKinds::VIDEO_PLAYBACK
    );

    let mut events = set.subscribe();
    set.delete_resource(ResourceKind::VideoPlayback);
    set.update().expect("connected");
    manager.deliver_all();

    let seen = drain(&mut events);
    assert_eq!(seen, vec![ResourceSetEvent::Granted { optional: vec![] }]);
    assert_eq!(set.grant_state(), GrantState::Granted(ResourceKinds::AUDIO_PLAYBACK));
    assert_eq!(manager.owner_of(ResourceKind::VideoPlayback), None);
}

#[test]
fn acknowledged_update_drops_deleted_kinds_from_the_grant() {
    let manager = SimManager::scripted();
    let set = player_with_audio(&manager);
    set.add_resource(ResourceKind::VideoPlayback).expect("known kind");
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    let id = set.id();
    let both = ResourceKinds::AUDIO_PLAYBACK | ResourceKinds::VIDEO_PLAYBACK;
    manager.reply(id, ManagerEvent::Granted { identifier: id, granted: both });
    manager.deliver_all();

    set.delete_resource(ResourceKind::VideoPlayback);
    set.update().expect("connected");
    manager.deliver_all();
    manager.reply(id, ManagerEvent::UpdateOk { identifier: id });
    manager.deliver_all();

    assert_eq!(set.grant_state(), GrantState::Granted(ResourceKinds::AUDIO_PLAYBACK));
    assert!(!set.is_granted(ResourceKind::VideoPlayback));
}

#[test]
fn optional_resources_are_reported_with_the_grant() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.add_resource_object(Resource::new(ResourceKind::VideoPlayback).optional());
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    manager.deliver_all();

    assert_eq!(
        drain(&mut events).last(),
        Some(&ResourceSetEvent::Granted { optional: vec![ResourceKind::VideoPlayback] })
    );
}

#[test]
fn second_acquire_while_granted_stays_local() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    set.acquire().expect("queued");
    manager.deliver_all();

    assert_eq!(manager.requests_of(set.id()), vec![RequestKind::Acquire]);
    assert_eq!(grants(&drain(&mut events)), 1);
    assert!(set.pending_requests().is_empty());
}

#[test]
fn always_reply_repeats_unchanged_grant() {
    let manager = SimManager::new();
    let set = manager.resource_set_with(ResourceSetConfig {
        always_reply: true,
        ..ResourceSetConfig::new("player")
    });
    set.add_resource(ResourceKind::AudioPlayback).expect("known kind");
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    set.acquire().expect("queued");
    set.update().expect("queued");
    manager.deliver_all();

    assert_eq!(
        manager.requests_of(set.id()),
        vec![RequestKind::Acquire, RequestKind::Acquire, RequestKind::Update]
    );
    assert_eq!(grants(&drain(&mut events)), 3);
    assert_eq!(manager.overlaps(), 0);
}

#[test]
fn unchanged_update_without_always_reply_is_acknowledged() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.acquire().expect("manager reachable");
    manager.deliver_all();

    let mut events = set.subscribe();
    set.update().expect("connected");
    manager.deliver_all();

    assert_eq!(drain(&mut events), vec![ResourceSetEvent::UpdateOk]);
}

#[test]
fn update_before_acquire_is_acknowledged() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    let mut events = set.subscribe();

    set.update().expect("manager reachable");
    manager.deliver_all();

    assert_eq!(drain(&mut events), vec![ResourceSetEvent::ManagerIsUp, ResourceSetEvent::UpdateOk]);
    assert!(!set.has_resources_granted());
}

#[test]
fn release_is_answered_and_frees_the_kinds() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.acquire().expect("manager reachable");
    manager.deliver_all();

    let mut events = set.subscribe();
    set.release().expect("connected");
    manager.deliver_all();

    let seen = drain(&mut events);
    assert_eq!(seen.first(), Some(&ResourceSetEvent::Released));
    assert!(!set.has_resources_granted());
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), None);
}

#[test]
fn release_before_any_connection_is_silent() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    let mut events = set.subscribe();

    set.release().expect("nothing to release");

    assert!(drain(&mut events).is_empty());
    assert!(manager.observed().is_empty());
    assert_eq!(set.id(), ResourceSetId::UNSET);
}

#[test]
fn empty_set_cannot_acquire() {
    let manager = SimManager::new();
    let set = manager.resource_set("player");

    assert_eq!(set.acquire(), Err(ResourceSetError::EmptySet));
    assert!(manager.observed().is_empty());
}

#[test]
fn unreachable_manager_fails_the_call_and_keeps_the_queue() {
    let manager = SimManager::new();
    manager.set_reachable(false);
    let set = player_with_audio(&manager);

    let result = set.acquire();
    assert!(matches!(
        result,
        Err(ResourceSetError::Connection(TransportError::Unreachable(_)))
    ));
    assert!(set.pending_requests().is_empty());

    manager.set_reachable(true);
    set.acquire().expect("manager reachable again");
    manager.deliver_all();
    assert!(set.has_resources_granted());
}

#[test]
fn manager_error_is_forwarded_and_unblocks_the_queue() {
    let manager = SimManager::scripted();
    let set = player_with_audio(&manager);
    let mut events = set.subscribe();

    set.acquire().expect("manager reachable");
    set.release().expect("queued");
    manager.deliver_all();

    manager.reply(set.id(), ManagerEvent::Error { code: 22, message: "bad request".into() });
    manager.deliver_all();

    assert_eq!(manager.requests_of(set.id()), vec![RequestKind::Acquire, RequestKind::Release]);
    let error = ResourceSetEvent::Error { code: 22, message: "bad request".into() };
    assert!(drain(&mut events).contains(&error));
}

#[test]
fn property_changes_are_cached_for_members() {
    let manager = SimManager::scripted();
    let set = player_with_audio(&manager);
    set.acquire().expect("manager reachable");
    manager.deliver_all();

    let id = set.id();
    manager.push(id, ManagerEvent::PropertyChanged {
        identifier: id,
        kind: ResourceKind::AudioPlayback,
        name: "policy.volume".into(),
        value: "80".into(),
    });
    manager.push(id, ManagerEvent::PropertyChanged {
        identifier: id,
        kind: ResourceKind::Leds,
        name: "pattern".into(),
        value: "blink".into(),
    });
    manager.deliver_all();

    let negotiated = set.negotiated_properties(ResourceKind::AudioPlayback);
    assert_eq!(negotiated.get("policy.volume").map(String::as_str), Some("80"));
    assert!(set.negotiated_properties(ResourceKind::Leds).is_empty());
}

#[test]
fn dropping_a_granted_set_releases_it() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    let id = set.id();

    drop(set);

    assert_eq!(manager.requests_of(id), vec![RequestKind::Acquire, RequestKind::Release]);
    assert_eq!(manager.observed().last(), Some(&Observed::Disconnected { identifier: id }));
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), None);
    manager.deliver_all();
}

#[test]
fn policy_flags_latch_after_first_request() {
    let manager = SimManager::new();
    let set = player_with_audio(&manager);
    set.set_auto_release().expect("not started");

    set.acquire().expect("manager reachable");

    assert_eq!(
        set.set_always_reply(),
        Err(ResourceSetError::PolicyLatched { flag: "always-reply" })
    );
    assert!(set.will_auto_release());
    assert!(!set.always_get_reply());
}
