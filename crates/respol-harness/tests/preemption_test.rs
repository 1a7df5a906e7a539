//! Arbitration between applications and recovery from manager restarts.

use std::sync::Arc;

use respol_core::{
    EngineState, GrantState, ResourceSet, ResourceSetConfig, ResourceSetEvent,
};
use respol_harness::{SimManager, SimTransport};
use respol_proto::{RequestKind, ResourceKind, ResourceKinds};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn drain(events: &mut UnboundedReceiver<ResourceSetEvent>) -> Vec<ResourceSetEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn audio_set(manager: &Arc<SimManager>, config: ResourceSetConfig) -> ResourceSet<SimTransport> {
    let set = manager.resource_set_with(config);
    set.add_resource(ResourceKind::AudioPlayback).expect("known kind");
    set
}

#[test]
fn preempted_set_is_regranted_without_auto_release() {
    init_tracing();
    let manager = SimManager::new();
    let player = audio_set(&manager, ResourceSetConfig::new("player"));
    let call = audio_set(&manager, ResourceSetConfig::new("call"));
    let mut player_events = player.subscribe();

    player.acquire().expect("manager reachable");
    manager.deliver_all();

    call.acquire().expect("manager reachable");
    manager.deliver_all();
    assert_eq!(player.grant_state(), GrantState::Lost);
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), Some(call.id()));

    call.release().expect("connected");
    manager.deliver_all();

    insta::assert_debug_snapshot!(drain(&mut player_events), @r"
    [
        ManagerIsUp,
        Granted {
            optional: [],
        },
        LostResources,
        Granted {
            optional: [],
        },
    ]
    ");
    assert!(player.has_resources_granted());
    assert_eq!(manager.requests_of(player.id()), vec![RequestKind::Acquire]);
}

#[test]
fn auto_release_set_is_told_resources_came_back() {
    let manager = SimManager::new();
    let player = audio_set(&manager, ResourceSetConfig {
        auto_release: true,
        ..ResourceSetConfig::new("player")
    });
    let call = audio_set(&manager, ResourceSetConfig::new("call"));
    let mut player_events = player.subscribe();

    player.acquire().expect("manager reachable");
    manager.deliver_all();
    call.acquire().expect("manager reachable");
    manager.deliver_all();
    call.release().expect("connected");
    manager.deliver_all();

    insta::assert_debug_snapshot!(drain(&mut player_events), @r"
    [
        ManagerIsUp,
        Granted {
            optional: [],
        },
        LostResources,
        BecameAvailable {
            kinds: [
                AudioPlayback,
            ],
        },
    ]
    ");
    assert!(!player.has_resources_granted());
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), None);

    player.acquire().expect("connected");
    manager.deliver_all();
    assert!(player.has_resources_granted());
}

#[test]
fn lower_priority_acquire_is_denied() {
    let manager = SimManager::new();
    let call = audio_set(&manager, ResourceSetConfig::new("call"));
    let game = audio_set(&manager, ResourceSetConfig::new("game"));
    let mut game_events = game.subscribe();

    call.acquire().expect("manager reachable");
    manager.deliver_all();
    game.acquire().expect("manager reachable");
    manager.deliver_all();

    assert_eq!(
        drain(&mut game_events),
        vec![ResourceSetEvent::ManagerIsUp, ResourceSetEvent::Denied]
    );
    assert!(call.has_resources_granted());
}

#[test]
fn optional_kinds_do_not_block_a_grant() {
    let manager = SimManager::new();
    let call = audio_set(&manager, ResourceSetConfig::new("call"));
    let player = audio_set(&manager, ResourceSetConfig::new("background"));
    call.add_resource(ResourceKind::Vibra).expect("known kind");
    player.delete_resource(ResourceKind::AudioPlayback);
    player.add_resource(ResourceKind::Vibra).expect("known kind");
    player.add_resource(ResourceKind::Leds).expect("known kind");
    player.with_resource_mut(ResourceKind::Vibra, |vibra| vibra.set_optional(true));

    call.acquire().expect("manager reachable");
    manager.deliver_all();
    player.acquire().expect("manager reachable");
    manager.deliver_all();

    assert_eq!(player.grant_state(), GrantState::Granted(ResourceKinds::LEDS));
    assert!(!player.is_granted(ResourceKind::Vibra));
    assert_eq!(
        manager.granted_to(call.id()),
        ResourceKinds::AUDIO_PLAYBACK | ResourceKinds::VIBRA
    );
}

#[test]
fn in_flight_request_is_resent_after_manager_restart() {
    init_tracing();
    let manager = SimManager::new();
    let set = audio_set(&manager, ResourceSetConfig::new("player"));
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    let id = set.id();

    let mut events = set.subscribe();
    set.update().expect("connected");
    manager.go_down();
    manager.deliver_all();

    assert_eq!(drain(&mut events), vec![ResourceSetEvent::ManagerIsDown]);
    assert_eq!(set.engine_state(), EngineState::Disconnected);
    assert_eq!(set.pending_requests(), vec![RequestKind::Update]);

    manager.come_up();
    manager.deliver_all();

    // The restarted manager forgot the grant, so the update is followed by
    // a fresh acquire.
    assert_eq!(drain(&mut events), vec![
        ResourceSetEvent::ManagerIsUp,
        ResourceSetEvent::UpdateOk,
        ResourceSetEvent::Granted { optional: vec![] },
    ]);
    assert_eq!(set.id(), id);
    assert_eq!(manager.requests_of(id), vec![
        RequestKind::Acquire,
        RequestKind::Update,
        RequestKind::Update,
        RequestKind::Acquire,
    ]);
    assert_eq!(manager.overlaps(), 0);
    assert_eq!(set.engine_state(), EngineState::Idle);
}

#[test]
fn requests_while_manager_is_down_fail() {
    let manager = SimManager::new();
    let set = audio_set(&manager, ResourceSetConfig::new("player"));
    set.acquire().expect("manager reachable");
    manager.deliver_all();

    manager.go_down();
    manager.deliver_all();

    assert!(set.release().is_err());
    assert!(set.pending_requests().is_empty());

    manager.come_up();
    manager.deliver_all();
    set.release().expect("reconnected");
    manager.deliver_all();
    assert!(!set.has_resources_granted());
}

#[test]
fn grant_is_reacquired_after_manager_restart() {
    let manager = SimManager::new();
    let set = audio_set(&manager, ResourceSetConfig::new("player"));
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    let id = set.id();
    let mut events = set.subscribe();

    manager.go_down();
    manager.deliver_all();
    assert_eq!(set.grant_state(), GrantState::Lost);
    assert!(!set.has_resources_granted());

    manager.come_up();
    manager.deliver_all();

    assert_eq!(drain(&mut events), vec![
        ResourceSetEvent::ManagerIsDown,
        ResourceSetEvent::ManagerIsUp,
        ResourceSetEvent::Granted { optional: vec![] },
    ]);
    assert_eq!(manager.requests_of(id), vec![RequestKind::Acquire, RequestKind::Acquire]);
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), Some(id));
    assert_eq!(set.grant_state(), GrantState::Granted(ResourceKinds::AUDIO_PLAYBACK));
}

#[test]
fn released_set_stays_released_after_manager_restart() {
    let manager = SimManager::new();
    let set = audio_set(&manager, ResourceSetConfig::new("player"));
    set.acquire().expect("manager reachable");
    manager.deliver_all();
    set.release().expect("connected");
    manager.deliver_all();

    manager.go_down();
    manager.deliver_all();
    manager.come_up();
    manager.deliver_all();

    assert_eq!(manager.requests_of(set.id()), vec![RequestKind::Acquire, RequestKind::Release]);
    assert_eq!(manager.owner_of(ResourceKind::AudioPlayback), None);
}
