//! Feed decoded manager events into an engine mid-request.
//!
//! Whatever the manager sends, the engine must never have more than one
//! request in flight and never lose queued requests it did not complete.

#![no_main]

use libfuzzer_sys::fuzz_target;
use respol_core::{EngineAction, Policy, Resource, ResourceEngine};
use respol_proto::{ManagerEvent, RequestKind, ResourceKind, ResourceSetId, codec};

fuzz_target!(|data: &[u8]| {
    let mut engine = ResourceEngine::new("player", Policy::default());
    engine.state_mut().resources_mut().insert(Resource::new(ResourceKind::AudioPlayback));

    let Ok(_) = engine.submit(RequestKind::Acquire) else { return };
    let _ = engine.submit(RequestKind::Update);
    engine.handle(ManagerEvent::ManagerUp { identifier: ResourceSetId(1) });

    for chunk in data.chunks(32) {
        let Ok(event) = codec::decode::<ManagerEvent>(chunk) else { continue };
        let before = engine.queue().len();
        let actions = engine.handle(event);

        let sent = actions.iter().filter(|a| matches!(a, EngineAction::Send(_))).count();
        assert!(sent <= 1);
        assert!(engine.queue().len() <= before);
    }
});
