//! Registration storm: `capacity` threads race to register at once, every
//! slot fills exactly once, and the registry refuses anything past capacity
//! without disturbing what is already there.

use ada_agent::{CaptureContext, Clock};
use ada_registry::RegisterError;
use ada_sim::harness::build_session;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

fn ctx() -> CaptureContext {
    CaptureContext {
        registers: [0; 8],
        frame_pointer: 0,
        stack_pointer: 0,
        link_register: 0,
    }
}

#[test]
fn every_thread_gets_a_distinct_slot_and_the_mask_fills_exactly() {
    let capacity = 16u32;
    let config = ada_registry::RegistryConfig::new(capacity, 64, 32);
    let session = build_session(config);

    // registry_ready + a fresh heartbeat let the mode tick promote past
    // GLOBAL_ONLY on each thread's first call, so registration actually
    // lands events in a per-thread lane rather than only the global ring.
    let block = session.producer.control.block();
    block.registry_ready.store(1, Ordering::Release);
    block.registry_epoch.store(1, Ordering::Release);
    block.drain_heartbeat_ns.store(session.producer.clock.now_ns(), Ordering::Release);

    let producer = Arc::new(session.producer);
    let handles: Vec<_> = (0..capacity as u64)
        .map(|tid| {
            let producer = Arc::clone(&producer);
            thread::spawn(move || {
                producer.on_call(&ctx(), tid);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let registry = producer.registry.as_ref().expect("registry attached by build_session");
    assert_eq!(registry.get_active_count(), capacity);
    assert_eq!(registry.active_mask().count_ones(), capacity);

    // one more registration past capacity must fail without touching the
    // slots already claimed.
    let overflow = registry.register(u64::MAX);
    assert!(matches!(overflow, Err(RegisterError::RegistryFull)));
    assert_eq!(registry.get_active_count(), capacity);

    // every slot's thread_id is stable and unique — nobody got displaced.
    let mut thread_ids: Vec<u64> = (0..capacity).map(|idx| registry.thread_id_at(idx).unwrap()).collect();
    thread_ids.sort_unstable();
    thread_ids.dedup();
    assert_eq!(thread_ids.len(), capacity as usize);
}

#[test]
fn registering_an_already_active_thread_is_a_no_op() {
    let config = ada_registry::RegistryConfig::new(4, 64, 32);
    let session = build_session(config);
    let registry = session.producer.registry.unwrap();

    let first = registry.register(7).unwrap();
    for _ in 0..10 {
        assert_eq!(registry.register(7).unwrap(), first);
    }
    assert_eq!(registry.get_active_count(), 1);
}
