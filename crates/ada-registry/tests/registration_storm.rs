//! Concurrent registration against a real shared-memory-backed registry:
//! many threads race `register`, the drain side attaches every slot they
//! claimed, and capacity is never exceeded.

use ada_registry::{registry_segment_len, EventKind, IndexEvent, RegisterError, RegistryConfig, ThreadRegistry};
use ada_shm::Segment;
use std::sync::Arc;
use std::thread;

fn unique_name(tag: &str) -> String {
    format!("ada_registry_storm_{tag}_{}", std::process::id())
}

#[test]
fn concurrent_threads_claim_every_slot_exactly_once() {
    let config = RegistryConfig::new(32, 16, 16);
    let len = registry_segment_len(&config);
    let name = unique_name("claim");

    let producer_segment = Segment::create(&name, len).unwrap();
    let registry = Arc::new(ThreadRegistry::create(producer_segment, config).unwrap());

    let handles: Vec<_> = (0..config.capacity as u64)
        .map(|tid| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.register(tid).unwrap())
        })
        .collect();
    let mut slots: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    slots.sort_unstable();
    slots.dedup();

    assert_eq!(slots.len(), config.capacity as usize);
    assert_eq!(registry.get_active_count(), config.capacity);
    assert_eq!(registry.active_mask(), u64::MAX >> (64 - config.capacity));
    assert!(matches!(registry.register(u64::MAX), Err(RegisterError::RegistryFull)));

    let registry = Arc::try_unwrap(registry).unwrap_or_else(|_| panic!("registration threads still hold the Arc"));

    let drain_segment = Segment::open(&name, len).unwrap();
    let drain = ThreadRegistry::attach(drain_segment, config).unwrap();
    for idx in 0..config.capacity {
        let producer_lanes = registry.lanes(idx).expect("slot claimed above");
        producer_lanes
            .index
            .active_ring()
            .write(IndexEvent::new(idx as u64, idx as u64, idx as u64, EventKind::Call, 0));

        let drain_lanes = drain.attach_thread(idx).expect("producer registered this slot");
        let event = drain_lanes.index.active_ring().read().expect("event just written");
        assert_eq!(event.thread_id, idx as u64);
    }
}

#[test]
fn shutdown_mid_storm_stops_new_registrations_without_losing_active_ones() {
    let config = RegistryConfig::new(8, 16, 16);
    let len = registry_segment_len(&config);
    let segment = Segment::create(&unique_name("shutdown"), len).unwrap();
    let registry = Arc::new(ThreadRegistry::create(segment, config).unwrap());

    for tid in 0..4u64 {
        registry.register(tid).unwrap();
    }
    let active_before = registry.active_mask();

    registry.stop_accepting();
    assert!(matches!(registry.register(999), Err(RegisterError::RegistryFull)));
    assert_eq!(registry.active_mask(), active_before);

    registry.request_shutdown();
    assert!(registry.is_shutdown_requested());
    assert_eq!(registry.active_mask().count_ones(), 4);
}
