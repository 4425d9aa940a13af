//! Mode promotion: a producer starts before the registry is ready, watches
//! it come up and stay healthy, then watches the drain's heartbeat go
//! stale. The mode must walk the full
//! `GLOBAL_ONLY -> DUAL_WRITE -> PER_THREAD_ONLY -> DUAL_WRITE -> GLOBAL_ONLY`
//! sequence, one step per tick, and nothing is ever dropped along the way.

use ada_agent::{CaptureContext, Clock};
use ada_registry::{Mode, RegistryConfig};
use ada_sim::harness::build_session;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

fn ctx() -> CaptureContext {
    CaptureContext {
        registers: [0; 8],
        frame_pointer: 0,
        stack_pointer: 0,
        link_register: 0,
    }
}

#[test]
fn mode_walks_the_full_promotion_and_fallback_sequence() {
    // one thread, one lane, ring capacities generous enough that nothing in
    // this scenario ever overflows — the point here is the mode sequence,
    // not backpressure.
    let config = RegistryConfig::new(1, 32768, 1024);
    let mut session = build_session(config);
    session.producer.hb_timeout_ns = 5_000_000; // 5ms, so staleness is cheap to simulate

    let control = session.producer.control.block();

    // Phase 1: registry not ready yet. 10,000 events, mode must never leave
    // GLOBAL_ONLY and no transition gets counted.
    for i in 0..10_000u64 {
        session.producer.on_call(&ctx(), i);
    }
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::GlobalOnly as u32);
    assert_eq!(control.mode_transitions.load(Ordering::Relaxed), 0);
    assert_eq!(control.fallback_events.load(Ordering::Relaxed), 0);

    // Controller comes up: ready, epoch bumped, heartbeat fresh.
    control.registry_ready.store(1, Ordering::Release);
    control.registry_epoch.store(1, Ordering::Release);
    control.drain_heartbeat_ns.store(session.producer.clock.now_ns(), Ordering::Release);

    // First call while healthy promotes GLOBAL_ONLY -> DUAL_WRITE.
    session.producer.on_call(&ctx(), 10_000);
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::DualWrite as u32);

    // Second call while still healthy promotes DUAL_WRITE -> PER_THREAD_ONLY.
    session.producer.on_call(&ctx(), 10_001);
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::PerThreadOnly as u32);
    assert_eq!(control.mode_transitions.load(Ordering::Relaxed), 2);
    assert_eq!(control.fallback_events.load(Ordering::Relaxed), 0);

    // 9,998 more events (rounding the "10,000 more events" phase out to an
    // even number with the two promotion calls above) while heartbeat stays
    // fresh: mode holds steady at PER_THREAD_ONLY.
    for i in 0..9_998u64 {
        session.producer.on_call(&ctx(), 10_002 + i);
    }
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::PerThreadOnly as u32);
    assert_eq!(control.mode_transitions.load(Ordering::Relaxed), 2);

    // Heartbeat stops. Once it's older than hb_timeout_ns, health flips.
    thread::sleep(Duration::from_millis(10));

    // Third call: unhealthy now, PER_THREAD_ONLY -> DUAL_WRITE (fallback).
    session.producer.on_call(&ctx(), 20_000);
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::DualWrite as u32);

    // Fourth call: still unhealthy, DUAL_WRITE -> GLOBAL_ONLY (fallback).
    session.producer.on_call(&ctx(), 20_001);
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::GlobalOnly as u32);
    assert_eq!(control.mode_transitions.load(Ordering::Relaxed), 2);
    assert_eq!(control.fallback_events.load(Ordering::Relaxed), 2);

    // One more call settles: GLOBAL_ONLY stays GLOBAL_ONLY, no-op.
    session.producer.on_call(&ctx(), 20_002);
    assert_eq!(control.registry_mode.load(Ordering::Acquire), Mode::GlobalOnly as u32);
    assert_eq!(control.mode_transitions.load(Ordering::Relaxed), 2);
    assert_eq!(control.fallback_events.load(Ordering::Relaxed), 2);

    // Nothing dropped: every sink sized large enough that neither the
    // global ring nor the per-thread lane ever overflowed.
    assert_eq!(session.producer.global.index.overflow_count(), 0);
    let registry = session.producer.registry.as_ref().unwrap();
    let lane = &registry.lanes(0).unwrap().index;
    assert_eq!(lane.active_ring().overflow_count(), 0);

    let mut delivered = 0u64;
    session.producer.global.index.consume_up_to(usize::MAX, |_| delivered += 1);
    delivered += lane.active_ring().len() as u64;
    assert!(delivered >= 20_000, "expected at least 20,000 events delivered across both sinks, got {delivered}");
}
