//! Swap-on-full: an 8-slot active ring backed by 4 spare rings must rotate
//! through every spare as a producer keeps writing past each ring's
//! capacity, and the drain side must be able to reclaim every retired ring
//! and hand it back to the free queue in one pass.

use ada_registry::Lane;
use ada_ring::Ring;
use std::sync::atomic::AtomicU32;
use std::thread;
use std::time::Duration;

const SLOTS_PER_RING: u32 = 8;
const SPARE_RINGS: u32 = 4;
const TOTAL_RINGS: u32 = SPARE_RINGS + 1;
const EVENT_COUNT: u64 = 40;

fn build_lane() -> Lane<u64> {
    let rings: Vec<Ring<u64>> = (0..TOTAL_RINGS).map(|_| Ring::new_heap(SLOTS_PER_RING)).collect();
    let active_idx = Box::leak(Box::new(AtomicU32::new(0))) as *const AtomicU32;
    Lane::new(
        rings.into_boxed_slice(),
        Ring::new_heap(TOTAL_RINGS),
        Ring::new_heap(TOTAL_RINGS),
        active_idx,
    )
}

#[test]
fn producer_rotates_through_every_spare_ring_and_drain_reclaims_them() {
    let lane = build_lane();

    let mut ring_swaps = 0u32;
    let mut captured = Vec::with_capacity(EVENT_COUNT as usize);
    for i in 0..EVENT_COUNT {
        loop {
            if lane.active_ring().write(i) {
                captured.push(i);
                break;
            }
            if lane.swap_active_ring() {
                ring_swaps += 1;
                continue;
            }
            break; // no free ring left; this event is dropped
        }
    }

    // the pool holds exactly SPARE_RINGS + 1 rings of SLOTS_PER_RING each,
    // which is exactly EVENT_COUNT — every event fits and every spare ring
    // gets used once.
    assert_eq!(captured.len() as u64, EVENT_COUNT);
    assert!(
        captured.len() as u32 >= SPARE_RINGS * SLOTS_PER_RING,
        "expected at least a full pool's worth captured"
    );
    assert_eq!(ring_swaps, SPARE_RINGS, "expected the producer to rotate through every spare ring");

    thread::sleep(Duration::from_millis(50));

    // drain side: reclaim every retired ring in submission order, read it
    // out, then return it to the free queue — the free queue must come back
    // to non-empty within this one pass.
    let mut drained = Vec::with_capacity(EVENT_COUNT as usize);
    let mut reclaimed = 0u32;
    while let Some(idx) = lane.take_submitted_ring() {
        let ring = lane.ring(idx);
        ring.consume_batch(|v| drained.push(*v));
        assert!(lane.return_free_ring(idx));
        reclaimed += 1;
    }
    lane.active_ring().consume_batch(|v| drained.push(*v));

    assert_eq!(reclaimed, ring_swaps);
    assert_eq!(drained, captured, "per-thread FIFO order must survive the ring rotation");

    // every retired ring came back, so one more swap must succeed.
    assert!(lane.swap_active_ring());
}
