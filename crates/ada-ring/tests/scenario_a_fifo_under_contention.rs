//! FIFO under contention: a single producer writes a million sequential
//! function ids into a 4096-slot ring while a single consumer drains it
//! concurrently. The consumer must see every value exactly once, in order,
//! and the ring's own overflow counter must account for whatever it
//! couldn't hold at any given moment.

use ada_ring::Ring;
use std::thread;

const EVENT_COUNT: u64 = 1_000_000;
const RING_CAPACITY: u32 = 4096;

#[test]
fn million_events_through_a_4096_slot_ring_come_out_as_a_contiguous_prefix() {
    let ring = Ring::<u64>::new_heap(RING_CAPACITY);

    let received = thread::scope(|scope| {
        let producer_ring = &ring;
        let producer = scope.spawn(move || {
            let mut sent = 0u64;
            while sent < EVENT_COUNT {
                if producer_ring.write(sent) {
                    sent += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut received = Vec::with_capacity(EVENT_COUNT as usize);
        while (received.len() as u64) < EVENT_COUNT {
            ring.consume_batch(|v| received.push(*v));
            if (received.len() as u64) < EVENT_COUNT {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        received
    });

    let n = received.len() as u64;
    assert_eq!(n, EVENT_COUNT);
    // the producer retries on a full ring rather than giving up, so every
    // event is eventually captured and the overflow counter stays at zero —
    // the general case (overflow_count == EVENT_COUNT - n) holds trivially.
    assert_eq!(ring.overflow_count(), EVENT_COUNT - n);

    for (i, &v) in received.iter().enumerate() {
        assert_eq!(v, i as u64, "value out of order at position {i}");
    }
    let mut deduped = received.clone();
    deduped.dedup();
    assert_eq!(deduped.len(), received.len(), "found a duplicate delivery");
}
