//! Process-local view of one lane's ring pool (§4.3 "Lane operations").
//!
//! [`LaneDescriptor`](crate::abi::LaneDescriptor) in shared memory records
//! *where* a lane's rings live; `Lane<T>` is the live handle a single
//! process builds by resolving that descriptor against its own mapping —
//! the producer via [`ada_ring::Ring::create`] at registration time, the
//! drain via [`ada_ring::Ring::attach`] whenever it discovers a new active
//! slot. `active_idx` is *not* duplicated locally: both sides read and
//! write the one copy inside the shared `LaneDescriptor`, which is how the
//! drain ever observes a swap the producer made in a different process.

use ada_ring::Ring;
use std::sync::atomic::{AtomicU32, Ordering};

/// Owner-side (single-producer) and drain-side (single-consumer) operations
/// over one lane's ring pool.
pub struct Lane<T: Copy> {
    rings: Box<[Ring<T>]>,
    /// Points at the `active_idx` field inside this process's mapping of the
    /// owning `LaneDescriptor`. Valid for as long as the registry segment
    /// that produced it stays mapped, which outlives every `Lane`.
    active_idx: *const AtomicU32,
    free_queue: Ring<u32>,
    submit_queue: Ring<u32>,
}

// SAFETY: `active_idx` points into memory owned by the registry's mmap,
// which is `Send + Sync` in its own right (POSIX shared memory has no
// thread affinity); `Ring<T>` is already `Send`/`Sync` for `T: Send`.
unsafe impl<T: Copy + Send> Send for Lane<T> {}
unsafe impl<T: Copy + Send> Sync for Lane<T> {}

impl<T: Copy> Lane<T> {
    fn active_idx(&self) -> &AtomicU32 {
        // SAFETY: see the field doc comment.
        unsafe { &*self.active_idx }
    }

    /// Builds a lane from freshly created rings and queues (registration).
    /// `rings` must be non-empty; ring 0 starts active and every other ring
    /// is pushed onto `free_queue`.
    pub(crate) fn new(
        rings: Box<[Ring<T>]>,
        free_queue: Ring<u32>,
        submit_queue: Ring<u32>,
        active_idx: *const AtomicU32,
    ) -> Self {
        debug_assert!(!rings.is_empty());
        for idx in 1..rings.len() as u32 {
            free_queue.write(idx);
        }
        let lane = Self {
            rings,
            active_idx,
            free_queue,
            submit_queue,
        };
        lane.active_idx().store(0, Ordering::Release);
        lane
    }

    /// Builds a lane over already-populated rings and queues (drain-side
    /// attach). Neither the free queue nor `active_idx` are touched — they
    /// already hold whatever the producer left them in.
    pub(crate) fn attach(
        rings: Box<[Ring<T>]>,
        free_queue: Ring<u32>,
        submit_queue: Ring<u32>,
        active_idx: *const AtomicU32,
    ) -> Self {
        Self {
            rings,
            active_idx,
            free_queue,
            submit_queue,
        }
    }

    #[must_use]
    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    /// §4.3 `get_active_ring`.
    #[must_use]
    pub fn active_ring(&self) -> &Ring<T> {
        &self.rings[self.active_idx().load(Ordering::Acquire) as usize]
    }

    #[must_use]
    pub fn ring(&self, idx: u32) -> &Ring<T> {
        &self.rings[idx as usize]
    }

    #[must_use]
    pub fn active_index(&self) -> u32 {
        self.active_idx().load(Ordering::Acquire)
    }

    // -- owner-side (producer) --------------------------------------------

    /// §4.3 `swap_active_ring`. Pops one index from the free queue and
    /// atomically makes it active, enqueuing the previous active index on
    /// the submit queue for the drain. Returns `false` if no free ring is
    /// available — the caller drops the event that triggered the swap.
    pub fn swap_active_ring(&self) -> bool {
        let Some(next) = self.free_queue.read() else {
            return false;
        };
        let prev = self.active_idx().swap(next, Ordering::AcqRel);
        // The submit queue is sized to >= ring_count (§4.3), so this should
        // never see backpressure; if it somehow does, the ring is dropped
        // from rotation rather than blocking the producer.
        let _ = self.submit_queue.write(prev);
        true
    }

    // -- drain-side (consumer) ---------------------------------------------

    /// §4.3 `take_submitted_ring`.
    pub fn take_submitted_ring(&self) -> Option<u32> {
        self.submit_queue.read()
    }

    /// §4.3 `return_free_ring`. Returns `false` only if the free queue is
    /// unexpectedly full (should not happen under the invariant
    /// `free + submit + 1 <= ring_count`).
    pub fn return_free_ring(&self, idx: u32) -> bool {
        self.free_queue.write(idx)
    }
}
