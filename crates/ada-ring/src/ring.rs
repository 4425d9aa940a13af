// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Classic SPSC protocol over unbounded u64 sequence numbers (no ABA, no
// wrap-around bookkeeping beyond masking on slot access):
//
// **Producer (write path):**
// 1. Load `write` with Relaxed (only the producer writes it).
// 2. Load `read` with Acquire (syncs with the consumer's Release store).
// 3. Compute available space; bail out (and count an overflow) if full.
// 4. Write the slot (no ordering needed beyond step 2's happens-before).
// 5. Store `write` with Release (publishes the slot to the consumer).
//
// **Consumer (read path):** symmetric, with `read`/`write` swapped and a
// final Release store of `read` that the producer's next Acquire observes.
//
// This mirrors the protocol used by the single-process ring this module is
// adapted from, generalized to operate over a caller-supplied byte region
// (so the same ring can live in a local heap allocation or in a
// cross-process shared-memory segment) instead of an owned
// `Vec<MaybeUninit<T>>`.
// =============================================================================

use crate::backoff::Backoff;
use crate::error::RingError;
use crate::header::{RingHeader, HEADER_SIZE};
use crate::invariants::{
    debug_assert_bounded_count, debug_assert_head_not_past_tail, debug_assert_initialized_read,
    debug_assert_monotonic,
};
use crate::reservation::Reservation;
use std::alloc::Layout;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

/// A single-producer single-consumer ring buffer over a caller-supplied byte
/// region (§4.2). The region's first [`HEADER_SIZE`] bytes hold a
/// [`RingHeader`]; the remainder is a contiguous array of `capacity` slots of
/// `size_of::<T>()` bytes each.
///
/// `Ring` does not own the memory unless constructed via [`Ring::new_heap`]
/// — when backed by shared memory, the segment (see `ada-shm`) owns the
/// mapping and must outlive every `Ring` built on it.
pub struct Ring<T> {
    base: *mut u8,
    capacity: usize,
    mask: usize,
    owned_layout: Option<Layout>,
    _marker: PhantomData<T>,
}

// SAFETY: all shared access goes through the atomic write/read positions in
// the header; T itself is never accessed from more than one side of the
// producer/consumer split at a time.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    /// Total byte size required to hold a ring of the given `capacity`
    /// (must be a power of two).
    #[must_use]
    pub fn total_bytes(capacity: u32) -> usize {
        HEADER_SIZE + capacity as usize * std::mem::size_of::<T>()
    }

    /// Initializes a fresh ring header and slot array within `memory`
    /// (creator side, §4.2 `create`).
    ///
    /// `memory` must be exactly [`Ring::total_bytes`] long and aligned to at
    /// least 64 bytes (true of any page-aligned shared-memory mapping and of
    /// [`Ring::new_heap`]'s allocation).
    pub fn create(memory: &mut [u8], capacity: u32) -> Result<Self, RingError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(RingError::InvalidLayout);
        }
        if memory.len() != Self::total_bytes(capacity) {
            return Err(RingError::InvalidLayout);
        }
        let base = memory.as_mut_ptr();
        if (base as usize) % std::mem::align_of::<RingHeader>() != 0 {
            return Err(RingError::InvalidLayout);
        }
        // SAFETY: size and alignment validated above.
        let header = unsafe { &*base.cast::<RingHeader>() };
        header.init(capacity, std::mem::size_of::<T>() as u32);

        Ok(Self {
            base,
            capacity: capacity as usize,
            mask: capacity as usize - 1,
            owned_layout: None,
            _marker: PhantomData,
        })
    }

    /// Validates and attaches to a ring previously created by (possibly)
    /// another process (§4.2 `attach`).
    pub fn attach(memory: &mut [u8]) -> Result<Self, RingError> {
        if memory.len() < HEADER_SIZE {
            return Err(RingError::SizeMismatch);
        }
        let base = memory.as_mut_ptr();
        if (base as usize) % std::mem::align_of::<RingHeader>() != 0 {
            return Err(RingError::InvalidLayout);
        }
        // SAFETY: length and alignment validated above.
        let header = unsafe { &*base.cast::<RingHeader>() };
        header.validate(std::mem::size_of::<T>() as u32)?;
        let capacity = header.capacity() as usize;
        if memory.len() != HEADER_SIZE + capacity * std::mem::size_of::<T>() {
            return Err(RingError::SizeMismatch);
        }

        Ok(Self {
            base,
            capacity,
            mask: capacity - 1,
            owned_layout: None,
            _marker: PhantomData,
        })
    }

    /// Allocates an owned, correctly-aligned, zeroed backing buffer and
    /// creates a ring in it. Convenience for tests, benchmarks, and the
    /// degraded local-only path when no shared segment is mapped.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, not a power of two, or the allocator
    /// fails.
    #[must_use]
    pub fn new_heap(capacity: u32) -> Self {
        assert!(capacity > 0 && capacity.is_power_of_two());
        let total = Self::total_bytes(capacity);
        let layout = Layout::from_size_align(total, 64).expect("valid ring layout");
        // SAFETY: layout has non-zero size.
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        if base.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        // SAFETY: base is a fresh zeroed allocation of exactly `total` bytes,
        // aligned to 64.
        let header = unsafe { &*base.cast::<RingHeader>() };
        header.init(capacity, std::mem::size_of::<T>() as u32);

        Self {
            base,
            capacity: capacity as usize,
            mask: capacity as usize - 1,
            owned_layout: Some(layout),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn header(&self) -> &RingHeader {
        // SAFETY: base always points at a valid, initialized RingHeader for
        // the lifetime of `self`.
        unsafe { &*self.base.cast::<RingHeader>() }
    }

    #[inline]
    fn slot_ptr(&self, idx: usize) -> *mut MaybeUninit<T> {
        // SAFETY: idx < capacity is the caller's responsibility (enforced by
        // masking at every call site in this module).
        unsafe {
            self.base
                .add(HEADER_SIZE)
                .cast::<MaybeUninit<T>>()
                .add(idx)
        }
    }

    // ---------------------------------------------------------------------
    // CONSTANTS & STATUS
    // ---------------------------------------------------------------------

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    fn mask(&self) -> usize {
        self.mask
    }

    /// Number of committed-but-unread items.
    #[inline]
    pub fn len(&self) -> usize {
        let write = self.header().write_pos().load(Ordering::Relaxed);
        let read = self.header().read_pos().load(Ordering::Relaxed);
        write.wrapping_sub(read) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        let h = self.header();
        h.write_pos().load(Ordering::Relaxed) == h.read_pos().load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Number of writes dropped because the ring was full (§3, §8 property 5).
    #[inline]
    pub fn overflow_count(&self) -> u64 {
        self.header().overflow().load(Ordering::Relaxed)
    }

    /// Resets both positions to zero. Only safe when both producer and
    /// consumer are quiesced (no concurrent readers/writers) — e.g. during
    /// test setup or a cold-start re-attach.
    ///
    /// # Safety
    ///
    /// Caller must guarantee no other thread/process is concurrently
    /// reading or writing this ring.
    pub unsafe fn reset(&self) {
        let h = self.header();
        h.write_pos().store(0, Ordering::Relaxed);
        h.read_pos().store(0, Ordering::Relaxed);
        h.overflow().store(0, Ordering::Relaxed);
    }

    // ---------------------------------------------------------------------
    // PRODUCER API (single producer)
    // ---------------------------------------------------------------------

    /// Reserves up to `n` contiguous slots for zero-copy writing. Returns
    /// `None` if the ring is full. The returned [`Reservation`] may hold
    /// fewer than `n` slots if the request would wrap past the end of the
    /// slot array — see [`Reservation::len`].
    pub fn reserve(&self, n: usize) -> Option<Reservation<'_, T>> {
        if n == 0 || n > self.capacity() {
            return None;
        }
        let h = self.header();
        let write = h.write_pos().load(Ordering::Relaxed);
        let read = h.read_pos().load(Ordering::Acquire);
        let space = self
            .capacity()
            .saturating_sub(write.wrapping_sub(read) as usize);
        if space < n {
            return None;
        }
        Some(self.make_reservation(write, n))
    }

    /// [`Ring::reserve`] with adaptive backoff: spins, yields, then gives up.
    /// Never used on a producer's own ring in `PER_THREAD_ONLY` mode (the
    /// spec requires producers to never block) — intended for bounded
    /// best-effort paths such as drain-side free-queue replenishment.
    pub fn reserve_with_backoff(&self, n: usize) -> Option<Reservation<'_, T>> {
        let mut backoff = Backoff::new();
        while !backoff.is_completed() {
            if let Some(r) = self.reserve(n) {
                return Some(r);
            }
            backoff.snooze();
        }
        None
    }

    fn make_reservation(&self, write: u64, n: usize) -> Reservation<'_, T> {
        let mask = self.mask();
        let idx = (write as usize) & mask;
        let contiguous = n.min(self.capacity() - idx);
        // SAFETY: idx + contiguous <= capacity, and `reserve`'s space check
        // guarantees these slots are beyond the consumer's current read
        // position, so only this producer writes them.
        let slice = unsafe { std::slice::from_raw_parts_mut(self.slot_ptr(idx), contiguous) };
        let ring_ptr = self as *const Self;
        Reservation::new(slice, ring_ptr)
    }

    /// Publishes `n` previously-reserved slots. Called by [`Reservation::commit_n`].
    pub(crate) fn commit_internal(&self, n: usize) {
        let h = self.header();
        let write = h.write_pos().load(Ordering::Relaxed);
        let new_write = write.wrapping_add(n as u64);
        debug_assert_monotonic!("write", write, new_write);
        if cfg!(debug_assertions) {
            let read = h.read_pos().load(Ordering::Relaxed);
            debug_assert_bounded_count!(new_write.wrapping_sub(read), self.capacity() as u64);
        }
        h.write_pos().store(new_write, Ordering::Release);
    }

    /// Writes a single event. Returns `false` (and increments
    /// `overflow_count`) if the ring is full — producers never block
    /// (§4.2, §4.5).
    #[inline]
    pub fn write(&self, event: T) -> bool {
        match self.reserve(1) {
            Some(mut r) => {
                r.as_mut_slice()[0].write(event);
                r.commit();
                true
            }
            None => {
                self.header().overflow().fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API (single consumer)
    // ---------------------------------------------------------------------

    /// Reads the oldest committed event without removing it from the ring.
    /// Returns `None` if empty.
    pub fn read(&self) -> Option<T> {
        let h = self.header();
        let read = h.read_pos().load(Ordering::Relaxed);
        let write = h.write_pos().load(Ordering::Acquire);
        if read == write {
            return None;
        }
        debug_assert_head_not_past_tail!(read, write);
        let idx = (read as usize) & self.mask();
        debug_assert_initialized_read!(read, read, write);
        // SAFETY: slot at idx was fully written and published via the
        // Release store observed by the Acquire load of `write` above.
        let value = unsafe { (*self.slot_ptr(idx)).assume_init() };
        let new_read = read.wrapping_add(1);
        debug_assert_monotonic!("read", read, new_read);
        h.read_pos().store(new_read, Ordering::Release);
        Some(value)
    }

    /// Reads up to `events.len()` committed events into `events`, returning
    /// the count actually read (§4.2 `read_batch`).
    pub fn read_batch(&self, events: &mut [T]) -> usize {
        if events.is_empty() {
            return 0;
        }
        let h = self.header();
        let read = h.read_pos().load(Ordering::Relaxed);
        let write = h.write_pos().load(Ordering::Acquire);
        let avail = write.wrapping_sub(read) as usize;
        if avail == 0 {
            return 0;
        }
        let n = avail.min(events.len());
        let mask = self.mask();
        for (i, slot) in events.iter_mut().enumerate().take(n) {
            let idx = (read.wrapping_add(i as u64) as usize) & mask;
            // SAFETY: items in [read, write) were committed by the producer
            // before the Acquire load of `write` above.
            *slot = unsafe { (*self.slot_ptr(idx)).assume_init() };
        }
        let new_read = read.wrapping_add(n as u64);
        debug_assert_monotonic!("read", read, new_read);
        h.read_pos().store(new_read, Ordering::Release);
        n
    }

    /// Processes every currently-available event with `handler`, updating
    /// the read position once for the whole batch (amortizes the atomic
    /// store rather than one per item).
    pub fn consume_batch<F: FnMut(&T)>(&self, mut handler: F) -> usize {
        let h = self.header();
        let read = h.read_pos().load(Ordering::Relaxed);
        let write = h.write_pos().load(Ordering::Acquire);
        let avail = write.wrapping_sub(read) as usize;
        if avail == 0 {
            return 0;
        }
        let mask = self.mask();
        for i in 0..avail {
            let idx = (read.wrapping_add(i as u64) as usize) & mask;
            // SAFETY: see read_batch.
            let item = unsafe { &*(*self.slot_ptr(idx)).as_ptr() };
            handler(item);
        }
        h.read_pos().store(write, Ordering::Release);
        avail
    }

    /// Processes up to `max_items` available events, updating the read
    /// position once for the whole batch.
    pub fn consume_up_to<F: FnMut(&T)>(&self, max_items: usize, mut handler: F) -> usize {
        if max_items == 0 {
            return 0;
        }
        let h = self.header();
        let read = h.read_pos().load(Ordering::Relaxed);
        let write = h.write_pos().load(Ordering::Acquire);
        let avail = write.wrapping_sub(read) as usize;
        if avail == 0 {
            return 0;
        }
        let n = avail.min(max_items);
        let mask = self.mask();
        for i in 0..n {
            let idx = (read.wrapping_add(i as u64) as usize) & mask;
            // SAFETY: see read_batch.
            let item = unsafe { &*(*self.slot_ptr(idx)).as_ptr() };
            handler(item);
        }
        let new_read = read.wrapping_add(n as u64);
        debug_assert_monotonic!("read", read, new_read);
        h.read_pos().store(new_read, Ordering::Release);
        n
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        if let Some(layout) = self.owned_layout {
            // SAFETY: base was allocated with this exact layout in
            // `new_heap` and is only ever freed here.
            unsafe { std::alloc::dealloc(self.base, layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct Ev(u64);

    #[test]
    fn create_then_write_read_roundtrip() {
        let ring = Ring::<Ev>::new_heap(8);
        assert!(ring.write(Ev(1)));
        assert!(ring.write(Ev(2)));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.read(), Some(Ev(1)));
        assert_eq!(ring.read(), Some(Ev(2)));
        assert!(ring.is_empty());
    }

    #[test]
    fn full_ring_drops_and_counts_overflow() {
        let ring = Ring::<Ev>::new_heap(4);
        for i in 0..4 {
            assert!(ring.write(Ev(i)));
        }
        assert!(!ring.write(Ev(999)));
        assert_eq!(ring.overflow_count(), 1);
    }

    #[test]
    fn consume_batch_drains_everything_with_one_update() {
        let ring = Ring::<Ev>::new_heap(16);
        for i in 0..10 {
            assert!(ring.write(Ev(i)));
        }
        let mut sum = 0;
        let n = ring.consume_batch(|e| sum += e.0);
        assert_eq!(n, 10);
        assert_eq!(sum, 45);
        assert!(ring.is_empty());
    }

    #[test]
    fn consume_up_to_leaves_remainder() {
        let ring = Ring::<Ev>::new_heap(16);
        for i in 0..10 {
            ring.write(Ev(i));
        }
        let mut sum = 0;
        let n = ring.consume_up_to(4, |e| sum += e.0);
        assert_eq!(n, 4);
        assert_eq!(sum, 0 + 1 + 2 + 3);
        assert_eq!(ring.len(), 6);
    }

    #[test]
    fn read_batch_respects_output_capacity() {
        let ring = Ring::<Ev>::new_heap(16);
        for i in 0..10 {
            ring.write(Ev(i));
        }
        let mut out = [Ev(0); 4];
        let n = ring.read_batch(&mut out);
        assert_eq!(n, 4);
        assert_eq!(out[0], Ev(0));
        assert_eq!(out[3], Ev(3));
        assert_eq!(ring.len(), 6);
    }

    #[test]
    fn create_and_attach_roundtrip_over_shared_bytes() {
        let capacity = 8u32;
        let total = Ring::<Ev>::total_bytes(capacity);
        let layout = Layout::from_size_align(total, 64).unwrap();
        // SAFETY: layout has non-zero size; freed at the end of this test.
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        let mem = unsafe { std::slice::from_raw_parts_mut(base, total) };

        {
            let writer = Ring::<Ev>::create(mem, capacity).unwrap();
            assert!(writer.write(Ev(42)));
            std::mem::forget(writer); // memory outlives this scope; owned by `base`, not the ring
        }

        let mem2 = unsafe { std::slice::from_raw_parts_mut(base, total) };
        let reader = Ring::<Ev>::attach(mem2).unwrap();
        assert_eq!(reader.read(), Some(Ev(42)));
        std::mem::forget(reader);

        unsafe { std::alloc::dealloc(base, layout) };
    }

    #[test]
    fn attach_rejects_wrong_slot_size() {
        let total = Ring::<Ev>::total_bytes(8);
        let layout = Layout::from_size_align(total, 64).unwrap();
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        let mem = unsafe { std::slice::from_raw_parts_mut(base, total) };
        let writer = Ring::<Ev>::create(mem, 8).unwrap();
        std::mem::forget(writer);

        #[derive(Copy, Clone)]
        struct Bigger([u64; 4]);
        let mem2 = unsafe { std::slice::from_raw_parts_mut(base, total) };
        assert_eq!(
            Ring::<Bigger>::attach(mem2).unwrap_err(),
            RingError::SizeMismatch
        );
        unsafe { std::alloc::dealloc(base, layout) };
    }
}
