//! The thread registry: cross-process directory of lane-sets plus the
//! bump-pool allocator that carves their backing rings out of one shared
//! segment (§4.3, §5, §6).
//!
//! A registry is always reached through exactly one of [`ThreadRegistry::create`]
//! (controller/first-producer side, which also lays out and zeroes the
//! segment) or [`ThreadRegistry::attach`] (every other process, including the
//! drain). Both sides end up with the same `capacity`-sized array of
//! [`SharedThreadLaneSet`] slots and the same view of the bump pool, but only
//! the creator's side ever calls [`ThreadRegistry::register`] — the drain
//! discovers newly active slots by polling [`ThreadRegistry::attach_thread`].

use crate::abi::{
    IndexEvent, DetailEvent, LaneDescriptor, RegistryHeader, SegmentDescriptor, SharedThreadLaneSet,
    RINGS_PER_LANE, REGISTRY_HEADER_SIZE, THREAD_LANE_SET_SIZE,
};
use crate::error::{RegisterError, RegistryError};
use crate::lane::Lane;
use ada_ring::Ring;
use ada_shm::Segment;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Sizing knobs for a registry segment. Capacity is capped at 64 so every
/// slot has a bit in the header's `active_mask: AtomicU64` (§6).
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub capacity: u32,
    pub index_ring_capacity: u32,
    pub detail_ring_capacity: u32,
}

/// Default thread capacity, chosen to exactly fill the `active_mask` bitmask.
pub const DEFAULT_MAX_THREADS: u32 = 64;

impl RegistryConfig {
    /// # Panics
    /// Panics if `capacity` is zero or exceeds 64, or either ring capacity is
    /// not a power of two (`Ring` requires power-of-two slot counts).
    #[must_use]
    pub const fn new(capacity: u32, index_ring_capacity: u32, detail_ring_capacity: u32) -> Self {
        assert!(capacity > 0 && capacity <= 64);
        assert!(index_ring_capacity.is_power_of_two());
        assert!(detail_ring_capacity.is_power_of_two());
        Self {
            capacity,
            index_ring_capacity,
            detail_ring_capacity,
        }
    }
}

impl Default for RegistryConfig {
    /// 64 threads, 64 KiB index rings (2048 x 32B), 256 KiB detail rings
    /// (1024 x 256B) per §6's pool sizing note.
    fn default() -> Self {
        Self::new(DEFAULT_MAX_THREADS, 2048, 1024)
    }
}

fn per_thread_pool_bytes(config: &RegistryConfig) -> usize {
    let index_ring_bytes = Ring::<IndexEvent>::total_bytes(config.index_ring_capacity);
    let detail_ring_bytes = Ring::<DetailEvent>::total_bytes(config.detail_ring_capacity);
    let queue_bytes = Ring::<u32>::total_bytes(RINGS_PER_LANE as u32);
    RINGS_PER_LANE * (index_ring_bytes + detail_ring_bytes) + 4 * queue_bytes
}

/// Total byte size a segment must have to back a registry with `config`.
#[must_use]
pub fn registry_segment_len(config: &RegistryConfig) -> usize {
    REGISTRY_HEADER_SIZE
        + config.capacity as usize * THREAD_LANE_SET_SIZE
        + config.capacity as usize * per_thread_pool_bytes(config)
}

/// The two lanes a registered thread owns, reconstructed from its
/// [`SharedThreadLaneSet`] (either freshly created, or attached by the
/// drain).
pub struct RegisteredLanes {
    pub index: Lane<IndexEvent>,
    pub detail: Lane<DetailEvent>,
}

/// Cross-process thread directory. Owns the mapped segment and hands out
/// [`RegisteredLanes`] built against it.
pub struct ThreadRegistry {
    _segment: Segment,
    base: *mut u8,
    header: *mut RegistryHeader,
    lane_sets: *mut SharedThreadLaneSet,
    config: RegistryConfig,
    pool_base: *mut u8,
    pool_len: usize,
    pool_cursor: AtomicUsize,
    local_lanes: Box<[OnceLock<RegisteredLanes>]>,
}

// SAFETY: every raw pointer here addresses the one mmap owned by
// `_segment`, which is itself `Send + Sync`; all shared mutable state behind
// those pointers (`RegistryHeader`, `SharedThreadLaneSet`) is made of atomics.
unsafe impl Send for ThreadRegistry {}
unsafe impl Sync for ThreadRegistry {}

impl ThreadRegistry {
    /// Lays out a freshly mapped segment as a new registry (§4.3
    /// `create_registry`). `segment` must be exactly
    /// [`registry_segment_len`] bytes and freshly zeroed (true of any
    /// segment just returned by `Segment::create`, since `shm_open` +
    /// `ftruncate` always yields zero-filled pages).
    pub fn create(mut segment: Segment, config: RegistryConfig) -> Result<Self, RegistryError> {
        let required = registry_segment_len(&config);
        if segment.len() != required {
            return Err(RegistryError::InvalidLayout);
        }
        let base = segment.as_mut_slice().as_mut_ptr();
        // SAFETY: `base` is the start of a `required`-byte mmap that outlives
        // `self` via the `_segment` field; `RegistryHeader` is `repr(C,
        // align(64))` and the segment is page- (hence 64-byte-) aligned.
        let header = unsafe { &*base.cast::<RegistryHeader>() };
        header.init(config.capacity);
        header.segments.push(0, 0, required as u64);

        let lane_sets = unsafe { base.add(REGISTRY_HEADER_SIZE).cast::<SharedThreadLaneSet>() };
        let lane_set_bytes = config.capacity as usize * THREAD_LANE_SET_SIZE;
        let pool_base = unsafe { base.add(REGISTRY_HEADER_SIZE + lane_set_bytes) };
        let pool_len = config.capacity as usize * per_thread_pool_bytes(&config);

        Ok(Self {
            _segment: segment,
            base,
            header: base.cast(),
            lane_sets,
            config,
            pool_base,
            pool_len,
            pool_cursor: AtomicUsize::new(0),
            local_lanes: (0..config.capacity).map(|_| OnceLock::new()).collect(),
        })
    }

    /// Attaches to a registry segment created by (possibly) another process
    /// (§4.3 `attach_registry`). Never allocates from the pool — only the
    /// creator registers new threads; attachers (the drain) only resolve
    /// descriptors that already exist.
    pub fn attach(mut segment: Segment, config: RegistryConfig) -> Result<Self, RegistryError> {
        let required = registry_segment_len(&config);
        if segment.len() != required {
            return Err(RegistryError::InvalidLayout);
        }
        let base = segment.as_mut_slice().as_mut_ptr();
        // SAFETY: see `create`.
        let header = unsafe { &*base.cast::<RegistryHeader>() };
        header.validate()?;
        if header.capacity.load(Ordering::Acquire) != config.capacity {
            return Err(RegistryError::InvalidLayout);
        }
        let lane_sets = unsafe { base.add(REGISTRY_HEADER_SIZE).cast::<SharedThreadLaneSet>() };
        let lane_set_bytes = config.capacity as usize * THREAD_LANE_SET_SIZE;
        let pool_base = unsafe { base.add(REGISTRY_HEADER_SIZE + lane_set_bytes) };
        let pool_len = config.capacity as usize * per_thread_pool_bytes(&config);

        Ok(Self {
            _segment: segment,
            base,
            header: base.cast(),
            lane_sets,
            config,
            pool_base,
            // The attach side never allocates; parking the cursor at the end
            // makes any accidental call to `alloc_bytes` fail loudly instead
            // of silently handing out bytes the creator also thinks it owns.
            pool_cursor: AtomicUsize::new(pool_len),
            pool_len,
            local_lanes: (0..config.capacity).map(|_| OnceLock::new()).collect(),
        })
    }

    fn header(&self) -> &RegistryHeader {
        // SAFETY: `header` is derived from `base`, valid for `self`'s lifetime.
        unsafe { &*self.header }
    }

    fn lane_set(&self, idx: u32) -> &SharedThreadLaneSet {
        debug_assert!(idx < self.config.capacity);
        // SAFETY: `idx < capacity`, and `lane_sets` addresses `capacity`
        // contiguous slots inside the segment.
        unsafe { &*self.lane_sets.add(idx as usize) }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.config.capacity
    }

    #[must_use]
    pub fn get_active_count(&self) -> u32 {
        self.header().thread_count.load(Ordering::Acquire)
    }

    pub fn stop_accepting(&self) {
        self.header().accepting_registrations.store(0, Ordering::Release);
    }

    pub fn request_shutdown(&self) {
        self.header().shutdown_requested.store(1, Ordering::Release);
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.header().shutdown_requested.load(Ordering::Acquire) != 0
    }

    /// Claims the next byte range from the bump pool (§5: "bump allocator
    /// with acquire/release CAS ... roll back the counter on failure" — here
    /// the rollback is implicit: a losing CAS never publishes `new_cur`, so
    /// the bytes it speculatively computed are simply abandoned and retried
    /// from the fresh cursor value).
    fn alloc_bytes(&self, len: usize) -> Result<*mut u8, RegisterError> {
        loop {
            let cur = self.pool_cursor.load(Ordering::Acquire);
            let new_cur = cur.checked_add(len).ok_or(RegisterError::PoolExhausted)?;
            if new_cur > self.pool_len {
                return Err(RegisterError::PoolExhausted);
            }
            if self
                .pool_cursor
                .compare_exchange(cur, new_cur, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: the CAS above exclusively claimed [cur, cur+len);
                // the cursor only ever moves forward, so no other caller can
                // ever be handed an overlapping range.
                return Ok(unsafe { self.pool_base.add(cur) });
            }
        }
    }

    fn build_ring<T: Copy>(&self, ring_capacity: u32) -> Result<(Ring<T>, SegmentDescriptor), RegisterError> {
        let bytes = Ring::<T>::total_bytes(ring_capacity);
        let ptr = self.alloc_bytes(bytes)?;
        let slice = unsafe { std::slice::from_raw_parts_mut(ptr, bytes) };
        let ring = Ring::<T>::create(slice, ring_capacity).map_err(|_| RegisterError::PoolExhausted)?;
        let offset = ptr as usize - self.base as usize;
        Ok((ring, SegmentDescriptor { segment_id: 0, offset: offset as u64, len: bytes as u64 }))
    }

    fn build_lane<T: Copy>(&self, desc: &LaneDescriptor, ring_capacity: u32) -> Result<Lane<T>, RegisterError> {
        let mut rings = Vec::with_capacity(RINGS_PER_LANE);
        for i in 0..RINGS_PER_LANE {
            let (ring, sd) = self.build_ring::<T>(ring_capacity)?;
            desc.set_ring(i, sd);
            rings.push(ring);
        }
        desc.ring_count.store(RINGS_PER_LANE as u32, Ordering::Relaxed);

        let (free_queue, free_sd) = self.build_ring::<u32>(RINGS_PER_LANE as u32)?;
        desc.set_free_queue(free_sd);
        let (submit_queue, submit_sd) = self.build_ring::<u32>(RINGS_PER_LANE as u32)?;
        desc.set_submit_queue(submit_sd);

        let active_idx = &desc.active_idx as *const AtomicU32;
        Ok(Lane::new(rings.into_boxed_slice(), free_queue, submit_queue, active_idx))
    }

    fn attach_lane<T: Copy>(&self, desc: &LaneDescriptor) -> Option<Lane<T>> {
        let ring_count = desc.ring_count.load(Ordering::Acquire) as usize;
        if ring_count == 0 || ring_count > RINGS_PER_LANE {
            return None;
        }
        let mut rings = Vec::with_capacity(ring_count);
        for i in 0..ring_count {
            rings.push(self.attach_ring::<T>(desc.rings[i])?);
        }
        let free_queue = self.attach_ring::<u32>(desc.free_queue)?;
        let submit_queue = self.attach_ring::<u32>(desc.submit_queue)?;
        let active_idx = &desc.active_idx as *const AtomicU32;
        Some(Lane::attach(rings.into_boxed_slice(), free_queue, submit_queue, active_idx))
    }

    fn attach_ring<T: Copy>(&self, sd: SegmentDescriptor) -> Option<Ring<T>> {
        // SAFETY: `sd.offset`/`sd.len` were published by a producer that
        // carved them out of this same segment via `alloc_bytes`/`build_ring`.
        let ptr = unsafe { self.base.add(sd.offset as usize) };
        let slice = unsafe { std::slice::from_raw_parts_mut(ptr, sd.len as usize) };
        Ring::<T>::attach(slice).ok()
    }

    /// §4.3 `register`. Idempotent for a thread that is already active;
    /// otherwise claims the next free slot, carves its rings and queues out
    /// of the bump pool, and publishes them by setting `active` last.
    pub fn register(&self, thread_id: u64) -> Result<u32, RegisterError> {
        if self.header().accepting_registrations.load(Ordering::Acquire) == 0 {
            return Err(RegisterError::RegistryFull);
        }
        for idx in 0..self.config.capacity {
            let ls = self.lane_set(idx);
            if ls.active.load(Ordering::Acquire) != 0 && ls.thread_id.load(Ordering::Acquire) == thread_id {
                return Ok(idx);
            }
        }

        let slot = self.header().thread_count.fetch_add(1, Ordering::AcqRel);
        if slot >= self.config.capacity {
            self.header().thread_count.fetch_sub(1, Ordering::AcqRel);
            return Err(RegisterError::RegistryFull);
        }

        let lane_set = self.lane_set(slot);
        lane_set.thread_id.store(thread_id, Ordering::Relaxed);

        let index_lane = self.build_lane::<IndexEvent>(&lane_set.index_lane, self.config.index_ring_capacity)?;
        let detail_lane = self.build_lane::<DetailEvent>(&lane_set.detail_lane, self.config.detail_ring_capacity)?;

        self.local_lanes[slot as usize]
            .set(RegisteredLanes { index: index_lane, detail: detail_lane })
            .unwrap_or_else(|_| unreachable!("slot {slot} was just claimed by fetch_add and cannot race"));

        lane_set.active.store(1, Ordering::Release);

        loop {
            let cur = self.header().active_mask.load(Ordering::Relaxed);
            let new = cur | (1u64 << slot);
            if self
                .header()
                .active_mask
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }

        Ok(slot)
    }

    /// The lanes this process built for `slot` during `register`. Only
    /// meaningful on the side that called `register`.
    #[must_use]
    pub fn lanes(&self, slot: u32) -> Option<&RegisteredLanes> {
        self.local_lanes.get(slot as usize)?.get()
    }

    /// §4.3 `unregister`. Clears `active` and the corresponding
    /// `active_mask` bit; the slot's lanes and pool bytes are never reused
    /// (§4.3: capacity is sized for the process lifetime, not recycled).
    pub fn unregister_by_id(&self, thread_id: u64) {
        for idx in 0..self.config.capacity {
            let ls = self.lane_set(idx);
            if ls.active.load(Ordering::Acquire) != 0 && ls.thread_id.load(Ordering::Acquire) == thread_id {
                ls.active.store(0, Ordering::Release);
                loop {
                    let cur = self.header().active_mask.load(Ordering::Relaxed);
                    let new = cur & !(1u64 << idx);
                    if self
                        .header()
                        .active_mask
                        .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                    {
                        break;
                    }
                }
                return;
            }
        }
    }

    /// Drain-side discovery: resolves slot `idx`'s lanes on first call and
    /// caches them, or returns `None` if the slot is not (yet) active.
    pub fn attach_thread(&self, idx: u32) -> Option<&RegisteredLanes> {
        if idx >= self.config.capacity {
            return None;
        }
        if let Some(existing) = self.local_lanes[idx as usize].get() {
            return Some(existing);
        }
        let ls = self.lane_set(idx);
        if ls.active.load(Ordering::Acquire) == 0 {
            return None;
        }
        let index = self.attach_lane::<IndexEvent>(&ls.index_lane)?;
        let detail = self.attach_lane::<DetailEvent>(&ls.detail_lane)?;
        // Another drain call (there is only ever one drain thread, but this
        // keeps `OnceLock::set`'s error path cheap to ignore) may have won
        // the race; either way `.get()` below returns the winner.
        let _ = self.local_lanes[idx as usize].set(RegisteredLanes { index, detail });
        self.local_lanes[idx as usize].get()
    }

    #[must_use]
    pub fn thread_id_at(&self, idx: u32) -> Option<u64> {
        if idx >= self.config.capacity {
            return None;
        }
        let ls = self.lane_set(idx);
        (ls.active.load(Ordering::Acquire) != 0).then(|| ls.thread_id.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn active_mask(&self) -> u64 {
        self.header().active_mask.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RegistryConfig {
        RegistryConfig::new(4, 8, 8)
    }

    fn unique_name(tag: &str) -> String {
        format!("ada_registry_test_{tag}_{}", std::process::id())
    }

    #[test]
    fn register_is_idempotent_for_the_same_thread() {
        let config = test_config();
        let segment = Segment::create(&unique_name("idempotent"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();

        let slot_a = registry.register(42).unwrap();
        let slot_b = registry.register(42).unwrap();
        assert_eq!(slot_a, slot_b);
        assert_eq!(registry.get_active_count(), 1);
    }

    #[test]
    fn register_fills_capacity_then_fails() {
        let config = test_config();
        let segment = Segment::create(&unique_name("fill"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();

        for tid in 0..config.capacity as u64 {
            registry.register(100 + tid).unwrap();
        }
        assert_eq!(registry.get_active_count(), config.capacity);
        assert!(matches!(registry.register(9999), Err(RegisterError::RegistryFull)));
    }

    #[test]
    fn registered_lanes_are_independently_usable() {
        let config = test_config();
        let segment = Segment::create(&unique_name("lanes"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();

        let slot = registry.register(7).unwrap();
        let lanes = registry.lanes(slot).unwrap();
        assert!(lanes.index.active_ring().write(IndexEvent::default()));
        assert!(lanes.detail.active_ring().write(DetailEvent::default()));
    }

    #[test]
    fn unregister_clears_active_mask_bit() {
        let config = test_config();
        let segment = Segment::create(&unique_name("unreg"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();

        let slot = registry.register(55).unwrap();
        assert_eq!(registry.active_mask() & (1 << slot), 1 << slot);
        registry.unregister_by_id(55);
        assert_eq!(registry.active_mask() & (1 << slot), 0);
    }

    #[test]
    fn drain_side_attaches_lanes_the_producer_registered() {
        let config = test_config();
        let name = unique_name("attach");
        let len = registry_segment_len(&config);

        let producer_segment = Segment::create(&name, len).unwrap();
        let producer = ThreadRegistry::create(producer_segment, config).unwrap();
        let slot = producer.register(9).unwrap();
        producer
            .lanes(slot)
            .unwrap()
            .index
            .active_ring()
            .write(IndexEvent::new(1, 2, 9, crate::abi::EventKind::Call, 0));

        let drain_segment = Segment::open(&name, len).unwrap();
        let drain = ThreadRegistry::attach(drain_segment, config).unwrap();
        let lanes = drain.attach_thread(slot).unwrap();
        let event = lanes.index.active_ring().read().unwrap();
        assert_eq!(event.thread_id, 9);
    }

    #[test]
    fn stop_accepting_blocks_new_registrations() {
        let config = test_config();
        let segment = Segment::create(&unique_name("stop"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();
        registry.stop_accepting();
        assert!(matches!(registry.register(1), Err(RegisterError::RegistryFull)));
    }

    #[test]
    fn shutdown_flag_round_trips() {
        let config = test_config();
        let segment = Segment::create(&unique_name("shutdown"), registry_segment_len(&config)).unwrap();
        let registry = ThreadRegistry::create(segment, config).unwrap();
        assert!(!registry.is_shutdown_requested());
        registry.request_shutdown();
        assert!(registry.is_shutdown_requested());
    }
}
