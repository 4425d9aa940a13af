//! Wire layout shared bit-exact between the producer and controller
//! processes (§6 "Shared-memory layout"). Field order in [`ControlBlock`]
//! and [`RegistryHeader`] is part of the ABI — never reorder without
//! bumping the relevant `*_VERSION` constant.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8};

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// CALL / RETURN / EXCEPTION (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Call = 0,
    Return = 1,
    Exception = 2,
}

impl EventKind {
    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Call),
            1 => Some(Self::Return),
            2 => Some(Self::Exception),
            _ => None,
        }
    }
}

/// Small, always-captured event (§3). Packed to a fixed 32-byte slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexEvent {
    pub timestamp_ns: u64,
    pub function_id: u64,
    pub thread_id: u64,
    pub kind: u8,
    pub depth: u32,
}

const _: () = assert!(std::mem::size_of::<IndexEvent>() <= 32);

impl IndexEvent {
    #[must_use]
    pub fn new(timestamp_ns: u64, function_id: u64, thread_id: u64, kind: EventKind, depth: u32) -> Self {
        Self {
            timestamp_ns,
            function_id,
            thread_id,
            kind: kind as u8,
            depth,
        }
    }
}

/// Number of stack bytes a [`DetailEvent`] can carry (§3, §4.4).
pub const STACK_SNAPSHOT_CAP: usize = 128;

/// Larger event captured only while the flight state is `RECORDING` and the
/// detail lane is enabled (§3). Fixed 256-byte slot.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DetailEvent {
    pub index: IndexEvent,
    /// Argument registers on CALL; return register in slot 0 on RETURN.
    pub registers: [u64; 8],
    pub frame_pointer: u64,
    pub stack_pointer: u64,
    pub link_register: u64,
    pub stack_snapshot: [u8; STACK_SNAPSHOT_CAP],
    pub stack_snapshot_len: u32,
    _pad: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<DetailEvent>() <= 256);

impl Default for DetailEvent {
    fn default() -> Self {
        // SAFETY: DetailEvent is a plain-old-data struct of integers and
        // byte arrays; the all-zero bit pattern is a valid value for all of
        // them.
        unsafe { std::mem::zeroed() }
    }
}

impl DetailEvent {
    #[must_use]
    pub fn stack_snapshot(&self) -> &[u8] {
        &self.stack_snapshot[..self.stack_snapshot_len as usize]
    }
}

// ---------------------------------------------------------------------------
// Control block (§6)
// ---------------------------------------------------------------------------

/// `process_state` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessState {
    Initialized = 0,
    Spawning = 1,
    Suspended = 2,
    Running = 3,
    Detaching = 4,
    Failed = 5,
}

/// `flight_state` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FlightState {
    Idle = 0,
    Armed = 1,
    Recording = 2,
    Draining = 3,
}

/// `registry_mode` values (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Mode {
    GlobalOnly = 0,
    DualWrite = 1,
    PerThreadOnly = 2,
}

impl Mode {
    #[must_use]
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::DualWrite,
            2 => Self::PerThreadOnly,
            _ => Self::GlobalOnly,
        }
    }
}

/// Total size of [`ControlBlock`], fixed by the ABI (§6).
pub const CONTROL_BLOCK_SIZE: usize = 4096;

/// Cross-process flags, readiness, heartbeat, mode, and counters (§3, §6).
///
/// Field order is the ABI; do not reorder, insert, or remove fields without
/// a version bump communicated out-of-band (the control block carries no
/// version field of its own — it is always created and attached by the same
/// build in this implementation's deployment model).
#[repr(C, align(64))]
pub struct ControlBlock {
    pub process_state: AtomicU32,
    pub flight_state: AtomicU32,
    pub index_lane_enabled: AtomicU32,
    pub detail_lane_enabled: AtomicU32,
    pub pre_roll_ms: AtomicU32,
    pub post_roll_ms: AtomicU32,
    pub capture_stack_snapshot: AtomicU32,
    pub hooks_ready: AtomicU32,
    pub registry_ready: AtomicU32,
    pub registry_epoch: AtomicU32,
    pub drain_heartbeat_ns: AtomicU64,
    pub registry_mode: AtomicU32,
    _pad_a: [u8; 4],
    pub mode_transitions: AtomicU64,
    pub fallback_events: AtomicU64,
    _reserved: [u8; CONTROL_BLOCK_SIZE - 72],
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() == CONTROL_BLOCK_SIZE);

impl ControlBlock {
    /// Initializes a freshly-mapped control block (controller side).
    pub fn init(&self) {
        use std::sync::atomic::Ordering::Relaxed;
        self.process_state.store(ProcessState::Initialized as u32, Relaxed);
        self.flight_state.store(FlightState::Idle as u32, Relaxed);
        self.index_lane_enabled.store(1, Relaxed);
        self.detail_lane_enabled.store(0, Relaxed);
        self.pre_roll_ms.store(0, Relaxed);
        self.post_roll_ms.store(0, Relaxed);
        self.capture_stack_snapshot.store(0, Relaxed);
        self.hooks_ready.store(0, Relaxed);
        self.registry_ready.store(0, Relaxed);
        self.registry_epoch.store(0, Relaxed);
        self.drain_heartbeat_ns.store(0, Relaxed);
        self.registry_mode.store(Mode::GlobalOnly as u32, Relaxed);
        self.mode_transitions.store(0, Relaxed);
        self.fallback_events.store(0, Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Registry header (§4.3, §6)
// ---------------------------------------------------------------------------

pub const REGISTRY_MAGIC: u32 = 0x4154_4152;
pub const REGISTRY_VERSION: u32 = 1;

/// Maximum number of backing segments a registry's segment table can
/// describe (§9 "Pointer arithmetic tail-allocation" substitution —
/// (segment_id, offset) descriptors instead of raw pointers).
pub const MAX_SEGMENTS: usize = 8;

/// One entry of the registry's segment table: where a named segment's bytes
/// live relative to the registry's own view, so producer and drain can each
/// resolve it in their own independently-mapped address space.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentDescriptor {
    pub segment_id: u32,
    pub offset: u64,
    pub len: u64,
}

/// The registry's fixed-capacity segment table (§4.3 "Allocation layout",
/// §9 segment table supplement grounded in the `rapace` SHM layout pattern).
#[repr(C)]
pub struct SegmentTable {
    pub count: AtomicU32,
    pub descriptors: [SegmentDescriptor; MAX_SEGMENTS],
}

impl SegmentTable {
    /// Appends a descriptor, returning its index. Called only by the
    /// controller during registry creation, before any thread registers.
    pub fn push(&self, segment_id: u32, offset: u64, len: u64) -> Option<u32> {
        use std::sync::atomic::Ordering::Relaxed;
        let idx = self.count.load(Relaxed);
        if idx as usize >= MAX_SEGMENTS {
            return None;
        }
        // SAFETY: single-writer (controller, pre-registration); no producer
        // reads the table until registry_ready is published.
        let slot = &self.descriptors[idx as usize] as *const SegmentDescriptor as *mut SegmentDescriptor;
        unsafe {
            (*slot).segment_id = segment_id;
            (*slot).offset = offset;
            (*slot).len = len;
        }
        self.count.store(idx + 1, Relaxed);
        Some(idx)
    }

    #[must_use]
    pub fn get(&self, idx: u32) -> Option<SegmentDescriptor> {
        use std::sync::atomic::Ordering::Relaxed;
        if idx >= self.count.load(Relaxed) {
            return None;
        }
        Some(self.descriptors[idx as usize])
    }
}

/// Placed at the start of the registry segment (§4.3). Followed in memory by
/// the lane-set array, then a page-aligned bump pool — both owned and
/// addressed by `ada-registry::registry`/`ada-registry::lane`, not by this
/// header directly.
#[repr(C, align(64))]
pub struct RegistryHeader {
    pub magic: AtomicU32,
    pub version: AtomicU32,
    pub capacity: AtomicU32,
    pub thread_count: AtomicU32,
    pub accepting_registrations: AtomicU8,
    pub shutdown_requested: AtomicU8,
    _pad0: [u8; 6],
    pub active_mask: AtomicU64,
    pub epoch: AtomicU32,
    _pad1: [u8; 4],
    pub segments: SegmentTable,
}

pub const REGISTRY_HEADER_SIZE: usize = std::mem::size_of::<RegistryHeader>();

impl RegistryHeader {
    /// Initializes a freshly-mapped registry header (controller side, §4.3
    /// `create_registry`).
    pub fn init(&self, capacity: u32) {
        use std::sync::atomic::Ordering::Relaxed;
        self.magic.store(REGISTRY_MAGIC, Relaxed);
        self.version.store(REGISTRY_VERSION, Relaxed);
        self.capacity.store(capacity, Relaxed);
        self.thread_count.store(0, Relaxed);
        self.accepting_registrations.store(1, Relaxed);
        self.shutdown_requested.store(0, Relaxed);
        self.active_mask.store(0, Relaxed);
        self.epoch.store(1, Relaxed);
        self.segments.count.store(0, Relaxed);
    }

    /// Validates a header written by a (possibly different) creator (§4.3
    /// `attach_registry`).
    pub fn validate(&self) -> Result<(), crate::error::RegistryError> {
        use std::sync::atomic::Ordering::Relaxed;
        if self.magic.load(Relaxed) != REGISTRY_MAGIC {
            return Err(crate::error::RegistryError::InvalidMagic);
        }
        if self.version.load(Relaxed) != REGISTRY_VERSION {
            return Err(crate::error::RegistryError::VersionMismatch {
                expected: REGISTRY_VERSION,
                found: self.version.load(Relaxed),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-thread lane-set array (§4.3 "Allocation layout")
// ---------------------------------------------------------------------------

/// Fixed ring count per lane, decided at build time (§4.3: "Ring count per
/// lane is fixed at build time").
pub const RINGS_PER_LANE: usize = 4;

/// Cross-process descriptor of one lane's rings and SPSC index queues. All
/// byte ranges are `(segment_id, offset, len)` — never raw pointers (§9).
#[repr(C, align(64))]
pub struct LaneDescriptor {
    pub ring_count: AtomicU32,
    pub active_idx: AtomicU32,
    _pad: [u8; 8],
    pub rings: [SegmentDescriptor; RINGS_PER_LANE],
    pub free_queue: SegmentDescriptor,
    pub submit_queue: SegmentDescriptor,
}

impl LaneDescriptor {
    /// Publishes the i-th ring's location. Single-writer (the registering
    /// thread, before `SharedThreadLaneSet::active` goes up) so a plain
    /// write is sound.
    pub(crate) fn set_ring(&self, i: usize, d: SegmentDescriptor) {
        let slot = &self.rings[i] as *const SegmentDescriptor as *mut SegmentDescriptor;
        unsafe {
            *slot = d;
        }
    }

    pub(crate) fn set_free_queue(&self, d: SegmentDescriptor) {
        let slot = &self.free_queue as *const SegmentDescriptor as *mut SegmentDescriptor;
        unsafe {
            *slot = d;
        }
    }

    pub(crate) fn set_submit_queue(&self, d: SegmentDescriptor) {
        let slot = &self.submit_queue as *const SegmentDescriptor as *mut SegmentDescriptor;
        unsafe {
            *slot = d;
        }
    }
}

/// One slot of the registry's lane-set array (§3 `ThreadLaneSet`, §4.3
/// "lane-set array"). Cache-line aligned so two slots never false-share.
#[repr(C, align(64))]
pub struct SharedThreadLaneSet {
    pub thread_id: AtomicU64,
    pub active: AtomicU32,
    _pad: [u8; 4],
    pub index_lane: LaneDescriptor,
    pub detail_lane: LaneDescriptor,
}

pub const THREAD_LANE_SET_SIZE: usize = std::mem::size_of::<SharedThreadLaneSet>();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_block_is_exactly_one_page() {
        assert_eq!(std::mem::size_of::<ControlBlock>(), CONTROL_BLOCK_SIZE);
    }

    #[test]
    fn index_event_fits_its_slot() {
        assert!(std::mem::size_of::<IndexEvent>() <= 32);
    }

    #[test]
    fn detail_event_fits_its_slot() {
        assert!(std::mem::size_of::<DetailEvent>() <= 256);
    }

    #[test]
    fn mode_round_trips_through_u32() {
        assert_eq!(Mode::from_u32(Mode::DualWrite as u32), Mode::DualWrite);
    }
}
