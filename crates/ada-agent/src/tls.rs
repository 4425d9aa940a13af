//! Per-thread state for the capture path (§4.4, §9 "Reentrancy via
//! thread-local flags").
//!
//! Every field here is thread-local by construction: a scoped guard rather
//! than a heap-allocated object, so entering and leaving a capture costs a
//! cell read/write and nothing else.

use ada_registry::Mode;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

thread_local! {
    static IN_CAPTURE: Cell<bool> = const { Cell::new(false) };
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
    static CACHED_MODE: Cell<u32> = const { Cell::new(Mode::GlobalOnly as u32) };
    static REENTRANCY_BLOCKED: Cell<u64> = const { Cell::new(0) };
    static RING_FULL: Cell<u64> = const { Cell::new(0) };
    static THREAD_ID: Cell<Option<u64>> = const { Cell::new(None) };
    static REGISTERED_SLOT: Cell<Option<u32>> = const { Cell::new(None) };
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// A stack-scoped guard recording capture entry/exit. Holding one means this
/// thread's capture has exclusive use of its thread-local scratch state;
/// `None` means another frame on this thread is already capturing (or
/// mid-unwind through one), and the caller must return without doing
/// anything that could itself trigger a hook.
pub struct ReentrancyGuard(());

impl ReentrancyGuard {
    #[must_use]
    pub fn enter() -> Option<Self> {
        let already_in = IN_CAPTURE.with(|f| f.replace(true));
        if already_in {
            REENTRANCY_BLOCKED.with(|c| c.set(c.get() + 1));
            return None;
        }
        Some(Self(()))
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_CAPTURE.with(|f| f.set(false));
    }
}

#[must_use]
pub fn reentrancy_blocked_count() -> u64 {
    REENTRANCY_BLOCKED.with(Cell::get)
}

/// CALL: depth is captured, then incremented for nested calls.
pub fn call_depth_for_event() -> u32 {
    CALL_DEPTH.with(|d| {
        let v = d.get();
        d.set(v + 1);
        v
    })
}

/// RETURN: depth is captured, then decremented back to the caller's frame.
pub fn return_depth_for_event() -> u32 {
    CALL_DEPTH.with(|d| {
        let v = d.get();
        d.set(v.saturating_sub(1));
        v
    })
}

/// Reads the current depth without adjusting it — used for EXCEPTION, which
/// unwinds outside the CALL/RETURN pairing and must not double-count.
#[must_use]
pub fn current_depth() -> u32 {
    CALL_DEPTH.with(Cell::get)
}

#[must_use]
pub fn cached_mode() -> Mode {
    CACHED_MODE.with(|c| Mode::from_u32(c.get()))
}

pub fn set_cached_mode(mode: Mode) {
    CACHED_MODE.with(|c| c.set(mode as u32));
}

pub fn record_ring_full() {
    RING_FULL.with(|c| c.set(c.get() + 1));
}

#[must_use]
pub fn ring_full_count() -> u64 {
    RING_FULL.with(Cell::get)
}

/// A process-lifetime-stable, per-thread identifier. Not an OS thread ID —
/// just a dense opaque label, which is all `IndexEvent::thread_id` requires.
#[must_use]
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        cell.set(Some(id));
        id
    })
}

#[must_use]
pub fn cached_slot() -> Option<u32> {
    REGISTERED_SLOT.with(Cell::get)
}

pub fn set_cached_slot(slot: u32) {
    REGISTERED_SLOT.with(|c| c.set(Some(slot)));
}
