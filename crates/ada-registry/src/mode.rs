//! Agent↔controller mode state machine (§4.6).
//!
//! Pure, side-effect-free transition logic; callers (`ada-agent::capture`)
//! own the thread-local cached mode and the shared `registry_mode`
//! publication.

use crate::abi::Mode;

/// The signals a mode tick is computed from, read with acquire ordering by
/// the caller before this function runs.
#[derive(Debug, Clone, Copy)]
pub struct HealthSignal {
    pub registry_ready: bool,
    pub registry_epoch: u32,
    pub drain_heartbeat_ns: u64,
    pub now_ns: u64,
    pub hb_timeout_ns: u64,
}

impl HealthSignal {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.registry_ready
            && self.registry_epoch > 0
            && self.drain_heartbeat_ns != 0
            && self.now_ns.saturating_sub(self.drain_heartbeat_ns) <= self.hb_timeout_ns
    }
}

/// Outcome of one mode tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    pub mode: Mode,
    /// Mode differs from the input `current` — caller should publish it and
    /// bump `mode_transitions`.
    pub transitioned: bool,
    /// The transition was a demotion — caller should bump `fallback_events`
    /// instead of (not in addition to) `mode_transitions`, per §4.6's table.
    pub is_fallback: bool,
}

/// Applies the §4.6 transition table for one tick.
#[must_use]
pub fn tick(current: Mode, signal: HealthSignal) -> TickResult {
    let healthy = signal.is_healthy();
    let (mode, transitioned, is_fallback) = match (current, healthy) {
        (Mode::GlobalOnly, true) => (Mode::DualWrite, true, false),
        (Mode::DualWrite, true) => (Mode::PerThreadOnly, true, false),
        (Mode::PerThreadOnly, true) => (Mode::PerThreadOnly, false, false),
        (Mode::PerThreadOnly, false) => (Mode::DualWrite, true, true),
        (Mode::DualWrite, false) => (Mode::GlobalOnly, true, true),
        (Mode::GlobalOnly, false) => (Mode::GlobalOnly, false, false),
    };
    TickResult {
        mode,
        transitioned,
        is_fallback,
    }
}
