//! Mode-dispatched event write (§4.5).

use crate::tls;
use ada_registry::{ControlBlock, GlobalRing, Lane, Mode};
use std::sync::atomic::Ordering;

/// Writes `event` according to `mode`'s rule:
/// - `PerThreadOnly`: try the active lane ring; on full, swap once and
///   retry; on repeated failure, drop and count it.
/// - `DualWrite`: the per-thread path above, plus an unconditional write to
///   the corresponding global ring (so the consumer never misses events
///   crossing a transition).
/// - `GlobalOnly`: the global ring only.
pub fn write_event<T: Copy>(
    mode: Mode,
    lane: Option<&Lane<T>>,
    global: &GlobalRing<T>,
    event: T,
    control: &ControlBlock,
) {
    match mode {
        Mode::PerThreadOnly => write_to_lane_or_fallback(lane, event, control),
        Mode::DualWrite => {
            write_to_lane_or_fallback(lane, event, control);
            let _ = global.write(event);
        }
        Mode::GlobalOnly => {
            let _ = global.write(event);
        }
    }
}

fn write_to_lane_or_fallback<T: Copy>(lane: Option<&Lane<T>>, event: T, control: &ControlBlock) {
    let Some(lane) = lane else {
        // No lane resolved for this thread (registration never happened or
        // failed) — there is nothing left to try but the drop counter.
        control.fallback_events.fetch_add(1, Ordering::Relaxed);
        return;
    };
    if lane.active_ring().write(event) {
        return;
    }
    if lane.swap_active_ring() && lane.active_ring().write(event) {
        return;
    }
    tls::record_ring_full();
    control.fallback_events.fetch_add(1, Ordering::Relaxed);
}
