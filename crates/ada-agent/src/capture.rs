//! The producer-side capture protocol (§4.4).
//!
//! `on_call`/`on_return`/`on_exception` are the three entry points a hook
//! installer attaches to instrumented code. Each runs the same six-step
//! protocol: reentrancy guard, mode tick, depth update, index capture,
//! detail capture, leave guard — steps 1 and 6 are the guard's
//! construction and destruction, so the body below only spells out 2-5.

use crate::clock::Clock;
use crate::stack_probe;
use crate::tls::{self, ReentrancyGuard};
use crate::write_path;
use ada_registry::{
    ControlBlock, ControlSegment, DetailEvent, EventKind, FlightState, GlobalRings, IndexEvent, Mode,
    RegistryConfig, STACK_SNAPSHOT_CAP, ThreadRegistry,
};
use std::sync::atomic::Ordering;

/// The CPU context a hook installer hands the agent on entry/exit (§6
/// "Instrumentation callback" — "`ctx` yields the CPU register snapshot and
/// an abstracted stack pointer").
#[derive(Debug, Clone, Copy)]
pub struct CaptureContext {
    pub registers: [u64; 8],
    pub frame_pointer: u64,
    pub stack_pointer: u64,
    pub link_register: u64,
}

/// Process-wide state the capture path needs on every call: the control
/// block, the thread registry, the global fallback rings, the clock, and
/// the heartbeat timeout used by the mode state machine (§9 "Global mutable
/// state").
pub struct AgentState {
    pub control: ControlSegment,
    /// `None` when `ADA_DISABLE_REGISTRY` was set at attach time — the
    /// producer then has no per-thread lanes at all and every event goes
    /// straight to the global rings (§6 "recognized environment toggles").
    pub registry: Option<ThreadRegistry>,
    pub global: GlobalRings,
    pub clock: Box<dyn Clock>,
    pub hb_timeout_ns: u64,
}

impl AgentState {
    fn slot_for_current_thread(&self) -> Option<u32> {
        let registry = self.registry.as_ref()?;
        if let Some(slot) = tls::cached_slot() {
            return Some(slot);
        }
        let thread_id = tls::current_thread_id();
        match registry.register(thread_id) {
            Ok(slot) => {
                tls::set_cached_slot(slot);
                Some(slot)
            }
            Err(_) => None,
        }
    }

    fn tick_mode(&self, now_ns: u64) {
        if self.registry.is_none() {
            // no registry attached, nothing to promote into — stay on
            // whatever `mode()` forces below.
            return;
        }
        let control = self.control.block();
        let signal = ada_registry::HealthSignal {
            registry_ready: control.registry_ready.load(Ordering::Acquire) != 0,
            registry_epoch: control.registry_epoch.load(Ordering::Acquire),
            drain_heartbeat_ns: control.drain_heartbeat_ns.load(Ordering::Acquire),
            now_ns,
            hb_timeout_ns: self.hb_timeout_ns,
        };
        let current = tls::cached_mode();
        let result = ada_registry::tick(current, signal);
        if result.transitioned {
            control.registry_mode.store(result.mode as u32, Ordering::Release);
            if result.is_fallback {
                control.fallback_events.fetch_add(1, Ordering::Relaxed);
            } else {
                control.mode_transitions.fetch_add(1, Ordering::Relaxed);
            }
            tls::set_cached_mode(result.mode);
        }
    }

    fn mode(&self, control: &ControlBlock) -> Mode {
        if self.registry.is_none() {
            return Mode::GlobalOnly;
        }
        Mode::from_u32(control.registry_mode.load(Ordering::Acquire))
    }

    fn capture(&self, ctx: &CaptureContext, function_id: u64, kind: EventKind, depth: u32, now_ns: u64) {
        let control = self.control.block();
        let thread_id = tls::current_thread_id();
        let slot = self.slot_for_current_thread();
        let mode = self.mode(control);

        if control.index_lane_enabled.load(Ordering::Acquire) != 0 {
            let event = IndexEvent::new(now_ns, function_id, thread_id, kind, depth);
            let lane = slot.and_then(|s| self.registry.as_ref()?.lanes(s)).map(|l| &l.index);
            write_path::write_event(mode, lane, &self.global.index, event, control);
        }

        let recording = control.flight_state.load(Ordering::Acquire) == FlightState::Recording as u32;
        if control.detail_lane_enabled.load(Ordering::Acquire) != 0 && recording {
            let mut detail = DetailEvent {
                index: IndexEvent::new(now_ns, function_id, thread_id, kind, depth),
                registers: ctx.registers,
                frame_pointer: ctx.frame_pointer,
                stack_pointer: ctx.stack_pointer,
                link_register: ctx.link_register,
                ..DetailEvent::default()
            };
            if control.capture_stack_snapshot.load(Ordering::Acquire) != 0 {
                let mut buf = [0u8; STACK_SNAPSHOT_CAP];
                let n = stack_probe::probe(ctx.stack_pointer as *const u8, &mut buf);
                detail.stack_snapshot[..n].copy_from_slice(&buf[..n]);
                detail.stack_snapshot_len = n as u32;
            }
            let lane = slot.and_then(|s| self.registry.as_ref()?.lanes(s)).map(|l| &l.detail);
            write_path::write_event(mode, lane, &self.global.detail, detail, control);
        }
    }

    pub fn on_call(&self, ctx: &CaptureContext, function_id: u64) {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        let now_ns = self.clock.now_ns();
        self.tick_mode(now_ns);
        let depth = tls::call_depth_for_event();
        self.capture(ctx, function_id, EventKind::Call, depth, now_ns);
    }

    pub fn on_return(&self, ctx: &CaptureContext, function_id: u64) {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        let now_ns = self.clock.now_ns();
        self.tick_mode(now_ns);
        let depth = tls::return_depth_for_event();
        self.capture(ctx, function_id, EventKind::Return, depth, now_ns);
    }

    pub fn on_exception(&self, ctx: &CaptureContext, function_id: u64) {
        let Some(_guard) = ReentrancyGuard::enter() else {
            return;
        };
        let now_ns = self.clock.now_ns();
        self.tick_mode(now_ns);
        // An exception unwinds the current frame without a matching RETURN;
        // it is captured at whatever depth the CALL left behind, and does
        // not itself adjust the depth counter.
        let depth = tls::current_depth();
        self.capture(ctx, function_id, EventKind::Exception, depth, now_ns);
    }
}

/// Convenience constructor matching `RegistryConfig::default()`'s sizing,
/// used by `init::bootstrap` and by the demo binary.
pub fn default_hb_timeout_ns() -> u64 {
    500_000_000 // 500 ms; several drain ticks at the 50-100 ms cadence of §4.7.
}

#[must_use]
pub fn default_registry_config() -> RegistryConfig {
    RegistryConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use ada_registry::{CONTROL_BLOCK_SIZE, GlobalRing};
    use ada_shm::Segment;

    fn agent_state(name: &str) -> AgentState {
        let segment = Segment::create(name, CONTROL_BLOCK_SIZE).unwrap();
        let control = ControlSegment::create(segment).unwrap();
        AgentState {
            control,
            registry: None,
            global: GlobalRings {
                index: GlobalRing::new_heap(64),
                detail: GlobalRing::new_heap(64),
            },
            clock: Box::new(MonotonicClock),
            hb_timeout_ns: default_hb_timeout_ns(),
        }
    }

    fn ctx() -> CaptureContext {
        CaptureContext {
            registers: [0; 8],
            frame_pointer: 0,
            stack_pointer: 0,
            link_register: 0,
        }
    }

    /// A call already in progress on this thread must block a nested call
    /// outright: no event reaches either sink, and the only visible effect
    /// is one `reentrancy_blocked` increment per nested attempt.
    #[test]
    fn a_call_already_in_flight_blocks_nested_calls_without_recording_an_event() {
        let state = agent_state(&format!("ada_capture_test_reentrancy_{}", std::process::id()));
        let before = tls::reentrancy_blocked_count();

        let outer = ReentrancyGuard::enter().expect("thread starts out of capture");

        state.on_call(&ctx(), 1);
        assert_eq!(tls::reentrancy_blocked_count(), before + 1);

        state.on_return(&ctx(), 1);
        assert_eq!(tls::reentrancy_blocked_count(), before + 2);

        drop(outer);

        assert_eq!(state.global.index.overflow_count(), 0);
        assert!(state.global.index.read().is_none(), "a blocked nested call must not have written an event");

        // guard released: a call now goes through normally.
        state.on_call(&ctx(), 2);
        assert_eq!(tls::reentrancy_blocked_count(), before + 2);
        assert_eq!(state.global.index.read().map(|e| e.function_id), Some(2));
        assert!(state.global.index.read().is_none());
    }
}
