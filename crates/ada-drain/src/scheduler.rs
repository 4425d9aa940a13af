//! The consumer-side drain loop (§4.7).
//!
//! One [`DrainScheduler`] owns the read side of every ring reachable from a
//! single [`ControlSegment`]/[`ThreadRegistry`] pair: the two global
//! fallback rings and every active thread's index/detail lanes. It runs on
//! a `tokio::time::interval` cadence (bridging the synchronous ring API
//! into async the same way a polling consumer task does in the span
//! pipeline this is grounded on), stamping a liveness heartbeat every tick
//! and handing framed bytes to a pluggable [`Writer`].

use crate::framing::{self, LaneKind};
use crate::writer::Writer;
use ada_registry::{ControlSegment, GlobalRings, Lane, ThreadRegistry};
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

fn origin() -> &'static Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now)
}

/// Monotonic nanoseconds since this process's first call — mirrors
/// `ada_agent::clock::MonotonicClock` without pulling the producer-side
/// crate into the controller process.
fn now_ns() -> u64 {
    origin().elapsed().as_nanos() as u64
}

/// Tunable knobs for the drain loop (§4.7, §AMBIENT STACK "plain Copy
/// Config struct per crate").
#[derive(Debug, Clone, Copy)]
pub struct DrainConfig {
    /// Target tick cadence. §4.7 suggests 50-100 ms.
    pub tick_interval: Duration,
    /// Per-tick cap on events drained from each global ring (§4.7 step 2:
    /// "read_batch up to a fixed per-tick cap").
    pub global_batch_cap: usize,
}

impl DrainConfig {
    #[must_use]
    pub const fn new(tick_interval: Duration, global_batch_cap: usize) -> Self {
        Self {
            tick_interval,
            global_batch_cap,
        }
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(75), 4096)
    }
}

/// Running totals updated on every tick (§4.7 step 4).
#[derive(Debug, Default, Clone, Copy)]
pub struct DrainCounters {
    pub events_drained: u64,
    pub bytes_written: u64,
    pub rings_returned: u64,
    pub writer_errors: u64,
    pub ticks: u64,
}

/// Polls the global and per-thread rings reachable from one control/
/// registry pair and forwards framed bytes to `writer`.
pub struct DrainScheduler {
    control: ControlSegment,
    registry: ThreadRegistry,
    global: GlobalRings,
    writer: Box<dyn Writer>,
    config: DrainConfig,
    counters: DrainCounters,
    /// Rotates which active slot a tick starts iterating from, so a busy
    /// low-numbered thread never starves the others (§4.7 "iteration over
    /// the active mask is fair").
    next_start: u32,
}

impl DrainScheduler {
    #[must_use]
    pub fn new(
        control: ControlSegment,
        registry: ThreadRegistry,
        global: GlobalRings,
        writer: Box<dyn Writer>,
        config: DrainConfig,
    ) -> Self {
        Self {
            control,
            registry,
            global,
            writer,
            config,
            counters: DrainCounters::default(),
            next_start: 0,
        }
    }

    #[must_use]
    pub fn counters(&self) -> DrainCounters {
        self.counters
    }

    /// One full tick: heartbeat, global rings, then every active lane
    /// (§4.7 steps 1-4). Public so tests and `ada-sim` scenarios can drive
    /// it deterministically without a real clock.
    pub fn tick(&mut self) {
        self.control
            .block()
            .drain_heartbeat_ns
            .store(now_ns(), Ordering::Release);
        self.drain_global();
        self.drain_lanes();
        self.counters.ticks += 1;
    }

    fn emit<T: Copy>(writer: &mut dyn Writer, counters: &mut DrainCounters, buf: &mut Vec<u8>, kind: LaneKind, event: &T) {
        buf.clear();
        framing::encode_into(buf, kind, event);
        match writer.write_frame(buf) {
            Ok(()) => {
                counters.events_drained += 1;
                counters.bytes_written += buf.len() as u64;
            }
            Err(e) => {
                log::warn!("ada-drain: writer error: {e}");
                counters.writer_errors += 1;
            }
        }
    }

    fn drain_global(&mut self) {
        let writer = &mut self.writer;
        let counters = &mut self.counters;
        let mut buf = Vec::new();
        self.global.index.consume_up_to(self.config.global_batch_cap, |ev| {
            Self::emit(writer.as_mut(), counters, &mut buf, LaneKind::Index, ev);
        });
        self.global.detail.consume_up_to(self.config.global_batch_cap, |ev| {
            Self::emit(writer.as_mut(), counters, &mut buf, LaneKind::Detail, ev);
        });
    }

    fn drain_lanes(&mut self) {
        let capacity = self.registry.capacity();
        if capacity == 0 {
            return;
        }
        let start = self.next_start % capacity;
        self.next_start = self.next_start.wrapping_add(1);
        let mask = self.registry.active_mask();

        for offset in 0..capacity {
            let idx = (start + offset) % capacity;
            if mask & (1u64 << idx) == 0 {
                continue;
            }
            let Some(lanes) = self.registry.attach_thread(idx) else {
                continue;
            };
            drain_lane(&lanes.index, LaneKind::Index, self.writer.as_mut(), &mut self.counters);
            drain_lane(&lanes.detail, LaneKind::Detail, self.writer.as_mut(), &mut self.counters);
        }
    }

    /// Runs the tick loop until `shutdown_requested` is observed, then
    /// stops accepting new registrations, drains one final full pass
    /// (§4.7 step 5: "finish one full pass including active rings, then
    /// exit"), flushes the writer, and returns `self` so the caller can
    /// inspect final counters or reclaim the writer.
    pub async fn run(mut self) -> Self {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        loop {
            interval.tick().await;
            self.tick();
            if self.registry.is_shutdown_requested() {
                self.registry.stop_accepting();
                self.tick();
                break;
            }
        }
        if let Err(e) = self.writer.flush() {
            log::warn!("ada-drain: final flush failed: {e}");
        }
        self
    }
}

/// Drains every submitted ring completely, returns each to the free queue,
/// then peeks (without returning) whatever is already committed on the
/// currently active ring (§4.7 step 3).
fn drain_lane<T: Copy>(lane: &Lane<T>, kind: LaneKind, writer: &mut dyn Writer, counters: &mut DrainCounters) {
    let mut buf = Vec::new();
    while let Some(idx) = lane.take_submitted_ring() {
        let ring = lane.ring(idx);
        ring.consume_batch(|ev| DrainScheduler::emit(writer, counters, &mut buf, kind, ev));
        if lane.return_free_ring(idx) {
            counters.rings_returned += 1;
        } else {
            log::warn!("ada-drain: free queue rejected ring {idx} (unexpectedly full)");
        }
    }
    let active = lane.active_ring();
    active.consume_batch(|ev| DrainScheduler::emit(writer, counters, &mut buf, kind, ev));
}
