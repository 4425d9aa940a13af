//! Builds a full producer/drain pair inside one process.
//!
//! A real deployment has the producer in the target process and the drain
//! in a separate controller process, joined only through named shared
//! memory. A rehearsal does not need the second process — opening the same
//! named segments twice from one process reproduces the same cross-process
//! handshake (see `ada-registry`'s `drain_side_attaches_lanes_the_producer_registered`
//! test) and lets a scenario drive both sides in lockstep.

use ada_agent::capture::{default_hb_timeout_ns, AgentState};
use ada_agent::clock::MonotonicClock;
use ada_registry::{
    registry_segment_len, ControlSegment, DetailEvent, GlobalRing, GlobalRings, IndexEvent,
    RegistryConfig, ThreadRegistry, CONTROL_BLOCK_SIZE, DEFAULT_GLOBAL_DETAIL_CAPACITY,
    DEFAULT_GLOBAL_INDEX_CAPACITY,
};
use ada_shm::Segment;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A process-unique shared-memory name prefix, so scenarios run with
/// `cargo test`'s default parallelism never collide.
#[must_use]
pub fn unique_name(tag: &str) -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("ada_sim_{tag}_{}_{n}", std::process::id())
}

/// One rehearsal session: the producer's view of the control block,
/// registry and global rings, plus an independent drain-side view attached
/// to the same three segments.
pub struct Session {
    pub producer: AgentState,
    pub drain_control: ControlSegment,
    pub drain_registry: ThreadRegistry,
    pub drain_global: GlobalRings,
    _index_segment: Segment,
    _detail_segment: Segment,
    _drain_index_segment: Segment,
    _drain_detail_segment: Segment,
}

/// Lays out a fresh control/registry/global triple and attaches a second,
/// independent view to each — the single-process stand-in for a controller
/// process.
pub fn build_session(config: RegistryConfig) -> Session {
    let tag = unique_name("session");

    let control_name = format!("{tag}_control");
    let control_segment = Segment::create(&control_name, CONTROL_BLOCK_SIZE).unwrap();
    let producer_control = ControlSegment::create(control_segment).unwrap();

    let registry_name = format!("{tag}_registry");
    let registry_len = registry_segment_len(&config);
    let producer_registry_segment = Segment::create(&registry_name, registry_len).unwrap();
    let producer_registry = ThreadRegistry::create(producer_registry_segment, config).unwrap();

    let index_name = format!("{tag}_index");
    let index_len = GlobalRing::<IndexEvent>::total_bytes(DEFAULT_GLOBAL_INDEX_CAPACITY);
    let mut index_segment = Segment::create(&index_name, index_len).unwrap();
    let producer_index = GlobalRing::create(index_segment.as_mut_slice(), DEFAULT_GLOBAL_INDEX_CAPACITY).unwrap();

    let detail_name = format!("{tag}_detail");
    let detail_len = GlobalRing::<DetailEvent>::total_bytes(DEFAULT_GLOBAL_DETAIL_CAPACITY);
    let mut detail_segment = Segment::create(&detail_name, detail_len).unwrap();
    let producer_detail = GlobalRing::create(detail_segment.as_mut_slice(), DEFAULT_GLOBAL_DETAIL_CAPACITY).unwrap();

    let producer = AgentState {
        control: producer_control,
        registry: Some(producer_registry),
        global: GlobalRings {
            index: producer_index,
            detail: producer_detail,
        },
        clock: Box::new(MonotonicClock),
        hb_timeout_ns: default_hb_timeout_ns(),
    };

    let drain_control_segment = Segment::open(&control_name, CONTROL_BLOCK_SIZE).unwrap();
    let drain_control = ControlSegment::attach(drain_control_segment).unwrap();

    let drain_registry_segment = Segment::open(&registry_name, registry_len).unwrap();
    let drain_registry = ThreadRegistry::attach(drain_registry_segment, config).unwrap();

    let mut drain_index_segment = Segment::open(&index_name, index_len).unwrap();
    let drain_index = GlobalRing::attach(drain_index_segment.as_mut_slice()).unwrap();
    let mut drain_detail_segment = Segment::open(&detail_name, detail_len).unwrap();
    let drain_detail = GlobalRing::attach(drain_detail_segment.as_mut_slice()).unwrap();

    Session {
        producer,
        drain_control,
        drain_registry,
        drain_global: GlobalRings {
            index: drain_index,
            detail: drain_detail,
        },
        _index_segment: index_segment,
        _detail_segment: detail_segment,
        _drain_index_segment: drain_index_segment,
        _drain_detail_segment: drain_detail_segment,
    }
}
