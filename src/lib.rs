//! Dual-lane flight-recorder tracing data plane: a producer-side capture
//! library plus a consumer-side drain scheduler, joined through named
//! POSIX shared memory (see `ada-shm`, `ada-ring`, `ada-registry`,
//! `ada-agent`, `ada-drain`).
//!
//! This crate is a thin facade: it re-exports the pieces a caller wiring up
//! either side of the data plane needs, so `ada-demo` and downstream
//! consumers can depend on one crate instead of five.

pub use ada_agent::{
    attach_producer_state, default_hb_timeout_ns, default_registry_config, disable_unique_naming, get,
    reentrancy_blocked_count, registry_disabled, set_once, AgentState, CaptureContext, Clock, InitError,
    InitPayload, MonotonicClock,
};
pub use ada_drain::{DrainConfig, DrainCounters, DrainScheduler, FramedFileWriter, LaneKind, NullWriter, Writer, WriterError};
pub use ada_registry::{
    registry_segment_len, tick, ControlSegment, DetailEvent, EventKind, FlightState, GlobalRing,
    GlobalRings, HealthSignal, IndexEvent, Lane, Mode, RegisterError, RegisteredLanes,
    RegistryConfig, RegistryError, ThreadRegistry, TickResult, CONTROL_BLOCK_SIZE,
    DEFAULT_GLOBAL_DETAIL_CAPACITY, DEFAULT_GLOBAL_INDEX_CAPACITY, DEFAULT_MAX_THREADS,
};
pub use ada_ring::Ring;
pub use ada_shm::{segment_name, Segment, ShmError};
