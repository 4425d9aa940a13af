//! Cross-process thread registry, per-thread lane pools, the shared control
//! block, the agent↔controller mode state machine, and the global fallback
//! rings used when per-thread lanes are unavailable or unhealthy.

pub mod abi;
mod control;
mod error;
pub mod global;
mod lane;
pub mod mode;
mod registry;

pub use abi::{
    ControlBlock, DetailEvent, EventKind, FlightState, IndexEvent, LaneDescriptor, Mode,
    ProcessState, RegistryHeader, SegmentDescriptor, SegmentTable, SharedThreadLaneSet,
    CONTROL_BLOCK_SIZE, MAX_SEGMENTS, REGISTRY_HEADER_SIZE, REGISTRY_MAGIC, REGISTRY_VERSION,
    RINGS_PER_LANE, STACK_SNAPSHOT_CAP, THREAD_LANE_SET_SIZE,
};
pub use control::ControlSegment;
pub use error::{RegisterError, RegistryError};
pub use global::{GlobalRing, GlobalRings, DEFAULT_GLOBAL_DETAIL_CAPACITY, DEFAULT_GLOBAL_INDEX_CAPACITY};
pub use lane::Lane;
pub use mode::{tick, HealthSignal, TickResult};
pub use registry::{registry_segment_len, RegisteredLanes, RegistryConfig, ThreadRegistry, DEFAULT_MAX_THREADS};
