//! The in-process capture path: reentrancy guard, mode-dispatched writes to
//! per-thread lanes or the global fallback rings, and the fault-safe stack
//! probe (§4.4-§4.6, §9).

pub mod capture;
pub mod clock;
mod init;
mod stack_probe;
mod tls;
mod write_path;

pub use capture::{default_hb_timeout_ns, default_registry_config, AgentState, CaptureContext};
pub use clock::{Clock, MonotonicClock};
pub use init::{attach_producer_state, disable_unique_naming, get, registry_disabled, set_once, InitError, InitPayload};
pub use tls::reentrancy_blocked_count;
