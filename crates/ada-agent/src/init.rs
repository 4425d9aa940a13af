//! Producer initialization: payload/environment parsing and the process-wide
//! `set_once`/`get` singleton (§6 "Producer initialization payload", §9
//! "Global mutable state").

use crate::capture::{default_hb_timeout_ns, default_registry_config, AgentState};
use crate::clock::MonotonicClock;
use ada_registry::{registry_segment_len, ControlSegment, GlobalRings, RegistryConfig, ThreadRegistry};
use ada_registry::global::{GlobalRing, DEFAULT_GLOBAL_DETAIL_CAPACITY, DEFAULT_GLOBAL_INDEX_CAPACITY};
use ada_shm::{segment_name, Segment, ShmError};
use std::sync::OnceLock;
use thiserror::Error;

/// Fields parsed out of the producer's initialization payload (§6).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitPayload {
    pub host_pid: Option<u32>,
    pub session_id: Option<u32>,
    pub exclude: Vec<String>,
}

impl InitPayload {
    /// Parses a payload string of `key=value` pairs. Fields are separated by
    /// `;`, `\n`, `\r`, or `\t`; `,` is reserved for the csv list inside
    /// `exclude=<csv>` (§6 lists all five characters as "separators" without
    /// distinguishing field-level from list-level — using `,` at both
    /// levels would make a multi-entry exclude list unparseable, so this
    /// implementation reserves `,` for the list and the rest for fields).
    /// Unrecognized keys are ignored.
    #[must_use]
    pub fn parse(payload: &str) -> Self {
        let mut out = Self::default();
        for field in payload.split([';', '\n', '\r', '\t']) {
            let field = field.trim();
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            match key.trim() {
                "host_pid" => out.host_pid = value.trim().parse().ok(),
                "session_id" => out.session_id = u32::from_str_radix(value.trim(), 16).ok(),
                "exclude" => {
                    out.exclude = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                _ => {}
            }
        }
        out
    }

    /// Fills any field still unset from `ADA_SHM_HOST_PID`/`ADA_SHM_SESSION_ID`/`ADA_EXCLUDE`.
    #[must_use]
    pub fn with_env_fallback(mut self) -> Self {
        if self.host_pid.is_none() {
            self.host_pid = std::env::var("ADA_SHM_HOST_PID").ok().and_then(|v| v.parse().ok());
        }
        if self.session_id.is_none() {
            self.session_id = std::env::var("ADA_SHM_SESSION_ID")
                .ok()
                .and_then(|v| u32::from_str_radix(&v, 16).ok());
        }
        if self.exclude.is_empty() {
            if let Ok(v) = std::env::var("ADA_EXCLUDE") {
                self.exclude = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();
            }
        }
        self
    }

    #[must_use]
    pub fn is_excluded(&self, function_name: &str) -> bool {
        self.exclude.iter().any(|pattern| pattern == function_name)
    }
}

#[must_use]
pub fn disable_unique_naming() -> bool {
    std::env::var("ADA_SHM_DISABLE_UNIQUE").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[must_use]
pub fn registry_disabled() -> bool {
    std::env::var("ADA_DISABLE_REGISTRY").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("shared memory error: {0}")]
    Shm(#[from] ShmError),
    #[error("registry error: {0}")]
    Registry(#[from] ada_registry::RegistryError),
}

fn role_name(role: &str, payload: &InitPayload) -> String {
    if disable_unique_naming() {
        return format!("ada_{role}");
    }
    let host_pid = payload.host_pid.unwrap_or_else(std::process::id);
    let session_id = payload.session_id.unwrap_or(0);
    segment_name(role, host_pid, session_id).unwrap_or_else(|_| format!("ada_{role}"))
}

/// Attaches to (never creates) the segments a controller is expected to
/// have already set up: control block, registry, and the two global rings.
/// Per §4.1's failure semantics, an open failure here degrades the producer
/// to local-only capture rather than aborting the target program.
///
/// When `ADA_DISABLE_REGISTRY` is set, the registry segment is never opened
/// at all and the returned state has no per-thread lanes — every event
/// goes through the global rings only, permanently, same as a live registry
/// stuck in `GLOBAL_ONLY` (§6 "recognized environment toggles").
pub fn attach_producer_state(payload: &InitPayload) -> Result<AgentState, InitError> {
    let config = default_registry_config();

    let control_name = role_name("control", payload);
    let control_segment = Segment::open(&control_name, ada_registry::CONTROL_BLOCK_SIZE)?;
    let control = ControlSegment::attach(control_segment)?;

    let registry = if registry_disabled() {
        None
    } else {
        let registry_name = role_name("registry", payload);
        let registry_len = registry_segment_len(&config);
        let registry_segment = Segment::open(&registry_name, registry_len)?;
        Some(ThreadRegistry::attach(registry_segment, config)?)
    };

    let index_name = role_name("index", payload);
    let index_len = GlobalRing::<ada_registry::IndexEvent>::total_bytes(DEFAULT_GLOBAL_INDEX_CAPACITY);
    let mut index_segment = Segment::open(&index_name, index_len)?;
    let index = GlobalRing::attach(index_segment.as_mut_slice())?;

    let detail_name = role_name("detail", payload);
    let detail_len = GlobalRing::<ada_registry::DetailEvent>::total_bytes(DEFAULT_GLOBAL_DETAIL_CAPACITY);
    let mut detail_segment = Segment::open(&detail_name, detail_len)?;
    let detail = GlobalRing::attach(detail_segment.as_mut_slice())?;
    // The producer's `GlobalRing` borrows `Segment`'s bytes; both segments
    // must outlive every ring built on them, so leak them into the running
    // process (they are reclaimed when the process exits, same as every
    // other shared mapping the producer attaches to for its lifetime).
    std::mem::forget(index_segment);
    std::mem::forget(detail_segment);

    Ok(AgentState {
        control,
        registry,
        global: GlobalRings { index, detail },
        clock: Box::new(MonotonicClock),
        hb_timeout_ns: default_hb_timeout_ns(),
    })
}

static STATE: OnceLock<AgentState> = OnceLock::new();

/// Initializes the process-wide agent state exactly once. Subsequent calls
/// are no-ops (§9: "never re-initialized within a session").
pub fn set_once(state: AgentState) {
    let _ = STATE.set(state);
}

#[must_use]
pub fn get() -> Option<&'static AgentState> {
    STATE.get()
}
