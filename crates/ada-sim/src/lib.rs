//! Deterministic, single-process rehearsals of the end-to-end scenarios this
//! data plane is designed around. Nothing here ships to a real producer or
//! controller process — it is test-only scaffolding that wires the real
//! crates together without needing two processes.

pub mod harness;
