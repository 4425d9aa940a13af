//! Lock-free single-producer single-consumer ring buffer over a
//! caller-supplied byte region.
//!
//! The buffer carries a small header (see [`header::RingHeader`]) ahead of
//! its slot array so that a reader attaching from a different process can
//! validate the layout before touching any slot. Everything on the hot path
//! (`write`, `read`, `read_batch`, `consume_batch`) is lock-free and
//! allocation-free; the only fallible operations are `create`/`attach`.

mod backoff;
mod error;
mod header;
mod invariants;
mod reservation;
mod ring;

pub use backoff::Backoff;
pub use error::RingError;
pub use header::{RingHeader, HEADER_SIZE, MAGIC, VERSION};
pub use reservation::Reservation;
pub use ring::Ring;
