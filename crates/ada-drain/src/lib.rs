//! The consumer side of the data plane: a scheduler that polls global and
//! per-thread rings on a fixed cadence and hands framed bytes to a
//! pluggable writer (§4.7).

pub mod error;
pub mod framing;
pub mod scheduler;
pub mod writer;

pub use error::WriterError;
pub use framing::LaneKind;
pub use scheduler::{DrainConfig, DrainCounters, DrainScheduler};
pub use writer::{FramedFileWriter, NullWriter, Writer};
