use thiserror::Error;

/// Setup-time errors for [`crate::Ring::create`]/[`crate::Ring::attach`].
///
/// These are the only fallible ring operations; everything on the hot path
/// (`write`, `read`, `read_batch`) is infallible and signals backpressure via
/// a `bool`/`Option` return plus a counter, never an `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    /// `total_bytes` does not decompose into a header plus a power-of-two
    /// count of `slot_size` slots.
    #[error("ring layout is invalid: total_bytes does not fit header + pow2 slots")]
    InvalidLayout,
    /// The header's magic did not match [`crate::header::MAGIC`].
    #[error("ring header has an invalid magic number")]
    InvalidMagic,
    /// The header's version did not match this build's expectations.
    #[error("ring header version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    /// The attacher's `(total_bytes, slot_size)` disagree with the header.
    #[error("ring header size/slot_size mismatch")]
    SizeMismatch,
}
