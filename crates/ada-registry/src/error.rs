use thiserror::Error;

/// Setup-time errors for registry creation/attachment (§4.3, §7 "Setup errors").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("registry header has an invalid magic number")]
    InvalidMagic,
    #[error("registry header version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("registry memory too small for the requested capacity")]
    InvalidLayout,
}

/// Capacity errors from `register`/`swap_active_ring` (§7 "Capacity
/// errors" — never fatal, always paired with a counter increment by the
/// caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// `accepting_registrations` was false, or every slot is already claimed.
    #[error("registry is full or no longer accepting registrations")]
    RegistryFull,
    /// The bump pool ran out of bytes for this thread's lane metadata/rings.
    #[error("registry pool is exhausted")]
    PoolExhausted,
}
