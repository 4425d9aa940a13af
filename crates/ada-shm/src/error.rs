use thiserror::Error;

/// Errors raised while creating, opening, or validating a shared-memory
/// segment (§4.1). These are setup-time errors only — once attached, a
/// segment's accessors are infallible.
#[derive(Debug, Error)]
pub enum ShmError {
    /// The computed `ada_{role}_{host_pid}_{session_id}` name exceeds the
    /// platform's shared-memory object name limit.
    #[error("segment name '{0}' exceeds the platform name length limit")]
    NameTooLong(String),
    /// `Segment::create` was called for a name that is already mapped by
    /// another process.
    #[error("segment '{0}' already exists")]
    AlreadyExists(String),
    /// `Segment::open` was called for a name with no backing object.
    #[error("segment '{0}' not found")]
    NotFound(String),
    /// The calling process lacks permission to create or open the segment.
    #[error("permission denied opening segment '{0}'")]
    PermissionDenied(String),
    /// An attacher's expected size does not match the segment's actual size.
    #[error("segment '{name}' size mismatch: expected {expected}, found {found}")]
    SizeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    /// Any other OS-level failure (`shm_open`, `ftruncate`, `mmap`, `stat`).
    #[error("segment '{name}' syscall failure: {source}")]
    Os {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
