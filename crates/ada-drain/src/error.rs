use thiserror::Error;

/// Writer-sink failures (§7 "Writer errors: surfaced in drain counters,
/// never block the drain"). The scheduler never propagates these — it logs
/// and counts them — but the type is public so a `Writer` implementation
/// has something concrete to return.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer I/O error: {0}")]
    Io(#[from] std::io::Error),
}
