//! The writer sink (§6 "Writer sink", §9 "two concrete variants per
//! platform at most"): a narrow, byte-oriented trait plus the two
//! implementations this crate ships.

use crate::error::WriterError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Persists already-framed event bytes (see [`crate::framing`]). The drain
/// may block on a `Writer` — that is the one place in this system where
/// blocking is acceptable (§4.7 "the drain may block on its writer sink but
/// never on producers").
pub trait Writer: Send {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), WriterError>;

    fn flush(&mut self) -> Result<(), WriterError> {
        Ok(())
    }
}

/// Discards every frame, counting what it would have written. Used by
/// tests and by throughput benchmarks that want to measure the drain loop
/// without file I/O on the critical path.
#[derive(Debug, Default)]
pub struct NullWriter {
    pub frames_written: u64,
    pub bytes_written: u64,
}

impl Writer for NullWriter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), WriterError> {
        self.frames_written += 1;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }
}

/// Appends framed bytes to a file, buffered. The on-disk byte stream is a
/// flat concatenation of frames (§6) — interpreting it as a trace is
/// explicitly out of scope here (see `# 1. PURPOSE & SCOPE`).
pub struct FramedFileWriter {
    inner: BufWriter<File>,
}

impl FramedFileWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, WriterError> {
        let file = File::create(path)?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }
}

impl Writer for FramedFileWriter {
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), WriterError> {
        self.inner.write_all(frame)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), WriterError> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{self, LaneKind};

    #[test]
    fn null_writer_counts_without_persisting() {
        let mut w = NullWriter::default();
        let mut buf = Vec::new();
        framing::encode_into(&mut buf, LaneKind::Index, &7u64);
        w.write_frame(&buf).unwrap();
        assert_eq!(w.frames_written, 1);
        assert_eq!(w.bytes_written, buf.len() as u64);
    }

    #[test]
    fn framed_file_writer_appends_frames_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        let mut buf = Vec::new();
        framing::encode_into(&mut buf, LaneKind::Detail, &42u64);
        {
            let mut w = FramedFileWriter::create(&path).unwrap();
            w.write_frame(&buf).unwrap();
            w.flush().unwrap();
        }
        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, buf);
    }
}
