//! POSIX shared-memory segment creation and attachment.
//!
//! Layout offset calculation (header vs. payload) is left to callers such as
//! `ada-ring::Ring::create`/`attach` — a `Segment` is nothing more than a
//! named, sized, page-mapped byte region.

use crate::error::ShmError;
use std::ffi::CString;
use std::io;
use std::ptr;

/// A mapped POSIX shared-memory segment.
///
/// Dropping a `Segment` always unmaps it. If this process created the
/// segment (see [`Segment::create`]), dropping it also unlinks the
/// underlying object so it does not outlive every attached process; segments
/// opened via [`Segment::open`] are left behind for other attachers.
pub struct Segment {
    name: String,
    ptr: *mut u8,
    len: usize,
    owner: bool,
}

// SAFETY: the mapped region is plain bytes; callers are responsible for the
// synchronization discipline of whatever they place inside it (typically a
// `RingHeader`-prefixed ring, which is Send + Sync in its own right).
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates a brand-new segment of exactly `len` bytes, owned by this
    /// process. Fails with [`ShmError::AlreadyExists`] if a segment with
    /// this name is already mapped somewhere.
    pub fn create(name: &str, len: usize) -> Result<Self, ShmError> {
        let path = shm_path(name)?;
        // SAFETY: path is a valid NUL-terminated C string; flags request
        // exclusive creation so two creators can never both succeed.
        let fd = unsafe {
            libc::shm_open(
                path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            return Err(classify_errno(name, "shm_open"));
        }
        let ptr = match ftruncate_and_map(fd, len) {
            Ok(ptr) => ptr,
            Err(e) => {
                // SAFETY: fd was just opened by us above and not yet closed
                // (ftruncate_and_map only closes it on the success path).
                unsafe {
                    libc::close(fd);
                }
                let _ = unsafe { libc::shm_unlink(path.as_ptr()) };
                return Err(os_error(name, "ftruncate/mmap", e));
            }
        };
        Ok(Self {
            name: name.to_string(),
            ptr,
            len,
            owner: true,
        })
    }

    /// Attaches to an existing segment created by (possibly) another
    /// process. Validates the mapped size equals `expected_len`.
    pub fn open(name: &str, expected_len: usize) -> Result<Self, ShmError> {
        let path = shm_path(name)?;
        // SAFETY: path is a valid NUL-terminated C string.
        let fd = unsafe { libc::shm_open(path.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(classify_errno(name, "shm_open"));
        }
        let actual_len = match fd_size(fd) {
            Ok(n) => n,
            Err(e) => {
                // SAFETY: fd was just opened above.
                unsafe {
                    libc::close(fd);
                }
                return Err(os_error(name, "fstat", e));
            }
        };
        if actual_len != expected_len as libc::off_t {
            // SAFETY: fd was just opened above.
            unsafe {
                libc::close(fd);
            }
            return Err(ShmError::SizeMismatch {
                name: name.to_string(),
                expected: expected_len,
                found: actual_len as usize,
            });
        }
        let ptr = map_fd(fd, expected_len).map_err(|e| os_error(name, "mmap", e))?;
        Ok(Self {
            name: name.to_string(),
            ptr,
            len: expected_len,
            owner: false,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mmap mapping for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr/len describe a live mmap mapping for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // SAFETY: ptr/len were produced by a successful mmap in create/open
        // and are not aliased after this point.
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
        }
        if self.owner {
            if let Ok(path) = CString::new(format!("/{}", self.name)) {
                // SAFETY: path is a valid NUL-terminated C string; failure to
                // unlink only leaks the name, it cannot corrupt memory.
                unsafe {
                    libc::shm_unlink(path.as_ptr());
                }
            }
        }
    }
}

fn shm_path(name: &str) -> Result<CString, ShmError> {
    CString::new(format!("/{name}")).map_err(|_| ShmError::NameTooLong(name.to_string()))
}

fn ftruncate_and_map(fd: i32, len: usize) -> Result<*mut u8, io::Error> {
    // SAFETY: fd is a valid, just-opened shared-memory descriptor.
    let rc = unsafe { libc::ftruncate(fd, len as libc::off_t) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    map_fd(fd, len)
}

fn map_fd(fd: i32, len: usize) -> Result<*mut u8, io::Error> {
    // SAFETY: fd is a valid shared-memory descriptor sized to at least `len`.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    // SAFETY: fd is no longer needed once mapped; POSIX keeps the mapping
    // alive independent of the descriptor.
    unsafe {
        libc::close(fd);
    }
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    Ok(ptr.cast())
}

fn fd_size(fd: i32) -> Result<libc::off_t, io::Error> {
    // SAFETY: fd is a valid, open descriptor; stat is zero-initialized before the call.
    unsafe {
        let mut stat: libc::stat = std::mem::zeroed();
        if libc::fstat(fd, &mut stat) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(stat.st_size)
    }
}

fn classify_errno(name: &str, op: &str) -> ShmError {
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EEXIST) => ShmError::AlreadyExists(name.to_string()),
        Some(libc::ENOENT) => ShmError::NotFound(name.to_string()),
        Some(libc::EACCES | libc::EPERM) => ShmError::PermissionDenied(name.to_string()),
        _ => os_error(name, op, err),
    }
}

fn os_error(name: &str, op: &str, source: io::Error) -> ShmError {
    log::warn!("ada-shm: {op} failed for segment '{name}': {source}");
    ShmError::Os {
        name: name.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("adatest_{tag}_{}", std::process::id())
    }

    #[test]
    fn create_then_open_shares_memory() {
        let name = unique_name("roundtrip");
        let mut writer = Segment::create(&name, 4096).unwrap();
        writer.as_mut_slice()[0] = 0xAB;

        let reader = Segment::open(&name, 4096).unwrap();
        assert_eq!(reader.as_slice()[0], 0xAB);
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let name = unique_name("dup");
        let _first = Segment::create(&name, 4096).unwrap();
        let second = Segment::create(&name, 4096);
        assert!(matches!(second, Err(ShmError::AlreadyExists(_))));
    }

    #[test]
    fn open_missing_segment_fails_with_not_found() {
        let name = unique_name("missing");
        assert!(matches!(
            Segment::open(&name, 4096),
            Err(ShmError::NotFound(_))
        ));
    }

    #[test]
    fn open_with_wrong_size_fails() {
        let name = unique_name("sizemismatch");
        let _seg = Segment::create(&name, 4096).unwrap();
        assert!(matches!(
            Segment::open(&name, 8192),
            Err(ShmError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn owner_unlinks_on_drop() {
        let name = unique_name("unlink");
        {
            let _seg = Segment::create(&name, 4096).unwrap();
        }
        assert!(matches!(
            Segment::open(&name, 4096),
            Err(ShmError::NotFound(_))
        ));
    }
}
