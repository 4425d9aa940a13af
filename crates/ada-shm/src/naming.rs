//! Segment name construction and validation (§4.1).
//!
//! Names follow `ada_{role}_{host_pid}_{session_id}` so that unrelated
//! tracing sessions on the same host never collide, and so an operator can
//! identify a leaked segment from `ls /dev/shm` alone. `session_id` is
//! rendered as lowercase hex to keep names short.

use crate::error::ShmError;

/// POSIX caps shared-memory object names well under this on every platform
/// `ada-shm` targets; used as a conservative, portable ceiling.
pub const MAX_NAME_LEN: usize = 255;

/// Builds and validates a segment name for the given role, host pid, and
/// session id.
///
/// `role` should be a short identifier such as `"global-index"`,
/// `"global-detail"`, or `"registry"` — it becomes part of a filesystem-like
/// path on most platforms, so it must not contain `/`.
pub fn segment_name(role: &str, host_pid: u32, session_id: u32) -> Result<String, ShmError> {
    debug_assert!(!role.contains('/'), "role must not contain a path separator");
    let name = format!("ada_{role}_{host_pid}_{session_id:08x}");
    if name.len() > MAX_NAME_LEN {
        return Err(ShmError::NameTooLong(name));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_role_pid_session() {
        let name = segment_name("global-index", 4242, 0xdead_beef).unwrap();
        assert_eq!(name, "ada_global-index_4242_deadbeef");
    }

    #[test]
    fn rejects_names_over_the_limit() {
        let role = "x".repeat(MAX_NAME_LEN);
        assert!(matches!(
            segment_name(&role, 1, 1),
            Err(ShmError::NameTooLong(_))
        ));
    }
}
