//! Fault-safe stack snapshot capture (§4.4 step 5, §9 redesign flag: "the
//! source uses a process-global, non-thread-safe fault handler; replace it
//! with a per-thread probe, e.g. byte-at-a-time with read-only
//! verification").
//!
//! Rather than installing a signal handler and catching `SIGSEGV` — global
//! state shared across every concurrently-capturing thread, exactly the
//! hazard §9 flags — this probe asks the kernel whether each page is
//! resident via `mincore` *before* touching it, and stops at the first page
//! that isn't. No handler, no process-wide mutable state, safe to call
//! concurrently from any number of threads.

/// Copies up to `out.len()` bytes starting at `sp` into `out`, stopping at
/// the first page that `mincore` reports as not resident. Returns the
/// number of bytes actually copied.
///
/// # Safety
/// `sp` must be a pointer the caller obtained from a live CPU context
/// (typically the current stack pointer); this function never dereferences
/// a byte without first confirming its page is mapped.
pub fn probe(sp: *const u8, out: &mut [u8]) -> usize {
    if out.is_empty() {
        return 0;
    }
    let page_size = page_size();
    let start = sp as usize;
    let end = start.saturating_add(out.len());
    let mut copied = 0usize;
    let mut cursor = start;

    while cursor < end {
        let page_start = cursor & !(page_size - 1);
        if !page_resident(page_start, page_size) {
            break;
        }
        let page_end = page_start.saturating_add(page_size).min(end);
        let n = page_end - cursor;
        // SAFETY: `page_resident` just confirmed `[page_start, page_start +
        // page_size)` is mapped and readable, and `[cursor, cursor+n)` is a
        // subrange of it.
        unsafe {
            std::ptr::copy_nonoverlapping(cursor as *const u8, out[copied..].as_mut_ptr(), n);
        }
        copied += n;
        cursor = page_end;
    }
    copied
}

fn page_size() -> usize {
    // SAFETY: sysconf with a well-known, always-valid name.
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if n > 0 {
        n as usize
    } else {
        4096
    }
}

fn page_resident(page_start: usize, page_size: usize) -> bool {
    if page_start == 0 {
        return false;
    }
    let mut vec = [0u8; 1];
    // SAFETY: `mincore` only reads page-table metadata for the given range;
    // it never dereferences the memory itself, so this is safe to call even
    // for a range this process does not own (it will simply return an error
    // or report the page as not resident).
    let rc = unsafe { libc::mincore(page_start as *mut libc::c_void, page_size, vec.as_mut_ptr()) };
    rc == 0 && (vec[0] & 1) != 0
}
