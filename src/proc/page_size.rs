//! System page size resolution.
//!
//! statm records are expressed in pages, so the monitor needs the page size
//! once at startup. Resolution never fails the caller: if `sysconf` is
//! unavailable or reports nonsense, the common 4 KiB default is used.

use once_cell::sync::Lazy;

/// Fallback page size in bytes when the system value cannot be determined.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Queries the OS page size.
fn get_page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        // Returns -1 on error - handled by the > 0 check
        unsafe {
            let size = libc::sysconf(libc::_SC_PAGESIZE);
            if size > 0 {
                return size as u64;
            }
        }
    }
    DEFAULT_PAGE_SIZE
}

/// System page size in bytes, resolved once per process.
static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Returns the system page size in bytes, falling back to
/// [`DEFAULT_PAGE_SIZE`] when the query fails.
pub fn resolve() -> u64 {
    *PAGE_SIZE
}
