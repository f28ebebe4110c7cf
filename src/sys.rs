//! Thin syscall wrappers.
//!
//! All raw `libc` calls the loader performs go through here, so errno
//! capture and EINTR retry live in exactly one place. Mapping-family
//! wrappers return the raw errno and let callers pick the error variant;
//! everything else returns [`LoadError`] directly.

use std::os::fd::RawFd;

use crate::error::LoadError;

pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Positional read, retried on EINTR. Returns the byte count from the one
/// successful call; short reads are the caller's concern.
pub(crate) fn pread(fd: RawFd, buf: *mut u8, len: usize, offset: u64) -> Result<usize, LoadError> {
    loop {
        let rc = unsafe { libc::pread64(fd, buf.cast(), len, offset as libc::off64_t) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        if errno() != libc::EINTR {
            return Err(LoadError::Io {
                op: "pread64",
                errno: errno(),
            });
        }
    }
}

/// Write `len` bytes starting at `addr`, retried on EINTR. A short write is
/// an error: the RELRO serialization protocol needs the file offsets to
/// advance in exact page-range strides.
///
/// # Safety
///
/// `addr..addr + len` must be readable memory.
pub(crate) unsafe fn write_all(fd: RawFd, addr: usize, len: usize) -> Result<(), LoadError> {
    let written = loop {
        let rc = libc::write(fd, addr as *const libc::c_void, len);
        if rc >= 0 {
            break rc as usize;
        }
        if errno() != libc::EINTR {
            return Err(LoadError::Io {
                op: "write",
                errno: errno(),
            });
        }
    };
    if written != len {
        return Err(LoadError::Io {
            op: "write",
            errno: errno(),
        });
    }
    Ok(())
}

/// `mmap64`, reporting failure as the raw errno.
///
/// # Safety
///
/// With `MAP_FIXED` this replaces whatever was mapped at `addr`; the caller
/// must own that range.
pub(crate) unsafe fn mmap(
    addr: usize,
    len: usize,
    prot: libc::c_int,
    flags: libc::c_int,
    fd: RawFd,
    offset: u64,
) -> Result<usize, i32> {
    let ptr = libc::mmap64(
        addr as *mut libc::c_void,
        len,
        prot,
        flags,
        fd,
        offset as libc::off64_t,
    );
    if ptr == libc::MAP_FAILED {
        Err(errno())
    } else {
        Ok(ptr as usize)
    }
}

/// `munmap`. Release is best-effort: there is nothing useful a caller can do
/// with an unmap failure during teardown.
///
/// # Safety
///
/// The range must be a mapping owned by the caller.
pub(crate) unsafe fn munmap(addr: usize, len: usize) {
    if libc::munmap(addr as *mut libc::c_void, len) != 0 {
        log::debug!("munmap of {len:#x} bytes at {addr:#x} failed (errno {})", errno());
    }
}

/// `mprotect`, reporting failure as the raw errno.
///
/// # Safety
///
/// The range must be mapped and owned by the caller.
pub(crate) unsafe fn mprotect(addr: usize, len: usize, prot: libc::c_int) -> Result<(), i32> {
    if libc::mprotect(addr as *mut libc::c_void, len, prot) != 0 {
        Err(errno())
    } else {
        Ok(())
    }
}

/// Size of the file behind `fd`, via `fstat` (EINTR-retried).
pub(crate) fn fstat_size(fd: RawFd) -> Result<u64, LoadError> {
    loop {
        let mut st = std::mem::MaybeUninit::<libc::stat>::uninit();
        let rc = unsafe { libc::fstat(fd, st.as_mut_ptr()) };
        if rc == 0 {
            return Ok(unsafe { st.assume_init() }.st_size as u64);
        }
        if errno() != libc::EINTR {
            return Err(LoadError::Io {
                op: "fstat",
                errno: errno(),
            });
        }
    }
}
