//! Read-only private mappings of file sub-ranges.

use std::os::fd::RawFd;

use crate::error::LoadError;
use crate::page::page_offset;
use crate::sys;

/// A read-only `MAP_PRIVATE` view of a byte range of a file.
///
/// Requests need not be page-aligned: the window maps the enclosing page
/// range and exposes the requested sub-range. The raw pair records what the
/// OS actually holds, the user pair what the caller asked for, with
/// `raw_ptr <= user_ptr` and `user_ptr + user_size <= raw_ptr + raw_size`.
/// The raw range is unmapped on drop.
#[derive(Debug)]
pub struct FileWindow {
    raw_ptr: usize,
    raw_size: usize,
    user_ptr: usize,
    user_size: usize,
}

impl FileWindow {
    /// Map `size` bytes of `fd` starting at `base_offset + offset`.
    ///
    /// `base_offset` is the position of the embedded object within the file
    /// (zero for a plain `.so`); `offset` is relative to the object.
    pub fn map(
        fd: RawFd,
        base_offset: u64,
        offset: u64,
        size: usize,
    ) -> Result<FileWindow, LoadError> {
        let abs = base_offset + offset;
        let in_page = page_offset(abs as usize);
        let raw_size = size + in_page;
        let file_page_start = abs - in_page as u64;
        let raw_ptr = unsafe {
            sys::mmap(
                0,
                raw_size,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                fd,
                file_page_start,
            )
        }
        .map_err(|errno| LoadError::Io { op: "mmap", errno })?;

        Ok(FileWindow {
            raw_ptr,
            raw_size,
            user_ptr: raw_ptr + in_page,
            user_size: size,
        })
    }

    /// Start of the requested range.
    pub fn data(&self) -> *const u8 {
        self.user_ptr as *const u8
    }

    /// Length of the requested range.
    pub fn size(&self) -> usize {
        self.user_size
    }

    /// View the window as a slice of `count` records of type `T`.
    ///
    /// # Safety
    ///
    /// `T` must be a `repr(C, packed)` record type valid for any bit
    /// pattern, and `count * size_of::<T>()` must not exceed the window.
    pub unsafe fn as_records<T>(&self, count: usize) -> &[T] {
        debug_assert!(count * core::mem::size_of::<T>() <= self.user_size);
        core::slice::from_raw_parts(self.user_ptr as *const T, count)
    }
}

impl Drop for FileWindow {
    fn drop(&mut self) {
        unsafe { sys::munmap(self.raw_ptr, self.raw_size) };
    }
}
