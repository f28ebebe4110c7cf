//! Mapping PT_LOAD segments into the reservation.
//!
//! Segment content is mapped straight from the file; the writable tail of
//! the last file-backed page is zeroed in place, and any remaining pages up
//! to `p_memsz` come from a fresh anonymous mapping. All mappings are
//! `MAP_FIXED` inside the reservation, so a later segment sharing a page
//! with an earlier one simply replaces that page's mapping — the page ends
//! up with the later segment's protection.

use std::os::fd::RawFd;

use crate::elf::constants::PT_LOAD;
use crate::elf::{ProgramHeader, SegmentFlags};
use crate::error::LoadError;
use crate::loader::biased;
use crate::page::{page_end, page_offset, page_start, PAGE_SIZE};
use crate::sys;

/// Map every PT_LOAD segment of `phdrs` at `bias`.
///
/// The caller must hold a reservation covering the whole load extent; each
/// mapping here lands inside it. On error the partially mapped segments are
/// torn down with the reservation itself.
pub(crate) fn map_segments<P: ProgramHeader>(
    fd: RawFd,
    file_offset: u64,
    phdrs: &[P],
    bias: isize,
) -> Result<(), LoadError> {
    for (index, phdr) in phdrs.iter().enumerate() {
        if phdr.p_type() != PT_LOAD {
            continue;
        }

        let seg_start = biased(phdr.p_vaddr(), bias);
        let seg_end = seg_start + phdr.p_memsz() as usize;
        let seg_page_start = page_start(seg_start);
        let seg_page_end = page_end(seg_end);
        let seg_file_end = seg_start + phdr.p_filesz() as usize;

        let prot = phdr.p_flags().to_prot();

        if phdr.p_filesz() != 0 {
            let file_start = phdr.p_offset() as usize;
            let file_end = file_start + phdr.p_filesz() as usize;
            let file_page_start = page_start(file_start);

            unsafe {
                sys::mmap(
                    seg_page_start,
                    file_end - file_page_start,
                    prot,
                    libc::MAP_FIXED | libc::MAP_PRIVATE,
                    fd,
                    file_offset + file_page_start as u64,
                )
            }
            .map_err(|errno| LoadError::MapFailed {
                segment_index: index,
                errno,
            })?;

            // The rest of the last file-backed page must read as zero, but
            // the file mapping filled it with whatever follows the segment
            // in the file. Only writable segments can carry bss, and only
            // they permit the stores.
            if phdr.p_flags().contains(SegmentFlags::WRITE) && page_offset(seg_file_end) > 0 {
                unsafe {
                    core::ptr::write_bytes(
                        seg_file_end as *mut u8,
                        0,
                        PAGE_SIZE - page_offset(seg_file_end),
                    );
                }
            }
        }

        // Pages past the file content are plain anonymous zero pages with
        // the segment's protection.
        let zero_page_start = page_end(seg_file_end);
        if seg_page_end > zero_page_start {
            unsafe {
                sys::mmap(
                    zero_page_start,
                    seg_page_end - zero_page_start,
                    prot,
                    libc::MAP_FIXED | libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                    -1,
                    0,
                )
            }
            .map_err(|errno| LoadError::MapFailed {
                segment_index: index,
                errno,
            })?;
        }
    }
    Ok(())
}
