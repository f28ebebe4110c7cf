//! Protection management for loaded segments.
//!
//! Two families of operations over a loaded image's program header table:
//!
//! - flipping the non-writable PT_LOAD ranges between their file-declared
//!   protection and a writable variant, bracketing relocation;
//! - PT_GNU_RELRO handling: sealing the ranges read-only after relocation,
//!   and the serialize/map pair that lets sibling processes share relocated
//!   RELRO pages through a common file.
//!
//! Also home to the small program-header queries (PT_DYNAMIC, PT_ARM_EXIDX)
//! the relocation collaborator needs.

use std::os::fd::{AsRawFd, BorrowedFd};

use crate::elf::constants::{PT_DYNAMIC, PT_GNU_RELRO, PT_LOAD};
use crate::elf::{ElfClass, ProgramHeader, SegmentFlags};
use crate::error::LoadError;
use crate::loader::biased;
use crate::page::{page_end, page_start, PAGE_SIZE};
use crate::sys;

/// Page range a segment touches, biased into the load placement.
fn segment_page_range<P: ProgramHeader>(phdr: &P, bias: isize) -> (usize, usize) {
    let start = page_start(phdr.p_vaddr() as usize);
    let end = page_end((phdr.p_vaddr() + phdr.p_memsz()) as usize);
    (biased(start as u64, bias), biased(end as u64, bias))
}

fn set_load_prot<P: ProgramHeader>(
    phdrs: &[P],
    bias: isize,
    extra_prot: libc::c_int,
) -> Result<(), LoadError> {
    for phdr in phdrs {
        if phdr.p_type() != PT_LOAD || phdr.p_flags().contains(SegmentFlags::WRITE) {
            continue;
        }
        let (start, end) = segment_page_range(phdr, bias);
        unsafe { sys::mprotect(start, end - start, phdr.p_flags().to_prot() | extra_prot) }
            .map_err(|errno| LoadError::Io {
                op: "mprotect",
                errno,
            })?;
    }
    Ok(())
}

/// Restore the file-declared protection of all non-writable PT_LOAD
/// segments. Call after relocations are applied.
pub fn protect_segments<P: ProgramHeader>(phdrs: &[P], bias: isize) -> Result<(), LoadError> {
    set_load_prot(phdrs, bias, 0)
}

/// Make all non-writable PT_LOAD segments writable so relocations can be
/// applied. Pair with [`protect_segments`].
pub fn unprotect_segments<P: ProgramHeader>(phdrs: &[P], bias: isize) -> Result<(), LoadError> {
    set_load_prot(phdrs, bias, libc::PROT_WRITE)
}

/// Seal every PT_GNU_RELRO range read-only. Must run after relocation.
///
/// A RELRO range need not start or end on a page boundary; every page it
/// touches is sealed, which over-protects the partial pages. Link editors
/// only emit RELRO ranges for which this is correct.
pub fn protect_relro<P: ProgramHeader>(phdrs: &[P], bias: isize) -> Result<(), LoadError> {
    for phdr in phdrs {
        if phdr.p_type() != PT_GNU_RELRO {
            continue;
        }
        let (start, end) = segment_page_range(phdr, bias);
        unsafe { sys::mprotect(start, end - start, libc::PROT_READ) }.map_err(|errno| {
            LoadError::Io {
                op: "mprotect",
                errno,
            }
        })?;
    }
    Ok(())
}

/// Write the relocated RELRO page ranges to `fd`, in table order, remapping
/// each range read-only from the file as it is written.
///
/// After success the process's RELRO pages are file-backed, and a sibling
/// process that loaded the same object at the same address can share them
/// through [`map_relro`]. The file offset advances by each range's size.
pub fn serialize_relro<P: ProgramHeader>(
    phdrs: &[P],
    bias: isize,
    fd: BorrowedFd<'_>,
) -> Result<(), LoadError> {
    let mut file_offset = 0u64;
    for phdr in phdrs {
        if phdr.p_type() != PT_GNU_RELRO {
            continue;
        }
        let (start, end) = segment_page_range(phdr, bias);
        let size = end - start;

        unsafe { sys::write_all(fd.as_raw_fd(), start, size) }?;
        unsafe {
            sys::mmap(
                start,
                size,
                libc::PROT_READ,
                libc::MAP_PRIVATE | libc::MAP_FIXED,
                fd.as_raw_fd(),
                file_offset,
            )
        }
        .map_err(|errno| LoadError::Io { op: "mmap", errno })?;
        file_offset += size as u64;
    }
    Ok(())
}

/// Temporary whole-file mapping used by [`map_relro`] for comparison.
/// Always unmapped, including on the error paths.
struct TempMapping {
    base: usize,
    size: usize,
}

impl Drop for TempMapping {
    fn drop(&mut self) {
        if self.size > 0 {
            unsafe { sys::munmap(self.base, self.size) };
        }
    }
}

/// Replace RELRO pages with mappings of `fd` where the contents match.
///
/// `fd` must hold what [`serialize_relro`] wrote in a sibling process. Pages
/// are compared before being mapped over: relocations that depend on other
/// libraries' placement can differ between processes, and those pages must
/// stay private. Each maximal run of equal pages becomes one file mapping.
/// If the file is shorter than the current range, that range and the rest
/// are left untouched.
pub fn map_relro<P: ProgramHeader>(
    phdrs: &[P],
    bias: isize,
    fd: BorrowedFd<'_>,
) -> Result<(), LoadError> {
    let file_size = sys::fstat_size(fd.as_raw_fd())? as usize;
    let temp = if file_size > 0 {
        let base = unsafe {
            sys::mmap(
                0,
                file_size,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                fd.as_raw_fd(),
                0,
            )
        }
        .map_err(|errno| LoadError::Io { op: "mmap", errno })?;
        TempMapping {
            base,
            size: file_size,
        }
    } else {
        TempMapping { base: 0, size: 0 }
    };

    let mut file_offset = 0usize;
    for phdr in phdrs {
        if phdr.p_type() != PT_GNU_RELRO {
            continue;
        }
        let (start, end) = segment_page_range(phdr, bias);
        let size = end - start;

        if file_size < file_offset + size {
            // File too short to compare against this range; it was probably
            // serialized from a different version of the object.
            break;
        }

        let mem = start as *const u8;
        let file = (temp.base + file_offset) as *const u8;
        let mut match_offset = 0usize;
        while match_offset < size {
            // Skip dissimilar pages.
            while match_offset < size && !pages_equal(mem, file, match_offset) {
                match_offset += PAGE_SIZE;
            }
            // Count similar pages.
            let mut mismatch_offset = match_offset;
            while mismatch_offset < size && pages_equal(mem, file, mismatch_offset) {
                mismatch_offset += PAGE_SIZE;
            }
            // Map over similar pages.
            if mismatch_offset > match_offset {
                unsafe {
                    sys::mmap(
                        start + match_offset,
                        mismatch_offset - match_offset,
                        libc::PROT_READ,
                        libc::MAP_PRIVATE | libc::MAP_FIXED,
                        fd.as_raw_fd(),
                        (file_offset + match_offset) as u64,
                    )
                }
                .map_err(|errno| LoadError::Io { op: "mmap", errno })?;
            }
            match_offset = mismatch_offset;
        }

        file_offset += size;
    }
    Ok(())
}

fn pages_equal(mem: *const u8, file: *const u8, offset: usize) -> bool {
    let a = unsafe { core::slice::from_raw_parts(mem.add(offset), PAGE_SIZE) };
    let b = unsafe { core::slice::from_raw_parts(file.add(offset), PAGE_SIZE) };
    a == b
}

/// Address and flags of the PT_DYNAMIC table in memory, if present.
pub fn dynamic_section<C: ElfClass>(
    phdrs: &[C::Phdr],
    bias: isize,
) -> Option<(*const C::Dyn, SegmentFlags)> {
    phdrs.iter().find(|p| p.p_type() == PT_DYNAMIC).map(|p| {
        (
            biased(p.p_vaddr(), bias) as *const C::Dyn,
            p.p_flags(),
        )
    })
}

/// Address and entry count of the `.ARM.exidx` table in memory, if present.
/// Entries are 8-byte pairs.
#[cfg(target_arch = "arm")]
pub fn arm_exidx<P: ProgramHeader>(phdrs: &[P], bias: isize) -> Option<(*const u32, usize)> {
    use crate::elf::constants::PT_ARM_EXIDX;
    phdrs
        .iter()
        .find(|p| p.p_type() == PT_ARM_EXIDX)
        .map(|p| {
            (
                biased(p.p_vaddr(), bias) as *const u32,
                (p.p_memsz() / 8) as usize,
            )
        })
}
