//! Address-space extent of the loadable segments.

use crate::elf::constants::PT_LOAD;
use crate::elf::ProgramHeader;
use crate::page::{page_end, page_start};

/// The page-aligned span the reservation must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadExtent {
    /// Page start of the lowest PT_LOAD `p_vaddr` (zero when there are no
    /// loadable segments).
    pub min_vaddr: usize,
    /// Page end of the highest PT_LOAD `p_vaddr + p_memsz`.
    pub max_vaddr: usize,
}

impl LoadExtent {
    /// Bytes of address space the reservation needs. Zero means there was
    /// nothing to load.
    pub fn size(&self) -> usize {
        self.max_vaddr - self.min_vaddr
    }
}

/// Scan the program header table for the extent of all PT_LOAD segments.
///
/// The segments may be non-contiguous; the extent is the hull. Ranges are
/// rounded outward to page boundaries because the reservation can only be
/// made in whole pages.
pub fn load_extent<P: ProgramHeader>(phdrs: &[P]) -> LoadExtent {
    let mut min_vaddr = u64::MAX;
    let mut max_vaddr = 0u64;
    let mut found = false;

    for phdr in phdrs {
        if phdr.p_type() != PT_LOAD {
            continue;
        }
        found = true;
        if phdr.p_vaddr() < min_vaddr {
            min_vaddr = phdr.p_vaddr();
        }
        if phdr.p_vaddr() + phdr.p_memsz() > max_vaddr {
            max_vaddr = phdr.p_vaddr() + phdr.p_memsz();
        }
    }

    if !found {
        min_vaddr = 0;
    }

    LoadExtent {
        min_vaddr: page_start(min_vaddr as usize),
        max_vaddr: page_end(max_vaddr as usize),
    }
}
