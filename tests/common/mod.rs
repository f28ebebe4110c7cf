//! Shared helpers: build a synthetic ET_DYN object and serve it from a
//! memfd, so the tests drive the real mapping pipeline without shipping
//! binary fixtures.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::{FromRawFd, OwnedFd};

use soloader::elf::constants::{
    ELFCLASS64, ELFDATA2LSB, ELF_MAGIC, ELF_TARGET_MACHINE, ET_DYN,
};

pub const EHDR_SIZE: usize = 64;
pub const PHDR_SIZE: usize = 56;
pub const PHOFF: usize = 0x40;

/// One program header entry for [`build_object`].
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

/// Deterministic file content, so tests can check what got mapped where.
pub fn pattern_byte(offset: usize) -> u8 {
    (offset % 251) as u8
}

/// Assemble a shared object: ELF header at 0, program header table at
/// [`PHOFF`], pattern bytes everywhere else up to `file_size`.
pub fn build_object(segments: &[Segment], file_size: usize) -> Vec<u8> {
    build_object_with(segments, file_size, |_| {})
}

/// Same as [`build_object`] but lets the caller patch the header bytes
/// before the program headers are counted in.
pub fn build_object_with(
    segments: &[Segment],
    file_size: usize,
    patch: impl FnOnce(&mut Vec<u8>),
) -> Vec<u8> {
    let mut elf: Vec<u8> = (0..file_size).map(pattern_byte).collect();

    // ELF header
    elf[..4].copy_from_slice(&ELF_MAGIC);
    elf[4] = ELFCLASS64;
    elf[5] = ELFDATA2LSB;
    elf[6] = 1; // EI_VERSION
    elf[7..16].fill(0);
    elf[16..18].copy_from_slice(&ET_DYN.to_le_bytes());
    elf[18..20].copy_from_slice(&ELF_TARGET_MACHINE.to_le_bytes());
    elf[20..24].copy_from_slice(&1u32.to_le_bytes()); // e_version
    elf[24..32].copy_from_slice(&0u64.to_le_bytes()); // e_entry
    elf[32..40].copy_from_slice(&(PHOFF as u64).to_le_bytes()); // e_phoff
    elf[40..48].copy_from_slice(&0u64.to_le_bytes()); // e_shoff
    elf[48..52].copy_from_slice(&0u32.to_le_bytes()); // e_flags
    elf[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    elf[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
    elf[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());
    elf[58..60].copy_from_slice(&64u16.to_le_bytes()); // e_shentsize
    elf[60..62].copy_from_slice(&0u16.to_le_bytes()); // e_shnum
    elf[62..64].copy_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    for (i, seg) in segments.iter().enumerate() {
        let at = PHOFF + i * PHDR_SIZE;
        elf[at..at + 4].copy_from_slice(&seg.p_type.to_le_bytes());
        elf[at + 4..at + 8].copy_from_slice(&seg.flags.to_le_bytes());
        elf[at + 8..at + 16].copy_from_slice(&seg.offset.to_le_bytes());
        elf[at + 16..at + 24].copy_from_slice(&seg.vaddr.to_le_bytes());
        elf[at + 24..at + 32].copy_from_slice(&seg.vaddr.to_le_bytes()); // p_paddr
        elf[at + 32..at + 40].copy_from_slice(&seg.filesz.to_le_bytes());
        elf[at + 40..at + 48].copy_from_slice(&seg.memsz.to_le_bytes());
        elf[at + 48..at + 56].copy_from_slice(&0x1000u64.to_le_bytes()); // p_align
    }

    patch(&mut elf);
    elf
}

/// Put `bytes` into an anonymous in-memory file with the given name. The
/// name shows up in `/proc/self/maps`, which lets tests tell the loaded
/// object apart from a RELRO serialization file.
pub fn memfd_named(name: &str, bytes: &[u8]) -> OwnedFd {
    let cname = std::ffi::CString::new(name).expect("memfd name");
    let raw = unsafe { libc::memfd_create(cname.as_ptr(), 0) };
    assert!(raw >= 0, "memfd_create failed");
    let mut file = unsafe { File::from_raw_fd(raw) };
    file.write_all(bytes).expect("fill memfd");
    file.seek(SeekFrom::Start(0)).expect("rewind memfd");
    OwnedFd::from(file)
}

/// Put `bytes` into an anonymous in-memory file.
pub fn memfd_with(bytes: &[u8]) -> OwnedFd {
    memfd_named("soloader-object", bytes)
}

/// Read the image's memory at `vaddr + bias`.
///
/// Only valid for ranges the load mapped readable.
pub unsafe fn image_bytes(bias: isize, vaddr: usize, len: usize) -> &'static [u8] {
    core::slice::from_raw_parts(vaddr.wrapping_add(bias as usize) as *const u8, len)
}
