//! Load error taxonomy.
//!
//! Every failure the core can produce, as a closed set. Display strings are
//! the human-readable reasons; the top-level entry points prefix them with
//! the quoted image name to form the single diagnostic line for a failed
//! load.

use crate::elf::constants::{ELFCLASS32, ELFCLASS64};

/// Word size of the host, as it appears in class-mismatch diagnostics.
#[cfg(target_pointer_width = "64")]
const HOST_BITS: u32 = 64;
#[cfg(target_pointer_width = "32")]
const HOST_BITS: u32 = 32;

/// All errors produced by the loader core.
///
/// Variants fall into three groups:
/// - **I/O failures**: a syscall failed or returned short.
/// - **Format rejections**: the file is not an acceptable shared object.
/// - **Placement failures**: the address-space work could not be done.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    // ── I/O failures ─────────────────────────────────────────────────

    #[error("{op} failed (errno {errno})")]
    Io { op: &'static str, errno: i32 },

    #[error("is too small to be an ELF shared object: only found {got} bytes (expected {expected})")]
    ShortRead { expected: usize, got: usize },

    // ── Format rejections ────────────────────────────────────────────

    #[error("has bad ELF magic")]
    BadMagic,

    #[error("{}", class_reason(.got))]
    BadClass { got: u8 },

    #[error("not little-endian: {got}")]
    BadEndianness { got: u8 },

    #[error("has unexpected e_type: {got}")]
    BadType { got: u16 },

    #[error("has unexpected e_version: {got}")]
    BadVersion { got: u32 },

    #[error("has unexpected e_machine: {got}")]
    BadMachine { got: u16 },

    #[error("has invalid e_phnum: {n}")]
    BadPhdrCount { n: usize },

    #[error("has no loadable segments")]
    NoLoadable,

    #[error("loaded phdr not contained in a loadable segment")]
    PhdrNotLocatable,

    #[error("dynamic section unavailable")]
    NoDynamic,

    #[error(".dynamic section has invalid sh_link: {link}")]
    BadDynamicLink { link: u32 },

    #[error(".dynamic sh_link names a section of type {got} (expected SHT_STRTAB)")]
    BadStrtabType { got: u32 },

    // ── Placement failures ───────────────────────────────────────────

    #[error("reserved address space {have} smaller than {need} bytes needed")]
    ReservationTooSmall { have: usize, need: usize },

    #[error("couldn't map segment {segment_index} (errno {errno})")]
    MapFailed { segment_index: usize, errno: i32 },

    #[error("seccomp filter installation failed (errno {errno})")]
    SeccompInstallFailed { errno: i32 },
}

fn class_reason(got: &u8) -> String {
    match *got {
        ELFCLASS32 if HOST_BITS == 64 => "is 32-bit instead of 64-bit".to_string(),
        ELFCLASS64 if HOST_BITS == 32 => "is 64-bit instead of 32-bit".to_string(),
        other => format!("has unknown ELF class: {other}"),
    }
}
