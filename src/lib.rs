//! Core of a userspace dynamic ELF loader.
//!
//! This crate takes a file descriptor open on a position-independent shared
//! object and maps its loadable contents into the calling process, leaving
//! an image ready for the relocation and symbol-resolution stages:
//!
//! - header, program-header and section-header reading with strict
//!   validation ([`ElfReader`]);
//! - a single anonymous `PROT_NONE` reservation covering the load extent,
//!   placed per [`ReservationPolicy`], with `MAP_FIXED` per-segment
//!   mappings, tail zeroing and anonymous bss inside it;
//! - protection management around relocation, including PT_GNU_RELRO
//!   sealing and the serialize/map protocol that shares relocated RELRO
//!   pages between sibling processes ([`LoadedImage`]);
//! - the seccomp filter guarding the guest libc window, installed once per
//!   process when the well-known `libc.so` image is placed ([`seccomp`]).
//!
//! Out of scope: symbol lookup, relocation application, dependency
//! traversal, TLS, constructors, and any `dlopen`-style entry point. Those
//! collaborators drive this crate through [`ElfReader::load`] and the
//! accessors on [`LoadedImage`].
//!
//! Process-wide state (the well-known placement table and the one-shot
//! filter installation) is reached through a [`LoaderContext`]; callers are
//! expected to serialise loads, as dynamic linkers do.
//!
//! Only little-endian, host-class `ET_DYN` objects are accepted. Linux
//! only.

pub mod context;
pub mod elf;
pub mod error;
pub mod loader;
pub mod page;
pub mod seccomp;

pub(crate) mod sys;

pub use context::{LinkerMaps, LoaderContext, LINKER_MAPS_ADDR};
pub use elf::{Elf32, Elf64, ElfClass, NativeClass, SegmentFlags};
pub use error::LoadError;
pub use loader::{
    DynamicView, ElfReader, FileWindow, LoadExtent, LoadedImage, Reservation, ReservationPolicy,
};
pub use seccomp::{FilterAction, SyscallPolicy};
