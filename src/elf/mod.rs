//! ELF object format definitions.
//!
//! Raw header, program-header, section-header and dynamic-entry records for
//! both ELF classes, plus the [`ElfClass`] capability that fixes the record
//! types the loader machinery is generic over.
//!
//! Only the little-endian, host-class subset the loader accepts is modelled;
//! there is no general-purpose ELF reflection here.

pub mod constants;
pub mod types;

pub use types::{
    Elf32, Elf64, ElfClass, ElfHeader, NativeClass, ProgramHeader, SectionHeader, SegmentFlags,
};
