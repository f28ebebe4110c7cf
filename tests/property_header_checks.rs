//! Property: header validation
//!
//! For any single corruption of an identity field, the load fails with the
//! diagnostic for exactly that field, and truncated files report how many
//! bytes were actually found.

#![cfg(target_pointer_width = "64")]

mod common;

use proptest::prelude::*;

use common::{build_object_with, memfd_with, Segment};
use soloader::elf::constants::{ELFCLASS64, ELF_TARGET_MACHINE, ET_DYN, PT_LOAD};
use soloader::{ElfReader, LinkerMaps, LoadError, LoaderContext, ReservationPolicy};

fn corrupted_object(patch: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let segments = [Segment {
        p_type: PT_LOAD,
        flags: 4,
        offset: 0,
        vaddr: 0,
        filesz: 0x1000,
        memsz: 0x1000,
    }];
    build_object_with(&segments, 0x1000, patch)
}

fn load_bytes(bytes: &[u8]) -> Result<(), LoadError> {
    let mut maps = LinkerMaps::bootstrap_defaults();
    let mut ctx = LoaderContext::new(&mut maps);
    ElfReader::<soloader::Elf64>::new("libcheck.so", memfd_with(bytes), 0)
        .load(&mut ctx, &ReservationPolicy::None)
        .map(|_| ())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any corruption of the four magic bytes is caught first.
    #[test]
    fn corrupt_magic_is_rejected(index in 0usize..4, byte in 0u8..=255) {
        let reference = corrupted_object(|_| {});
        prop_assume!(byte != reference[index]);
        let bytes = corrupted_object(|elf| elf[index] = byte);
        prop_assert!(matches!(load_bytes(&bytes), Err(LoadError::BadMagic)));
    }

    /// Every class byte other than the host's is rejected as a class
    /// mismatch carrying the offending byte.
    #[test]
    fn foreign_class_is_rejected(class in 0u8..=255) {
        prop_assume!(class != ELFCLASS64);
        let bytes = corrupted_object(|elf| elf[4] = class);
        match load_bytes(&bytes) {
            Err(LoadError::BadClass { got }) => prop_assert_eq!(got, class),
            other => prop_assert!(false, "unexpected result: {:?}", other.err()),
        }
    }

    /// Anything but little-endian data encoding is rejected.
    #[test]
    fn non_little_endian_is_rejected(encoding in 0u8..=255) {
        prop_assume!(encoding != 1);
        let bytes = corrupted_object(|elf| elf[5] = encoding);
        let matched = matches!(
            load_bytes(&bytes),
            Err(LoadError::BadEndianness { got }) if got == encoding
        );
        prop_assert!(matched);
    }

    /// Only ET_DYN objects load.
    #[test]
    fn non_shared_objects_are_rejected(e_type in 0u16..=0xffff) {
        prop_assume!(e_type != ET_DYN);
        let bytes = corrupted_object(|elf| {
            elf[16..18].copy_from_slice(&e_type.to_le_bytes());
        });
        let matched = matches!(
            load_bytes(&bytes),
            Err(LoadError::BadType { got }) if got == e_type
        );
        prop_assert!(matched);
    }

    /// Only the current ELF version loads.
    #[test]
    fn stale_versions_are_rejected(version in 0u32..=0xffff) {
        prop_assume!(version != 1);
        let bytes = corrupted_object(|elf| {
            elf[20..24].copy_from_slice(&version.to_le_bytes());
        });
        let matched = matches!(
            load_bytes(&bytes),
            Err(LoadError::BadVersion { got }) if got == version
        );
        prop_assert!(matched);
    }

    /// Only the host machine loads.
    #[test]
    fn foreign_machines_are_rejected(machine in 0u16..=0xffff) {
        prop_assume!(machine != ELF_TARGET_MACHINE);
        let bytes = corrupted_object(|elf| {
            elf[18..20].copy_from_slice(&machine.to_le_bytes());
        });
        let matched = matches!(
            load_bytes(&bytes),
            Err(LoadError::BadMachine { got }) if got == machine
        );
        prop_assert!(matched);
    }

    /// A file shorter than the header reports the observed byte count.
    #[test]
    fn truncated_headers_report_the_short_read(len in 0usize..64) {
        let full = corrupted_object(|_| {});
        let bytes = &full[..len];
        let matched = matches!(
            load_bytes(bytes),
            Err(LoadError::ShortRead { expected: 64, got }) if got == len
        );
        prop_assert!(matched);
    }
}
