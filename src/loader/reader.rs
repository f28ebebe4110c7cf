//! Reading and validating a shared object, and the load sequence.
//!
//! [`ElfReader`] drives the whole core pipeline: header read and
//! validation, program header table mapping, the optional `.dynamic`
//! discovery through section headers, address-space reservation, segment
//! mapping, and finally locating the program header table inside the loaded
//! segments. On success everything the collaborators need is handed over as
//! a [`LoadedImage`].

use core::mem::{size_of, MaybeUninit};
use std::os::fd::{AsRawFd, OwnedFd};

use crate::context::LoaderContext;
use crate::elf::constants::{
    ELFDATA2LSB, ELF_MAGIC, ELF_TARGET_MACHINE, ET_DYN, EV_CURRENT, EI_CLASS, EI_DATA,
    MAX_PHDR_TABLE_BYTES, PT_LOAD, PT_PHDR, SHT_DYNAMIC, SHT_STRTAB,
};
use crate::elf::{ElfClass, ElfHeader, NativeClass, ProgramHeader, SectionHeader};
use crate::error::LoadError;
use crate::loader::biased;
use crate::loader::file_window::FileWindow;
use crate::loader::image::{ImageParts, LoadedImage};
use crate::loader::layout;
use crate::loader::reserve::{self, ReservationPolicy};
use crate::loader::segments;
use crate::seccomp::{self, SyscallPolicy};
use crate::sys;

/// Reader over a shared object embedded in `fd` at `file_offset`.
///
/// The reader owns the descriptor and every temporary window it maps; a
/// successful [`load`](ElfReader::load) transfers both into the returned
/// image, and a failure drops them all on the way out.
pub struct ElfReader<C: ElfClass = NativeClass> {
    name: String,
    fd: OwnedFd,
    file_offset: u64,
    header: Option<C::Header>,
    dynamic_window: Option<FileWindow>,
    dynamic_num: usize,
    strtab_window: Option<FileWindow>,
}

/// Borrowed view over the `.dynamic` table and its string table.
#[derive(Clone, Copy, Debug)]
pub struct DynamicView<'a, C: ElfClass> {
    entries: &'a [C::Dyn],
    strtab: &'a [u8],
}

impl<'a, C: ElfClass> DynamicView<'a, C> {
    pub(crate) fn from_raw(entries: &'a [C::Dyn], strtab: &'a [u8]) -> Self {
        DynamicView { entries, strtab }
    }

    pub fn entries(&self) -> &'a [C::Dyn] {
        self.entries
    }

    pub fn strtab_size(&self) -> usize {
        self.strtab.len()
    }

    /// Fetch the NUL-terminated string at `index`.
    ///
    /// Panics if `index` is outside the string table.
    pub fn get_string(&self, index: usize) -> &'a str {
        table_string(self.strtab, index)
    }
}

pub(crate) fn table_string(strtab: &[u8], index: usize) -> &str {
    assert!(
        index < strtab.len(),
        "string table index {index} out of range ({} bytes)",
        strtab.len()
    );
    let tail = &strtab[index..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    core::str::from_utf8(&tail[..end]).expect("string table entry is not UTF-8")
}

impl<C: ElfClass> ElfReader<C> {
    pub fn new(name: impl Into<String>, fd: OwnedFd, file_offset: u64) -> Self {
        ElfReader {
            name: name.into(),
            fd,
            file_offset,
            header: None,
            dynamic_window: None,
            dynamic_num: 0,
            strtab_window: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the full load sequence under `policy`.
    ///
    /// On failure every partial mapping is released and one diagnostic line
    /// naming the image is logged.
    pub fn load(
        mut self,
        ctx: &mut LoaderContext<'_>,
        policy: &ReservationPolicy,
    ) -> Result<LoadedImage<C>, LoadError> {
        match self.load_inner(ctx, policy) {
            Ok(parts) => Ok(self.into_image(parts)),
            Err(err) => {
                log::error!("\"{}\" {}", self.name, err);
                Err(err)
            }
        }
    }

    /// Locate `.dynamic` through the section headers and map it together
    /// with its string table.
    ///
    /// Independent of [`load`](ElfReader::load); an object with no section
    /// headers reports the dynamic section as unavailable.
    pub fn read_dynamic(&mut self) -> Result<DynamicView<'_, C>, LoadError> {
        if let Err(err) = self.read_dynamic_inner() {
            log::error!("\"{}\" {}", self.name, err);
            return Err(err);
        }
        Ok(self.dynamic_view())
    }

    fn load_inner(
        &mut self,
        ctx: &mut LoaderContext<'_>,
        policy: &ReservationPolicy,
    ) -> Result<Loaded<C>, LoadError> {
        let header = self.ensure_header()?;

        // The table read here is a temporary, private window over the file;
        // the image keeps only the copy found inside a loaded segment.
        let (phdr_window, phdr_num) = self.map_phdr_table(&header)?;
        let phdrs: &[C::Phdr] = unsafe { phdr_window.as_records(phdr_num) };

        let extent = layout::load_extent(phdrs);
        let reserved = reserve::reserve_address_space(extent, policy, ctx)?;
        if reserved.sealed_trusted_region {
            let filter = SyscallPolicy::loader_default(ctx.registry().trusted_range());
            if let Err(err) = seccomp::install(&filter) {
                // Continuing without the filter would leave the guest
                // window unguarded.
                log::error!("\"{}\" {}", self.name, err);
                std::process::abort();
            }
        }

        let load_bias = reserved.reservation.base().wrapping_sub(extent.min_vaddr) as isize;

        segments::map_segments(self.fd.as_raw_fd(), self.file_offset, phdrs, load_bias)?;

        let loaded_phdr = find_loaded_phdr::<C>(phdrs, load_bias)?;

        log::debug!(
            "\"{}\" loaded at {:#x} (bias {load_bias:#x}, {} bytes)",
            self.name,
            reserved.reservation.base(),
            reserved.reservation.size(),
        );

        Ok(Loaded {
            header,
            reservation: reserved.reservation,
            load_bias,
            loaded_phdr,
            phdr_num,
        })
    }

    fn into_image(self, loaded: Loaded<C>) -> LoadedImage<C> {
        LoadedImage::from_parts(ImageParts {
            name: self.name,
            fd: self.fd,
            file_offset: self.file_offset,
            header: loaded.header,
            reservation: loaded.reservation,
            load_bias: loaded.load_bias,
            loaded_phdr: loaded.loaded_phdr,
            phdr_num: loaded.phdr_num,
            dynamic_window: self.dynamic_window,
            dynamic_num: self.dynamic_num,
            strtab_window: self.strtab_window,
        })
    }

    /// Read and validate the ELF header, caching it for later steps.
    fn ensure_header(&mut self) -> Result<C::Header, LoadError> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        let mut header = MaybeUninit::<C::Header>::uninit();
        let expected = size_of::<C::Header>();
        let got = sys::pread(
            self.fd.as_raw_fd(),
            header.as_mut_ptr().cast(),
            expected,
            self.file_offset,
        )?;
        if got != expected {
            return Err(LoadError::ShortRead { expected, got });
        }
        let header = unsafe { header.assume_init() };

        verify_header::<C>(&header)?;
        self.header = Some(header);
        Ok(header)
    }

    /// Map the page range covering the program header table.
    fn map_phdr_table(&self, header: &C::Header) -> Result<(FileWindow, usize), LoadError> {
        let phdr_num = header.e_phnum() as usize;

        // Like the kernel, only accept program header tables smaller than
        // 64 KiB.
        if phdr_num < 1 || phdr_num > MAX_PHDR_TABLE_BYTES / size_of::<C::Phdr>() {
            return Err(LoadError::BadPhdrCount { n: phdr_num });
        }

        let window = FileWindow::map(
            self.fd.as_raw_fd(),
            self.file_offset,
            header.e_phoff(),
            phdr_num * size_of::<C::Phdr>(),
        )?;
        Ok((window, phdr_num))
    }

    fn read_dynamic_inner(&mut self) -> Result<(), LoadError> {
        if self.dynamic_window.is_some() {
            return Ok(());
        }
        let header = self.ensure_header()?;

        let shdr_num = header.e_shnum() as usize;
        if shdr_num == 0 {
            return Err(LoadError::NoDynamic);
        }

        let shdr_window = FileWindow::map(
            self.fd.as_raw_fd(),
            self.file_offset,
            header.e_shoff(),
            shdr_num * size_of::<C::Shdr>(),
        )?;
        let shdrs: &[C::Shdr] = unsafe { shdr_window.as_records(shdr_num) };

        let dynamic_shdr = shdrs
            .iter()
            .find(|s| s.sh_type() == SHT_DYNAMIC)
            .ok_or(LoadError::NoDynamic)?;

        let link = dynamic_shdr.sh_link();
        if link as usize >= shdr_num {
            return Err(LoadError::BadDynamicLink { link });
        }
        let strtab_shdr = &shdrs[link as usize];
        if strtab_shdr.sh_type() != SHT_STRTAB {
            return Err(LoadError::BadStrtabType {
                got: strtab_shdr.sh_type(),
            });
        }

        let (dynamic_offset, dynamic_size) = (dynamic_shdr.sh_offset(), dynamic_shdr.sh_size());
        let (strtab_offset, strtab_size) = (strtab_shdr.sh_offset(), strtab_shdr.sh_size());
        drop(shdr_window);

        self.dynamic_window = Some(FileWindow::map(
            self.fd.as_raw_fd(),
            self.file_offset,
            dynamic_offset,
            dynamic_size as usize,
        )?);
        self.dynamic_num = dynamic_size as usize / size_of::<C::Dyn>();
        self.strtab_window = Some(FileWindow::map(
            self.fd.as_raw_fd(),
            self.file_offset,
            strtab_offset,
            strtab_size as usize,
        )?);
        Ok(())
    }

    fn dynamic_view(&self) -> DynamicView<'_, C> {
        let (entries, strtab) = match (&self.dynamic_window, &self.strtab_window) {
            (Some(dynamic), Some(strtab)) => (
                unsafe { dynamic.as_records::<C::Dyn>(self.dynamic_num) },
                unsafe { strtab.as_records::<u8>(strtab.size()) },
            ),
            _ => (&[][..], &[][..]),
        };
        DynamicView { entries, strtab }
    }
}

/// The six header checks, in order, each with its own diagnostic.
fn verify_header<C: ElfClass>(header: &C::Header) -> Result<(), LoadError> {
    let ident = header.ident();

    if ident[..4] != ELF_MAGIC {
        return Err(LoadError::BadMagic);
    }
    if ident[EI_CLASS] != C::CLASS {
        return Err(LoadError::BadClass {
            got: ident[EI_CLASS],
        });
    }
    if ident[EI_DATA] != ELFDATA2LSB {
        return Err(LoadError::BadEndianness {
            got: ident[EI_DATA],
        });
    }
    if header.e_type() != ET_DYN {
        return Err(LoadError::BadType {
            got: header.e_type(),
        });
    }
    if header.e_version() != EV_CURRENT {
        return Err(LoadError::BadVersion {
            got: header.e_version(),
        });
    }
    if header.e_machine() != ELF_TARGET_MACHINE {
        return Err(LoadError::BadMachine {
            got: header.e_machine(),
        });
    }
    Ok(())
}

struct Loaded<C: ElfClass> {
    header: C::Header,
    reservation: reserve::Reservation,
    load_bias: isize,
    loaded_phdr: *const C::Phdr,
    phdr_num: usize,
}

/// Find the program header table inside the loaded segments.
///
/// Prefer an explicit PT_PHDR; otherwise, if the first PT_LOAD maps file
/// offset zero, the in-memory ELF header leads to it. Either way the
/// candidate must land wholly inside the file-backed part of some PT_LOAD
/// segment — phdrs placed in bss are rejected.
fn find_loaded_phdr<C: ElfClass>(
    phdrs: &[C::Phdr],
    bias: isize,
) -> Result<*const C::Phdr, LoadError> {
    for phdr in phdrs {
        if phdr.p_type() == PT_PHDR {
            return check_loaded_phdr::<C>(biased(phdr.p_vaddr(), bias), phdrs, bias);
        }
    }

    for phdr in phdrs {
        if phdr.p_type() == PT_LOAD {
            if phdr.p_offset() == 0 {
                let elf_addr = biased(phdr.p_vaddr(), bias);
                let header = unsafe { core::ptr::read_unaligned(elf_addr as *const C::Header) };
                return check_loaded_phdr::<C>(
                    elf_addr + header.e_phoff() as usize,
                    phdrs,
                    bias,
                );
            }
            break;
        }
    }

    Err(LoadError::PhdrNotLocatable)
}

fn check_loaded_phdr<C: ElfClass>(
    candidate: usize,
    phdrs: &[C::Phdr],
    bias: isize,
) -> Result<*const C::Phdr, LoadError> {
    let candidate_end = candidate + phdrs.len() * size_of::<C::Phdr>();
    for phdr in phdrs {
        if phdr.p_type() != PT_LOAD {
            continue;
        }
        let seg_start = biased(phdr.p_vaddr(), bias);
        let seg_end = seg_start + phdr.p_filesz() as usize;
        if seg_start <= candidate && candidate_end <= seg_end {
            return Ok(candidate as *const C::Phdr);
        }
    }
    Err(LoadError::PhdrNotLocatable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::types::{Elf64, Elf64Header};

    fn valid_header() -> Elf64Header {
        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(&ELF_MAGIC);
        ident[EI_CLASS] = C64;
        ident[EI_DATA] = ELFDATA2LSB;
        ident[crate::elf::constants::EI_VERSION] = 1;
        Elf64Header {
            e_ident: ident,
            e_type: ET_DYN,
            e_machine: ELF_TARGET_MACHINE,
            e_version: EV_CURRENT,
            e_entry: 0,
            e_phoff: 64,
            e_shoff: 0,
            e_flags: 0,
            e_ehsize: 64,
            e_phentsize: 56,
            e_phnum: 1,
            e_shentsize: 64,
            e_shnum: 0,
            e_shstrndx: 0,
        }
    }

    const C64: u8 = crate::elf::constants::ELFCLASS64;

    #[test]
    fn valid_header_passes_all_checks() {
        assert!(verify_header::<Elf64>(&valid_header()).is_ok());
    }

    #[test]
    fn bad_magic_is_the_first_rejection() {
        let mut header = valid_header();
        header.e_ident[0] = 0;
        // Even with everything else broken too, magic wins.
        header.e_type = 0;
        assert!(matches!(
            verify_header::<Elf64>(&header),
            Err(LoadError::BadMagic)
        ));
    }

    #[test]
    fn foreign_class_is_reported_with_its_width() {
        let mut header = valid_header();
        header.e_ident[EI_CLASS] = crate::elf::constants::ELFCLASS32;
        match verify_header::<Elf64>(&header) {
            Err(LoadError::BadClass { got }) => {
                assert_eq!(got, crate::elf::constants::ELFCLASS32)
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn big_endian_objects_are_rejected() {
        let mut header = valid_header();
        header.e_ident[EI_DATA] = 2;
        assert!(matches!(
            verify_header::<Elf64>(&header),
            Err(LoadError::BadEndianness { got: 2 })
        ));
    }

    #[test]
    fn executables_are_rejected() {
        let mut header = valid_header();
        header.e_type = crate::elf::constants::ET_EXEC;
        assert!(matches!(
            verify_header::<Elf64>(&header),
            Err(LoadError::BadType { got: 2 })
        ));
    }

    #[test]
    fn stale_version_is_rejected() {
        let mut header = valid_header();
        header.e_version = 0;
        assert!(matches!(
            verify_header::<Elf64>(&header),
            Err(LoadError::BadVersion { got: 0 })
        ));
    }

    #[test]
    fn foreign_machine_is_rejected() {
        let mut header = valid_header();
        header.e_machine = 0xFFFF;
        assert!(matches!(
            verify_header::<Elf64>(&header),
            Err(LoadError::BadMachine { got: 0xFFFF })
        ));
    }

    #[test]
    fn string_table_lookup_stops_at_nul() {
        let strtab = b"\0libtest.so\0more\0";
        assert_eq!(table_string(strtab, 1), "libtest.so");
        assert_eq!(table_string(strtab, 12), "more");
        assert_eq!(table_string(strtab, 0), "");
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn string_table_lookup_panics_past_the_end() {
        table_string(b"abc\0", 4);
    }
}
