//! The loaded image aggregate.

use std::os::fd::{BorrowedFd, OwnedFd};

use crate::elf::{ElfClass, NativeClass, SegmentFlags};
use crate::error::LoadError;
use crate::loader::file_window::FileWindow;
use crate::loader::protect;
use crate::loader::reader::{table_string, DynamicView};
use crate::loader::reserve::Reservation;

/// A successfully loaded shared object.
///
/// Owns the reservation holding the mapped segments, the descriptor the
/// object was read from, and any `.dynamic`/string-table windows mapped
/// before the load. Everything is released together when the image is
/// dropped; the reservation goes as a single unmap of its whole range.
#[derive(Debug)]
pub struct LoadedImage<C: ElfClass = NativeClass> {
    name: String,
    fd: OwnedFd,
    file_offset: u64,
    header: C::Header,
    reservation: Reservation,
    load_bias: isize,
    loaded_phdr: *const C::Phdr,
    phdr_num: usize,
    dynamic_window: Option<FileWindow>,
    dynamic_num: usize,
    strtab_window: Option<FileWindow>,
}

pub(crate) struct ImageParts<C: ElfClass> {
    pub name: String,
    pub fd: OwnedFd,
    pub file_offset: u64,
    pub header: C::Header,
    pub reservation: Reservation,
    pub load_bias: isize,
    pub loaded_phdr: *const C::Phdr,
    pub phdr_num: usize,
    pub dynamic_window: Option<FileWindow>,
    pub dynamic_num: usize,
    pub strtab_window: Option<FileWindow>,
}

impl<C: ElfClass> LoadedImage<C> {
    pub(crate) fn from_parts(parts: ImageParts<C>) -> Self {
        LoadedImage {
            name: parts.name,
            fd: parts.fd,
            file_offset: parts.file_offset,
            header: parts.header,
            reservation: parts.reservation,
            load_bias: parts.load_bias,
            loaded_phdr: parts.loaded_phdr,
            phdr_num: parts.phdr_num,
            dynamic_window: parts.dynamic_window,
            dynamic_num: parts.dynamic_num,
            strtab_window: parts.strtab_window,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    /// The validated ELF header, as read from the file.
    pub fn header(&self) -> C::Header {
        self.header
    }

    /// Base of the reservation; the lowest mapped address of the image.
    pub fn load_start(&self) -> usize {
        self.reservation.base()
    }

    /// Size of the reservation in bytes; always a page multiple.
    pub fn load_size(&self) -> usize {
        self.reservation.size()
    }

    /// Offset added to every `p_vaddr` to obtain a runtime address.
    pub fn load_bias(&self) -> isize {
        self.load_bias
    }

    /// The program header table as found inside a loaded segment.
    pub fn phdrs(&self) -> &[C::Phdr] {
        unsafe { core::slice::from_raw_parts(self.loaded_phdr, self.phdr_num) }
    }

    pub fn phdr_count(&self) -> usize {
        self.phdr_num
    }

    /// The `.dynamic` view, if [`read_dynamic`](crate::ElfReader::read_dynamic)
    /// ran before the load.
    pub fn dynamic(&self) -> Option<DynamicView<'_, C>> {
        let dynamic = self.dynamic_window.as_ref()?;
        let strtab = self.strtab_window.as_ref()?;
        Some(DynamicView::from_raw(
            unsafe { dynamic.as_records::<C::Dyn>(self.dynamic_num) },
            unsafe { strtab.as_records::<u8>(strtab.size()) },
        ))
    }

    /// Fetch the NUL-terminated string at `index` of the dynamic string
    /// table.
    ///
    /// Panics if the dynamic section was never read or `index` is outside
    /// the table.
    pub fn get_string(&self, index: usize) -> &str {
        let strtab = self
            .strtab_window
            .as_ref()
            .expect("dynamic string table was not read");
        table_string(unsafe { strtab.as_records::<u8>(strtab.size()) }, index)
    }

    /// Restore the file-declared protection of the non-writable segments.
    pub fn protect_segments(&self) -> Result<(), LoadError> {
        protect::protect_segments(self.phdrs(), self.load_bias)
    }

    /// Make the non-writable segments writable for relocation.
    pub fn unprotect_segments(&self) -> Result<(), LoadError> {
        protect::unprotect_segments(self.phdrs(), self.load_bias)
    }

    /// Seal the PT_GNU_RELRO ranges read-only.
    pub fn protect_relro(&self) -> Result<(), LoadError> {
        protect::protect_relro(self.phdrs(), self.load_bias)
    }

    /// Write the RELRO pages to `fd` and remap them from it.
    pub fn serialize_relro(&self, fd: BorrowedFd<'_>) -> Result<(), LoadError> {
        protect::serialize_relro(self.phdrs(), self.load_bias, fd)
    }

    /// Adopt matching RELRO pages from a file serialized by a sibling.
    pub fn map_relro(&self, fd: BorrowedFd<'_>) -> Result<(), LoadError> {
        protect::map_relro(self.phdrs(), self.load_bias, fd)
    }

    /// Runtime address and flags of the PT_DYNAMIC table, if present.
    pub fn get_dynamic_section(&self) -> Option<(*const C::Dyn, SegmentFlags)> {
        protect::dynamic_section::<C>(self.phdrs(), self.load_bias)
    }

    /// Runtime address and entry count of `.ARM.exidx`, if present.
    #[cfg(target_arch = "arm")]
    pub fn get_arm_exidx(&self) -> Option<(*const u32, usize)> {
        protect::arm_exidx(self.phdrs(), self.load_bias)
    }
}
