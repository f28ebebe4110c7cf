//! ELF record types and the class capability.
//!
//! The loader is parametric over [`ElfClass`], whose two implementations
//! ([`Elf32`], [`Elf64`]) fix the concrete header, program-header,
//! section-header and dynamic-entry record types. Code that walks tables is
//! written against the accessor traits ([`ElfHeader`], [`ProgramHeader`],
//! [`SectionHeader`]), which widen every field to `u64` so the same page
//! math serves both classes.
//!
//! Records are `repr(C, packed)` so a table mapped straight from a file can
//! be viewed as a slice regardless of how the table happens to be aligned
//! within its page.

use bitflags::bitflags;

use super::constants::{ELFCLASS32, ELFCLASS64};

bitflags! {
    /// Segment permission bits from `p_flags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        /// Segment is executable.
        const EXEC = 0x1;
        /// Segment is writable.
        const WRITE = 0x2;
        /// Segment is readable.
        const READ = 0x4;
    }
}

impl SegmentFlags {
    /// Translate to the mmap/mprotect `PROT_*` encoding.
    pub fn to_prot(self) -> libc::c_int {
        let mut prot = 0;
        if self.contains(SegmentFlags::READ) {
            prot |= libc::PROT_READ;
        }
        if self.contains(SegmentFlags::WRITE) {
            prot |= libc::PROT_WRITE;
        }
        if self.contains(SegmentFlags::EXEC) {
            prot |= libc::PROT_EXEC;
        }
        prot
    }
}

/// Field access over either class's ELF header.
pub trait ElfHeader: Copy + 'static {
    fn ident(&self) -> [u8; 16];
    fn e_type(&self) -> u16;
    fn e_machine(&self) -> u16;
    fn e_version(&self) -> u32;
    fn e_phoff(&self) -> u64;
    fn e_phnum(&self) -> u16;
    fn e_shoff(&self) -> u64;
    fn e_shnum(&self) -> u16;
}

/// Field access over either class's program header.
pub trait ProgramHeader: Copy + 'static {
    fn p_type(&self) -> u32;
    fn p_flags(&self) -> SegmentFlags;
    fn p_offset(&self) -> u64;
    fn p_vaddr(&self) -> u64;
    fn p_filesz(&self) -> u64;
    fn p_memsz(&self) -> u64;
}

/// Field access over either class's section header.
pub trait SectionHeader: Copy + 'static {
    fn sh_type(&self) -> u32;
    fn sh_link(&self) -> u32;
    fn sh_offset(&self) -> u64;
    fn sh_size(&self) -> u64;
}

/// Capability fixing the record widths of one ELF class.
pub trait ElfClass: Copy + Send + Sync + 'static {
    /// Value the `e_ident` class byte must hold.
    const CLASS: u8;
    type Header: ElfHeader;
    type Phdr: ProgramHeader;
    type Shdr: SectionHeader;
    type Dyn: Copy + 'static;
}

/// The 64-bit ELF class.
#[derive(Debug, Clone, Copy)]
pub struct Elf64;

/// The 32-bit ELF class.
#[derive(Debug, Clone, Copy)]
pub struct Elf32;

impl ElfClass for Elf64 {
    const CLASS: u8 = ELFCLASS64;
    type Header = Elf64Header;
    type Phdr = Elf64ProgramHeader;
    type Shdr = Elf64SectionHeader;
    type Dyn = Elf64Dyn;
}

impl ElfClass for Elf32 {
    const CLASS: u8 = ELFCLASS32;
    type Header = Elf32Header;
    type Phdr = Elf32ProgramHeader;
    type Shdr = Elf32SectionHeader;
    type Dyn = Elf32Dyn;
}

/// The class matching the host word size. The public loader surface is
/// fixed to this; the class byte check in header validation is what rejects
/// the other class.
#[cfg(target_pointer_width = "64")]
pub type NativeClass = Elf64;
#[cfg(target_pointer_width = "32")]
pub type NativeClass = Elf32;

/// ELF64 file header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF64 program header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

/// ELF64 section header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u64,
    pub sh_addr: u64,
    pub sh_offset: u64,
    pub sh_size: u64,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u64,
    pub sh_entsize: u64,
}

/// ELF64 dynamic table entry.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf64Dyn {
    pub d_tag: i64,
    pub d_val: u64,
}

/// ELF32 file header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32Header {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u32,
    pub e_phoff: u32,
    pub e_shoff: u32,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// ELF32 program header. Note the different field order from ELF64:
/// `p_flags` trails the record in this class.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32ProgramHeader {
    pub p_type: u32,
    pub p_offset: u32,
    pub p_vaddr: u32,
    pub p_paddr: u32,
    pub p_filesz: u32,
    pub p_memsz: u32,
    pub p_flags: u32,
    pub p_align: u32,
}

/// ELF32 section header.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32SectionHeader {
    pub sh_name: u32,
    pub sh_type: u32,
    pub sh_flags: u32,
    pub sh_addr: u32,
    pub sh_offset: u32,
    pub sh_size: u32,
    pub sh_link: u32,
    pub sh_info: u32,
    pub sh_addralign: u32,
    pub sh_entsize: u32,
}

/// ELF32 dynamic table entry.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub struct Elf32Dyn {
    pub d_tag: i32,
    pub d_val: u32,
}

impl ElfHeader for Elf64Header {
    fn ident(&self) -> [u8; 16] {
        self.e_ident
    }
    fn e_type(&self) -> u16 {
        self.e_type
    }
    fn e_machine(&self) -> u16 {
        self.e_machine
    }
    fn e_version(&self) -> u32 {
        self.e_version
    }
    fn e_phoff(&self) -> u64 {
        self.e_phoff
    }
    fn e_phnum(&self) -> u16 {
        self.e_phnum
    }
    fn e_shoff(&self) -> u64 {
        self.e_shoff
    }
    fn e_shnum(&self) -> u16 {
        self.e_shnum
    }
}

impl ElfHeader for Elf32Header {
    fn ident(&self) -> [u8; 16] {
        self.e_ident
    }
    fn e_type(&self) -> u16 {
        self.e_type
    }
    fn e_machine(&self) -> u16 {
        self.e_machine
    }
    fn e_version(&self) -> u32 {
        self.e_version
    }
    fn e_phoff(&self) -> u64 {
        self.e_phoff as u64
    }
    fn e_phnum(&self) -> u16 {
        self.e_phnum
    }
    fn e_shoff(&self) -> u64 {
        self.e_shoff as u64
    }
    fn e_shnum(&self) -> u16 {
        self.e_shnum
    }
}

impl ProgramHeader for Elf64ProgramHeader {
    fn p_type(&self) -> u32 {
        self.p_type
    }
    fn p_flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }
    fn p_offset(&self) -> u64 {
        self.p_offset
    }
    fn p_vaddr(&self) -> u64 {
        self.p_vaddr
    }
    fn p_filesz(&self) -> u64 {
        self.p_filesz
    }
    fn p_memsz(&self) -> u64 {
        self.p_memsz
    }
}

impl ProgramHeader for Elf32ProgramHeader {
    fn p_type(&self) -> u32 {
        self.p_type
    }
    fn p_flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.p_flags)
    }
    fn p_offset(&self) -> u64 {
        self.p_offset as u64
    }
    fn p_vaddr(&self) -> u64 {
        self.p_vaddr as u64
    }
    fn p_filesz(&self) -> u64 {
        self.p_filesz as u64
    }
    fn p_memsz(&self) -> u64 {
        self.p_memsz as u64
    }
}

impl SectionHeader for Elf64SectionHeader {
    fn sh_type(&self) -> u32 {
        self.sh_type
    }
    fn sh_link(&self) -> u32 {
        self.sh_link
    }
    fn sh_offset(&self) -> u64 {
        self.sh_offset
    }
    fn sh_size(&self) -> u64 {
        self.sh_size
    }
}

impl SectionHeader for Elf32SectionHeader {
    fn sh_type(&self) -> u32 {
        self.sh_type
    }
    fn sh_link(&self) -> u32 {
        self.sh_link
    }
    fn sh_offset(&self) -> u64 {
        self.sh_offset as u64
    }
    fn sh_size(&self) -> u64 {
        self.sh_size as u64
    }
}
