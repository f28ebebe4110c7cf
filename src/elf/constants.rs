//! ELF constants used by the loader.

/// ELF magic number: 0x7F 'E' 'L' 'F'.
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Index of the class byte in `e_ident`.
pub const EI_CLASS: usize = 4;

/// Index of the data-encoding byte in `e_ident`.
pub const EI_DATA: usize = 5;

/// Index of the version byte in `e_ident`.
pub const EI_VERSION: usize = 6;

/// ELF class: 32-bit.
pub const ELFCLASS32: u8 = 1;

/// ELF class: 64-bit.
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little endian.
pub const ELFDATA2LSB: u8 = 1;

/// Current ELF version.
pub const EV_CURRENT: u32 = 1;

/// ELF type: executable.
pub const ET_EXEC: u16 = 2;

/// ELF type: shared object.
pub const ET_DYN: u16 = 3;

/// Machine type: x86_64.
pub const EM_X86_64: u16 = 62;

/// Machine type: 32-bit ARM.
pub const EM_ARM: u16 = 40;

/// Machine type: AArch64.
pub const EM_AARCH64: u16 = 183;

/// Machine type: RISC-V.
pub const EM_RISCV: u16 = 243;

/// The `e_machine` value acceptable on this host.
#[cfg(target_arch = "x86_64")]
pub const ELF_TARGET_MACHINE: u16 = EM_X86_64;
#[cfg(target_arch = "aarch64")]
pub const ELF_TARGET_MACHINE: u16 = EM_AARCH64;
#[cfg(target_arch = "arm")]
pub const ELF_TARGET_MACHINE: u16 = EM_ARM;
#[cfg(target_arch = "riscv64")]
pub const ELF_TARGET_MACHINE: u16 = EM_RISCV;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

/// Program header type: dynamic linking info.
pub const PT_DYNAMIC: u32 = 2;

/// Program header type: program header table.
pub const PT_PHDR: u32 = 6;

/// Program header type: post-relocation read-only region.
pub const PT_GNU_RELRO: u32 = 0x6474_e552;

/// Program header type: ARM exception index table.
pub const PT_ARM_EXIDX: u32 = 0x7000_0001;

/// Section header type: string table.
pub const SHT_STRTAB: u32 = 3;

/// Section header type: dynamic linking info.
pub const SHT_DYNAMIC: u32 = 6;

/// Like the kernel, the loader only accepts program header tables smaller
/// than 64 KiB.
pub const MAX_PHDR_TABLE_BYTES: usize = 65536;
