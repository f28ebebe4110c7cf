//! The guest syscall filter.
//!
//! Once the guest libc is placed, the loader installs a seccomp-BPF filter
//! that leaves the process alone except for syscalls issued from untrusted
//! code: a closed list of filesystem-, identity-, network- and time-related
//! syscalls traps with SIGSYS so a userspace handler can emulate them.
//!
//! The filter has two stages. Stage A allows anything from a foreign
//! architecture, from the main program's low text addresses, or from the
//! trusted loader/guest window. Stage B matches the syscall number against
//! the rule list and returns the rule's verdict, allowing by default.
//! Verdicts are only ever allow or trap; the filter never kills or errors.

pub mod bpf;

use std::ops::Range;

use bpf::{Cond, FilterBuilder, Label, Target};

use crate::elf::constants::ELF_TARGET_MACHINE;
use crate::error::LoadError;
use crate::sys;

/// Offsets into `struct seccomp_data`.
const SECCOMP_DATA_NR_OFFSET: u32 = 0;
const SECCOMP_DATA_ARCH_OFFSET: u32 = 4;
const SECCOMP_DATA_IP_OFFSET: u32 = 8;

/// Filter verdicts.
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;
pub const SECCOMP_RET_TRAP: u32 = 0x0003_0000;

const AUDIT_ARCH_64BIT: u32 = 0x8000_0000;
const AUDIT_ARCH_LE: u32 = 0x4000_0000;

/// AUDIT_ARCH value for the host, matched against `seccomp_data.arch`.
#[cfg(target_pointer_width = "64")]
pub const AUDIT_ARCH_NATIVE: u32 = ELF_TARGET_MACHINE as u32 | AUDIT_ARCH_64BIT | AUDIT_ARCH_LE;
#[cfg(target_pointer_width = "32")]
pub const AUDIT_ARCH_NATIVE: u32 = ELF_TARGET_MACHINE as u32 | AUDIT_ARCH_LE;

/// Instruction pointers below this belong to the main program's text and
/// are always allowed.
#[cfg(target_pointer_width = "64")]
const LOW_TEXT_LIMIT: u32 = 0x50_0000;
#[cfg(target_pointer_width = "32")]
const LOW_TEXT_LIMIT: u32 = 0x40_0000;

/// Verdict for one syscall number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Allow,
    Trap,
}

impl FilterAction {
    fn verdict(self) -> u32 {
        match self {
            FilterAction::Allow => SECCOMP_RET_ALLOW,
            FilterAction::Trap => SECCOMP_RET_TRAP,
        }
    }
}

/// An ordered rule list plus the trusted instruction-pointer window.
pub struct SyscallPolicy {
    trusted: Range<usize>,
    rules: Vec<(libc::c_long, FilterAction)>,
}

impl SyscallPolicy {
    pub fn new(trusted: Range<usize>, rules: Vec<(libc::c_long, FilterAction)>) -> SyscallPolicy {
        SyscallPolicy { trusted, rules }
    }

    /// The rule list the loader installs: trap the syscalls untrusted guest
    /// code must not issue directly.
    pub fn loader_default(trusted: Range<usize>) -> SyscallPolicy {
        SyscallPolicy::new(
            trusted,
            default_trapped_syscalls()
                .iter()
                .map(|&nr| (nr, FilterAction::Trap))
                .collect(),
        )
    }

    pub fn rules(&self) -> &[(libc::c_long, FilterAction)] {
        &self.rules
    }

    pub fn trusted(&self) -> &Range<usize> {
        &self.trusted
    }

    /// Lay out the filter program.
    pub fn build(&self) -> Vec<libc::sock_filter> {
        let mut b = FilterBuilder::new();

        // Stage A: gate on architecture and instruction pointer.
        let arch_ok = b.label();
        b.load_abs(SECCOMP_DATA_ARCH_OFFSET);
        b.jump(
            Cond::Eq,
            AUDIT_ARCH_NATIVE,
            Target::To(arch_ok),
            Target::Next,
        );
        b.ret(SECCOMP_RET_ALLOW);
        b.bind(arch_ok);

        let filter_syscalls = b.label();
        self.emit_ip_gate(&mut b, filter_syscalls);

        // Stage B: match the syscall number against the rules.
        b.bind(filter_syscalls);
        b.load_abs(SECCOMP_DATA_NR_OFFSET);
        for (nr, action) in &self.rules {
            let next_rule = b.label();
            b.jump(Cond::Eq, *nr as u32, Target::Next, Target::To(next_rule));
            b.ret(action.verdict());
            b.bind(next_rule);
        }
        b.ret(SECCOMP_RET_ALLOW);

        b.finish()
    }

    /// Allow low text addresses and the trusted window. BPF compares 32-bit
    /// words, so on 64-bit hosts each bound is a high-word compare with a
    /// low-word tiebreak.
    #[cfg(target_pointer_width = "64")]
    fn emit_ip_gate(&self, b: &mut FilterBuilder, filter_syscalls: Label) {
        let ip_lo = SECCOMP_DATA_IP_OFFSET;
        let ip_hi = SECCOMP_DATA_IP_OFFSET + 4;
        let (start_hi, start_lo) = split_words(self.trusted.start as u64);
        let (end_hi, end_lo) = split_words(self.trusted.end as u64);

        let high_half = b.label();
        let not_low = b.label();
        b.load_abs(ip_hi);
        b.jump(Cond::Eq, 0, Target::Next, Target::To(high_half));
        b.load_abs(ip_lo);
        b.jump(Cond::Ge, LOW_TEXT_LIMIT, Target::To(not_low), Target::Next);
        b.ret(SECCOMP_RET_ALLOW);
        b.bind(not_low);
        b.bind(high_half);

        let check_end = b.label();
        let inside = b.label();
        b.load_abs(ip_hi);
        b.jump(Cond::Gt, start_hi, Target::To(check_end), Target::Next);
        b.jump(
            Cond::Ge,
            start_hi,
            Target::Next,
            Target::To(filter_syscalls),
        );
        b.load_abs(ip_lo);
        b.jump(
            Cond::Ge,
            start_lo,
            Target::To(check_end),
            Target::To(filter_syscalls),
        );
        b.bind(check_end);
        b.load_abs(ip_hi);
        b.jump(Cond::Gt, end_hi, Target::To(filter_syscalls), Target::Next);
        b.jump(Cond::Ge, end_hi, Target::Next, Target::To(inside));
        b.load_abs(ip_lo);
        b.jump(Cond::Ge, end_lo, Target::To(filter_syscalls), Target::Next);
        b.bind(inside);
        b.ret(SECCOMP_RET_ALLOW);
    }

    #[cfg(target_pointer_width = "32")]
    fn emit_ip_gate(&self, b: &mut FilterBuilder, filter_syscalls: Label) {
        let not_low = b.label();
        b.load_abs(SECCOMP_DATA_IP_OFFSET);
        b.jump(Cond::Ge, LOW_TEXT_LIMIT, Target::To(not_low), Target::Next);
        b.ret(SECCOMP_RET_ALLOW);
        b.bind(not_low);
        b.jump(
            Cond::Ge,
            self.trusted.start as u32,
            Target::Next,
            Target::To(filter_syscalls),
        );
        b.jump(
            Cond::Ge,
            self.trusted.end as u32,
            Target::To(filter_syscalls),
            Target::Next,
        );
        b.ret(SECCOMP_RET_ALLOW);
    }
}

#[cfg(target_pointer_width = "64")]
fn split_words(value: u64) -> (u32, u32) {
    ((value >> 32) as u32, value as u32)
}

/// Install `policy` on the calling process.
///
/// Requires `no_new_privs` or CAP_SYS_ADMIN, like any seccomp filter.
/// Installation happens once per process, triggered by the load that places
/// the guest libc; a failure here is fatal to the caller because the guest
/// window would otherwise run unguarded.
pub fn install(policy: &SyscallPolicy) -> Result<(), LoadError> {
    let prog = policy.build();
    let fprog = libc::sock_fprog {
        len: prog.len() as libc::c_ushort,
        filter: prog.as_ptr() as *mut libc::sock_filter,
    };
    let rc = unsafe {
        libc::prctl(
            libc::PR_SET_SECCOMP,
            libc::SECCOMP_MODE_FILTER,
            &fprog as *const libc::sock_fprog,
        )
    };
    if rc != 0 {
        return Err(LoadError::SeccompInstallFailed { errno: sys::errno() });
    }
    Ok(())
}

/// Syscalls untrusted guest code must not issue directly.
#[cfg(target_pointer_width = "64")]
fn default_trapped_syscalls() -> &'static [libc::c_long] {
    &[
        libc::SYS_openat,
        libc::SYS_readlinkat,
        libc::SYS_faccessat,
        libc::SYS_unlinkat,
        libc::SYS_connect,
        libc::SYS_execve,
        libc::SYS_inotify_add_watch,
        libc::SYS_mkdirat,
        libc::SYS_getdents64,
        libc::SYS_ptrace,
        libc::SYS_clock_settime,
        libc::SYS_clock_gettime,
        libc::SYS_gettimeofday,
        libc::SYS_settimeofday,
        libc::SYS_newfstatat,
        libc::SYS_getuid,
        libc::SYS_getgid,
        libc::SYS_geteuid,
        libc::SYS_getegid,
        libc::SYS_getresuid,
        libc::SYS_getresgid,
    ]
}

/// On 32-bit ARM the legacy non-`at` variants and the `*32` identity
/// syscalls are reachable too.
#[cfg(all(target_pointer_width = "32", target_arch = "arm"))]
fn default_trapped_syscalls() -> &'static [libc::c_long] {
    &[
        libc::SYS_openat,
        libc::SYS_readlinkat,
        libc::SYS_faccessat,
        libc::SYS_unlinkat,
        libc::SYS_connect,
        libc::SYS_execve,
        libc::SYS_inotify_add_watch,
        libc::SYS_mkdirat,
        libc::SYS_getdents64,
        libc::SYS_ptrace,
        libc::SYS_clock_settime,
        libc::SYS_clock_gettime,
        libc::SYS_gettimeofday,
        libc::SYS_settimeofday,
        libc::SYS_open,
        libc::SYS_readlink,
        libc::SYS_access,
        libc::SYS_fstat,
        libc::SYS_fstat64,
        libc::SYS_statfs64,
        libc::SYS_uname,
        libc::SYS_ioprio_set,
        libc::SYS_sysinfo,
        libc::SYS_socket,
        libc::SYS_ioctl,
        libc::SYS_prctl,
        libc::SYS_getuid32,
        libc::SYS_getgid32,
        libc::SYS_geteuid32,
        libc::SYS_getegid32,
        libc::SYS_getresuid32,
        libc::SYS_getresgid32,
        libc::SYS_fstatat64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpf::{BPF_ABS, BPF_K, BPF_LD, BPF_RET, BPF_W};

    fn policy() -> SyscallPolicy {
        SyscallPolicy::loader_default(0x7a1e_f000_0000..0x7a1e_f050_0000)
    }

    #[test]
    fn program_opens_with_the_arch_load() {
        let prog = policy().build();
        assert_eq!(prog[0].code, BPF_LD | BPF_W | BPF_ABS);
        assert_eq!(prog[0].k, SECCOMP_DATA_ARCH_OFFSET);
    }

    #[test]
    fn program_defaults_to_allow() {
        let prog = policy().build();
        let last = prog.last().unwrap();
        assert_eq!(last.code, BPF_RET | BPF_K);
        assert_eq!(last.k, SECCOMP_RET_ALLOW);
    }

    #[test]
    fn every_rule_gets_one_trap_return() {
        let policy = policy();
        let prog = policy.build();
        let traps = prog
            .iter()
            .filter(|i| i.code == BPF_RET | BPF_K && i.k == SECCOMP_RET_TRAP)
            .count();
        assert_eq!(traps, policy.rules().len());
    }

    #[test]
    fn every_trapped_syscall_number_is_compared() {
        let policy = policy();
        let prog = policy.build();
        for (nr, _) in policy.rules() {
            assert!(
                prog.iter()
                    .any(|i| i.code == bpf::BPF_JMP | bpf::BPF_JEQ | BPF_K && i.k == *nr as u32),
                "syscall {nr} missing from the program"
            );
        }
    }

    #[test]
    fn verdicts_are_only_allow_or_trap() {
        let prog = policy().build();
        for insn in prog.iter().filter(|i| i.code == BPF_RET | BPF_K) {
            assert!(insn.k == SECCOMP_RET_ALLOW || insn.k == SECCOMP_RET_TRAP);
        }
    }

    #[test]
    fn branch_targets_stay_inside_the_program() {
        let prog = policy().build();
        for (at, insn) in prog.iter().enumerate() {
            if insn.code & 0x07 == bpf::BPF_JMP {
                assert!(at + 1 + (insn.jt as usize) < prog.len());
                assert!(at + 1 + (insn.jf as usize) < prog.len());
            }
        }
    }
}
