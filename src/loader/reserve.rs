//! Address-space reservation.
//!
//! Before any segment is mapped, the loader reserves the whole load extent
//! as one anonymous `PROT_NONE` mapping. Later `MAP_FIXED` segment mappings
//! then cannot collide with anything else in the process, and teardown is a
//! single unmap of the reservation.

use crate::context::LoaderContext;
use crate::error::LoadError;
use crate::loader::layout::LoadExtent;
use crate::sys;

/// Placement request for the reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationPolicy {
    /// Let the kernel choose.
    None,
    /// Prefer `addr` if the caller's planned `size` fits, otherwise let the
    /// kernel choose. Never fails on size.
    Hint { addr: usize, size: usize },
    /// Load into address space the caller has already reserved at `addr`.
    /// Fails if the caller's reservation is too small.
    Fixed { addr: usize, size: usize },
    /// Place by the well-known table: a name ending in `libc.so` is the
    /// guest libc and prefers the registry's slot for it.
    WellKnownName(String),
}

/// An owned span of reserved address space. Unmapped as a whole on drop.
#[derive(Debug)]
pub struct Reservation {
    base: usize,
    size: usize,
}

impl Reservation {
    /// Anonymous `PROT_NONE` reservation of `size` bytes, optionally hinted.
    /// A zero `hint` leaves placement to the kernel; a non-zero hint is
    /// advisory and the kernel may place the mapping elsewhere.
    fn reserve(hint: usize, size: usize) -> Result<Reservation, LoadError> {
        let base = unsafe {
            sys::mmap(
                hint,
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        }
        .map_err(|errno| LoadError::Io { op: "mmap", errno })?;
        Ok(Reservation { base, size })
    }

    /// Take ownership of a span the caller reserved.
    fn adopt(base: usize, size: usize) -> Reservation {
        Reservation { base, size }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        unsafe { sys::munmap(self.base, self.size) };
    }
}

/// Outcome of a reservation: the owned span, plus whether this call placed
/// the guest libc and sealed the trusted region (in which case the caller
/// must install the syscall filter before proceeding).
#[derive(Debug)]
pub(crate) struct Reserved {
    pub reservation: Reservation,
    pub sealed_trusted_region: bool,
}

/// Reserve address space for `extent` according to `policy`.
pub(crate) fn reserve_address_space(
    extent: LoadExtent,
    policy: &ReservationPolicy,
    ctx: &mut LoaderContext<'_>,
) -> Result<Reserved, LoadError> {
    let load_size = extent.size();
    if load_size == 0 {
        return Err(LoadError::NoLoadable);
    }

    let mut sealed = false;
    let reservation = match policy {
        ReservationPolicy::None => Reservation::reserve(0, load_size)?,
        ReservationPolicy::Hint { addr, size } => {
            let hint = if *size >= load_size { *addr } else { 0 };
            Reservation::reserve(hint, load_size)?
        }
        ReservationPolicy::Fixed { addr, size } => {
            if *size < load_size {
                return Err(LoadError::ReservationTooSmall {
                    have: *size,
                    need: load_size,
                });
            }
            Reservation::adopt(*addr, load_size)
        }
        ReservationPolicy::WellKnownName(name) => {
            let is_guest_libc = name.ends_with("libc.so");
            let hint = if is_guest_libc {
                ctx.registry().guest_libc_addr
            } else {
                0
            };
            let reservation = Reservation::reserve(hint, load_size)?;
            if is_guest_libc {
                sealed = ctx
                    .registry_mut()
                    .place_guest_libc(reservation.base(), load_size);
            }
            reservation
        }
    };

    Ok(Reserved {
        reservation,
        sealed_trusted_region: sealed,
    })
}
