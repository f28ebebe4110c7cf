//! The load pipeline.
//!
//! This module takes a validated shared object from file descriptor to
//! mapped image:
//!
//! 1. Header read and validation (`reader`)
//! 2. Program header table mapping (`reader`, through `file_window`)
//! 3. Load extent computation (`layout`)
//! 4. Address-space reservation (`reserve`)
//! 5. Segment mapping (`segments`)
//! 6. Locating the in-segment program header table (`reader`)
//!
//! Protection changes around relocation, including the RELRO sharing
//! protocol, live in `protect` and operate on the finished image.

pub mod file_window;
pub mod image;
pub mod layout;
pub mod protect;
pub mod reader;
pub mod reserve;
pub mod segments;

pub use file_window::FileWindow;
pub use image::LoadedImage;
pub use layout::{load_extent, LoadExtent};
pub use reader::{DynamicView, ElfReader};
pub use reserve::{Reservation, ReservationPolicy};

/// Apply the load bias to a virtual address from the file.
///
/// The bias is the difference between where the first segment's page landed
/// and where the file asked for it; it can be negative, so the addition
/// wraps through two's complement.
pub(crate) fn biased(vaddr: u64, bias: isize) -> usize {
    (vaddr as usize).wrapping_add(bias as usize)
}
