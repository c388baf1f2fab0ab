//! PE/COFF and TE image header reader.
//!
//! This library locates and parses DOS/PE/TE headers, enumerates section
//! tables, extracts debug-directory and CodeView symbol-file linkage,
//! decodes base-relocation blocks, dumps certificate directories and
//! computes the "zero list" of byte ranges that must be blanked to make
//! builds reproducible. FAT multi-architecture containers are dispatched
//! into one decoded image per embedded architecture.

pub mod directory;
mod error;
pub mod fat;
pub mod image;
mod io;
pub mod source;
pub mod zero;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use image::{ImageHeader, ImageKind, PeTeImage};
pub use source::{ByteSource, MemoryReader};
