//! EFI fat (multi-architecture) binary containers.
//!
//! A fat binary embeds one image per architecture behind a small table of
//! entries. A malformed slice is fatal for that slice only; callers decode
//! each entry independently so siblings keep working.

use log::debug;

use crate::image::PeTeImage;
use crate::io::read_le_at;
use crate::source::ByteSource;
use crate::{Error, Result};

/// EFI fat binary magic, little-endian on disk.
pub const FAT_MAGIC: u32 = 0x0ef1_fab9;

/// Fixed size of one architecture entry.
pub const FAT_ARCH_ENTRY_SIZE: usize = 20;

const CPU_TYPE_I386: u32 = 0x0000_0007;
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM: u32 = 0x0000_000c;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// Describes one embedded architecture-specific image.
#[derive(Debug, Clone, Copy)]
pub struct FatArchEntry {
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub offset: u32,
    pub size: u32,
    pub align: u32,
}

impl FatArchEntry {
    fn parse(buf: &[u8]) -> Result<Self> {
        let mut offset = 0;
        Ok(FatArchEntry {
            cpu_type: read_le_at(buf, &mut offset)?,
            cpu_subtype: read_le_at(buf, &mut offset)?,
            offset: read_le_at(buf, &mut offset)?,
            size: read_le_at(buf, &mut offset)?,
            align: read_le_at(buf, &mut offset)?,
        })
    }

    /// Human-readable architecture label. Unknown cpu types render as
    /// "Unknown" without failing.
    pub fn label(&self) -> &'static str {
        match self.cpu_type {
            CPU_TYPE_I386 => "IA32",
            CPU_TYPE_X86_64 => "X64",
            CPU_TYPE_ARM => "ARM",
            CPU_TYPE_ARM64 => "AArch64",
            _ => "Unknown",
        }
    }
}

/// Reads the container's architecture table.
///
/// Returns `None` when the input does not start with the fat magic (the
/// whole input is then a single non-FAT image); a matching magic followed
/// by an unreadable table is [`Error::Malformed`].
pub fn arch_entries(source: &mut ByteSource<'_>) -> Result<Option<Vec<FatArchEntry>>> {
    let prefix = match source.read_at(0, 8) {
        Ok(prefix) => prefix,
        Err(Error::Truncated { .. }) => return Ok(None),
        Err(err) => return Err(err),
    };

    let mut pos = 0;
    let magic: u32 = read_le_at(&prefix, &mut pos)?;
    if magic != FAT_MAGIC {
        return Ok(None);
    }
    let count: u32 = read_le_at(&prefix, &mut pos)?;
    debug!("fat container with {count} architectures");

    let mut entries = Vec::with_capacity(count.min(64) as usize);
    for index in 0..count {
        let buf = source.read(FAT_ARCH_ENTRY_SIZE).map_err(|_| {
            Error::Malformed(format!(
                "fat container declares {count} architectures but entry {index} is truncated"
            ))
        })?;
        entries.push(FatArchEntry::parse(&buf)?);
    }
    Ok(Some(entries))
}

/// Reads exactly `arch.size` bytes at `arch.offset` and decodes a header
/// over that slice.
pub fn slice_image(source: &mut ByteSource<'_>, arch: &FatArchEntry) -> Result<PeTeImage<'static>> {
    let data = source.read_at(u64::from(arch.offset), arch.size as usize)?;
    PeTeImage::parse(data.into())
}
