//! TE (Terse Executable) header parsing.
//!
//! The TE header is a reduced PE32/PE32+ header carrying only the fields
//! needed for execution in the UEFI Platform Initialization architecture:
//! <https://uefi.org/specs/PI/1.8/V1_TE_Image.html#te-header>

use log::debug;

use crate::image::DataDirectory;
use crate::io::read_le_at;
use crate::Result;

/// TE signature, "VZ" little-endian.
pub const TE_MAGIC: u16 = 0x5a56;

/// Fixed TE header length in bytes.
pub const TE_HEADER_SIZE: usize = 40;

/// Decoded TE header. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct TeHeader {
    pub machine: u16,
    pub number_of_sections: u8,
    pub subsystem: u8,
    /// Bytes stripped from the original PE header when the image was
    /// converted to TE. Directory addresses still reference the unstripped
    /// layout and must be translated through [`TeHeader::header_adjust`].
    pub stripped_size: u16,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub image_base: u64,
    pub reloc_dir: DataDirectory,
    pub debug_dir: DataDirectory,
}

impl TeHeader {
    /// Decodes the fixed 40-byte TE header from `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let _signature: u16 = read_le_at(buf, &mut offset)?;
        let header = TeHeader {
            machine: read_le_at(buf, &mut offset)?,
            number_of_sections: read_le_at(buf, &mut offset)?,
            subsystem: read_le_at(buf, &mut offset)?,
            stripped_size: read_le_at(buf, &mut offset)?,
            address_of_entry_point: read_le_at(buf, &mut offset)?,
            base_of_code: read_le_at(buf, &mut offset)?,
            image_base: read_le_at(buf, &mut offset)?,
            reloc_dir: DataDirectory::parse(buf, &mut offset)?,
            debug_dir: DataDirectory::parse(buf, &mut offset)?,
        };
        debug!(
            "TE header: machine {:#06x}, {} sections, stripped {:#x}, adjust {}",
            header.machine,
            header.number_of_sections,
            header.stripped_size,
            header.header_adjust()
        );
        Ok(header)
    }

    /// Signed delta added to a directory virtual address to obtain a file
    /// offset valid in the stripped TE file. Zero when `stripped_size`
    /// equals the TE header length.
    pub fn header_adjust(&self) -> i64 {
        TE_HEADER_SIZE as i64 - i64::from(self.stripped_size)
    }
}
