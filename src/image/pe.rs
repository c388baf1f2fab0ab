//! PE32 / PE32+ header parsing.

use crate::image::DataDirectory;
use crate::io::read_le_at;
use crate::{Error, Result};

/// MS-DOS signature, "MZ" little-endian.
pub const DOS_MAGIC: u16 = 0x5a4d;

/// Offset of `e_lfanew` within the DOS header.
pub const DOS_PE_POINTER_OFFSET: u64 = 0x3c;

/// "PE\0\0".
pub const PE_SIGNATURE: [u8; 4] = [b'P', b'E', 0, 0];

/// COFF file header length in bytes.
pub const COFF_HEADER_SIZE: usize = 20;

pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32_PLUS_MAGIC: u16 = 0x20b;

/// Byte offset of the `CheckSum` field within the optional header, common
/// to PE32 and PE32+.
pub const CHECKSUM_FIELD_OFFSET: u64 = 64;

/// Index of a slot within the optional header data-directory table.
pub const DIRECTORY_SECURITY: usize = 4;
pub const DIRECTORY_BASERELOC: usize = 5;
pub const DIRECTORY_DEBUG: usize = 6;

const MAX_DATA_DIRECTORIES: u32 = 16;

/// COFF file header, shared by PE32 and PE32+.
#[derive(Debug, Clone)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut offset = 0;
        Ok(CoffHeader {
            machine: read_le_at(buf, &mut offset)?,
            number_of_sections: read_le_at(buf, &mut offset)?,
            time_date_stamp: read_le_at(buf, &mut offset)?,
            pointer_to_symbol_table: read_le_at(buf, &mut offset)?,
            number_of_symbols: read_le_at(buf, &mut offset)?,
            size_of_optional_header: read_le_at(buf, &mut offset)?,
            characteristics: read_le_at(buf, &mut offset)?,
        })
    }
}

/// Optional header fields shared by the PE32 and PE32+ layouts, decoded
/// field by field with the widths the magic number selects.
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    /// u32 in PE32, u64 in PE32+; widened here.
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub number_of_rva_and_sizes: u32,
    /// At most 16 slots, bounded by both `number_of_rva_and_sizes` and the
    /// declared optional-header size.
    pub data_directories: Vec<DataDirectory>,
}

impl OptionalHeader {
    /// Decodes an optional header from `buf`, branching on the magic.
    ///
    /// Any magic other than `0x10B` / `0x20B` is a fatal
    /// [`Error::Malformed`] for this image.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let magic: u16 = read_le_at(buf, &mut offset)?;
        let plus = match magic {
            PE32_MAGIC => false,
            PE32_PLUS_MAGIC => true,
            other => {
                return Err(Error::Malformed(format!(
                    "unknown optional-header magic {other:#06x}"
                )))
            }
        };

        let major_linker_version = read_le_at(buf, &mut offset)?;
        let minor_linker_version = read_le_at(buf, &mut offset)?;
        let size_of_code = read_le_at(buf, &mut offset)?;
        let size_of_initialized_data = read_le_at(buf, &mut offset)?;
        let size_of_uninitialized_data = read_le_at(buf, &mut offset)?;
        let address_of_entry_point = read_le_at(buf, &mut offset)?;
        let base_of_code = read_le_at(buf, &mut offset)?;
        let image_base = if plus {
            read_le_at::<u64>(buf, &mut offset)?
        } else {
            let _base_of_data: u32 = read_le_at(buf, &mut offset)?;
            u64::from(read_le_at::<u32>(buf, &mut offset)?)
        };
        let section_alignment = read_le_at(buf, &mut offset)?;
        let file_alignment = read_le_at(buf, &mut offset)?;
        let major_operating_system_version = read_le_at(buf, &mut offset)?;
        let minor_operating_system_version = read_le_at(buf, &mut offset)?;
        let major_image_version = read_le_at(buf, &mut offset)?;
        let minor_image_version = read_le_at(buf, &mut offset)?;
        let major_subsystem_version = read_le_at(buf, &mut offset)?;
        let minor_subsystem_version = read_le_at(buf, &mut offset)?;
        let _win32_version_value: u32 = read_le_at(buf, &mut offset)?;
        let size_of_image = read_le_at(buf, &mut offset)?;
        let size_of_headers = read_le_at(buf, &mut offset)?;
        let checksum = read_le_at(buf, &mut offset)?;
        let subsystem = read_le_at(buf, &mut offset)?;
        let dll_characteristics = read_le_at(buf, &mut offset)?;

        // Stack and heap reserve/commit widths also follow the magic.
        for _ in 0..4 {
            if plus {
                let _: u64 = read_le_at(buf, &mut offset)?;
            } else {
                let _: u32 = read_le_at(buf, &mut offset)?;
            }
        }
        let _loader_flags: u32 = read_le_at(buf, &mut offset)?;
        let number_of_rva_and_sizes: u32 = read_le_at(buf, &mut offset)?;

        let slots = number_of_rva_and_sizes.min(MAX_DATA_DIRECTORIES) as usize;
        let mut data_directories = Vec::with_capacity(slots);
        for _ in 0..slots {
            data_directories.push(DataDirectory::parse(buf, &mut offset)?);
        }

        Ok(OptionalHeader {
            magic,
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            size_of_image,
            size_of_headers,
            checksum,
            subsystem,
            dll_characteristics,
            number_of_rva_and_sizes,
            data_directories,
        })
    }

    pub fn directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories.get(index).copied()
    }
}

/// Decoded PE header: COFF file header plus the optional header.
#[derive(Debug, Clone)]
pub struct PeHeader {
    pub coff: CoffHeader,
    pub optional: OptionalHeader,
}
