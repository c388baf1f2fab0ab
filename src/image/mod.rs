//! Image header decoding.
//!
//! This module determines the image kind (TE / PE32 / PE32+), parses the
//! fixed-layout header into typed fields and exposes the section table.
//! The layouts are mutually exclusive and offset-relative, so everything
//! downstream (debug, relocation and certificate lookups, the zero list)
//! goes through the decoded [`PeTeImage`].

mod pe;
mod te;

pub use pe::{CoffHeader, OptionalHeader, PeHeader};
pub use te::{TeHeader, TE_HEADER_SIZE, TE_MAGIC};

use log::debug;

use crate::io::{read_le, read_le_at};
use crate::source::ByteSource;
use crate::{Error, Result};

/// Fixed size of one section table record.
pub const SECTION_RECORD_SIZE: usize = 40;

/// EFI firmware-file section types that encapsulate an executable image.
const EFI_SECTION_PE32: u8 = 0x10;
const EFI_SECTION_TE: u8 = 0x12;

/// Which of the mutually-exclusive header layouts applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Te,
    Pe32,
    Pe32Plus,
    Unknown,
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImageKind::Te => "TE",
            ImageKind::Pe32 => "PE32",
            ImageKind::Pe32Plus => "PE32+",
            ImageKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One data-directory slot: a virtual address and a size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub(crate) fn parse(buf: &[u8], offset: &mut usize) -> Result<Self> {
        Ok(DataDirectory {
            virtual_address: read_le_at(buf, offset)?,
            size: read_le_at(buf, offset)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_address == 0 || self.size == 0
    }
}

/// Human-readable machine-type name. Unrecognized codes are not an error,
/// merely displayed as unknown.
pub fn machine_name(machine: u16) -> &'static str {
    match machine {
        0x014c => "IA32",
        0x01c0 | 0x01c2 => "ARM",
        0x0200 => "IPF",
        0x0ebc => "EBC",
        0x8664 => "X64",
        0xaa64 => "AArch64",
        _ => "Unknown",
    }
}

/// Closed union over the decoded header layouts, with a shared accessor
/// surface for the fields common to all three.
#[derive(Debug, Clone)]
pub enum ImageHeader {
    Te(TeHeader),
    Pe32(PeHeader),
    Pe32Plus(PeHeader),
}

impl ImageHeader {
    pub fn kind(&self) -> ImageKind {
        match self {
            ImageHeader::Te(_) => ImageKind::Te,
            ImageHeader::Pe32(_) => ImageKind::Pe32,
            ImageHeader::Pe32Plus(_) => ImageKind::Pe32Plus,
        }
    }

    pub fn machine(&self) -> u16 {
        match self {
            ImageHeader::Te(h) => h.machine,
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => h.coff.machine,
        }
    }

    pub fn machine_name(&self) -> &'static str {
        machine_name(self.machine())
    }

    pub fn number_of_sections(&self) -> u16 {
        match self {
            ImageHeader::Te(h) => u16::from(h.number_of_sections),
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => h.coff.number_of_sections,
        }
    }

    pub fn address_of_entry_point(&self) -> u32 {
        match self {
            ImageHeader::Te(h) => h.address_of_entry_point,
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => {
                h.optional.address_of_entry_point
            }
        }
    }

    pub fn image_base(&self) -> u64 {
        match self {
            ImageHeader::Te(h) => h.image_base,
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => h.optional.image_base,
        }
    }

    pub fn subsystem(&self) -> u16 {
        match self {
            ImageHeader::Te(h) => u16::from(h.subsystem),
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => h.optional.subsystem,
        }
    }

    /// Signed delta translating directory virtual addresses into file
    /// offsets. Nonzero only for TE images, whose directories still
    /// reference the unstripped PE layout.
    pub fn te_adjust(&self) -> i64 {
        match self {
            ImageHeader::Te(h) => h.header_adjust(),
            _ => 0,
        }
    }

    pub fn debug_directory(&self) -> Option<DataDirectory> {
        match self {
            ImageHeader::Te(h) => Some(h.debug_dir),
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => {
                h.optional.directory(pe::DIRECTORY_DEBUG)
            }
        }
    }

    pub fn reloc_directory(&self) -> Option<DataDirectory> {
        match self {
            ImageHeader::Te(h) => Some(h.reloc_dir),
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => {
                h.optional.directory(pe::DIRECTORY_BASERELOC)
            }
        }
    }

    /// TE images carry no security directory.
    pub fn security_directory(&self) -> Option<DataDirectory> {
        match self {
            ImageHeader::Te(_) => None,
            ImageHeader::Pe32(h) | ImageHeader::Pe32Plus(h) => {
                h.optional.directory(pe::DIRECTORY_SECURITY)
            }
        }
    }
}

/// Fixed-size section table record, minus the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

/// A decoded TE / PE32 / PE32+ image over its exclusively-owned source.
pub struct PeTeImage<'a> {
    source: ByteSource<'a>,
    pub header: ImageHeader,
    /// The image was prefixed by a firmware-volume section header.
    pub wrapped_in_fv_section: bool,
    /// Byte offset of the image start within the source (0 or 4).
    pub image_offset: u64,
    /// Byte offset at which the section table begins.
    pub section_table_offset: u64,
    /// TimeDateStamp/CheckSum field ranges recorded during decoding; always
    /// reproducibility-sensitive, independent of the section-based scan.
    header_zero_ranges: Vec<crate::zero::ZeroRange>,
}

impl std::fmt::Debug for PeTeImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeTeImage")
            .field("header", &self.header)
            .field("wrapped_in_fv_section", &self.wrapped_in_fv_section)
            .field("image_offset", &self.image_offset)
            .field("section_table_offset", &self.section_table_offset)
            .field("header_zero_ranges", &self.header_zero_ranges)
            .finish_non_exhaustive()
    }
}

impl<'a> PeTeImage<'a> {
    /// Decodes the image headers from `source`.
    ///
    /// On success the section table offset and header zero ranges are
    /// recorded; section, debug, relocation and certificate lookups are
    /// only available through the returned instance, so no lookup can ever
    /// observe an undecoded header.
    pub fn parse(mut source: ByteSource<'a>) -> Result<Self> {
        let prefix = source.read_at(0, 4)?;
        let (wrapped_in_fv_section, image_offset) =
            if matches!(prefix[3], EFI_SECTION_PE32 | EFI_SECTION_TE) {
                (true, 4u64)
            } else {
                (false, 0u64)
            };

        let magic: u16 = read_le(&source.read_at(image_offset, 2)?)?;
        if magic == TE_MAGIC {
            let header = TeHeader::parse(&source.read_at(image_offset, TE_HEADER_SIZE)?)?;
            return Ok(PeTeImage {
                section_table_offset: image_offset + TE_HEADER_SIZE as u64,
                header: ImageHeader::Te(header),
                wrapped_in_fv_section,
                image_offset,
                header_zero_ranges: Vec::new(),
                source,
            });
        }

        let pe_offset = if magic == pe::DOS_MAGIC {
            let e_lfanew: u32 =
                read_le(&source.read_at(image_offset + pe::DOS_PE_POINTER_OFFSET, 4)?)?;
            image_offset + u64::from(e_lfanew)
        } else {
            image_offset
        };

        let signature = source.read_at(pe_offset, 4)?;
        if signature != pe::PE_SIGNATURE {
            return Err(Error::Malformed("unknown image type".into()));
        }

        let coff = CoffHeader::parse(&source.read_at(pe_offset + 4, pe::COFF_HEADER_SIZE)?)?;
        let optional_offset = pe_offset + 4 + pe::COFF_HEADER_SIZE as u64;
        let optional = OptionalHeader::parse(
            &source.read_at(optional_offset, usize::from(coff.size_of_optional_header))?,
        )?;
        debug!(
            "{} image: machine {}, {} sections",
            if optional.magic == pe::PE32_MAGIC { "PE32" } else { "PE32+" },
            machine_name(coff.machine),
            coff.number_of_sections
        );

        // COFF TimeDateStamp and optional-header CheckSum never survive a
        // rebuild; record their file ranges up front.
        let header_zero_ranges = vec![
            crate::zero::ZeroRange {
                offset: pe_offset + 8,
                size: 4,
            },
            crate::zero::ZeroRange {
                offset: optional_offset + pe::CHECKSUM_FIELD_OFFSET,
                size: 4,
            },
        ];

        let section_table_offset = optional_offset + u64::from(coff.size_of_optional_header);
        let header = if optional.magic == pe::PE32_MAGIC {
            ImageHeader::Pe32(PeHeader { coff, optional })
        } else {
            ImageHeader::Pe32Plus(PeHeader { coff, optional })
        };

        Ok(PeTeImage {
            source,
            header,
            wrapped_in_fv_section,
            image_offset,
            section_table_offset,
            header_zero_ranges,
        })
    }

    pub fn kind(&self) -> ImageKind {
        self.header.kind()
    }

    /// Translates a directory virtual address into a file offset, applying
    /// the TE header adjustment when one applies.
    pub fn resolve_address(&self, virtual_address: u32) -> u64 {
        (i64::from(virtual_address) + self.header.te_adjust()) as u64
    }

    /// Reads the section record at `index`.
    ///
    /// The record is recomputed on every lookup. No bounds check against
    /// `number_of_sections` is imposed here; callers iterate
    /// `0..number_of_sections`, and an index beyond it reads whatever bytes
    /// follow the table (or fails at the source level).
    pub fn section(&mut self, index: u16) -> Result<(String, SectionDescriptor)> {
        let offset =
            self.section_table_offset + u64::from(index) * SECTION_RECORD_SIZE as u64;
        let buf = self.source.read_at(offset, SECTION_RECORD_SIZE)?;

        let name_len = buf[..8].iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&buf[..name_len]).into_owned();

        let mut pos = 8;
        let descriptor = SectionDescriptor {
            virtual_size: read_le_at(&buf, &mut pos)?,
            virtual_address: read_le_at(&buf, &mut pos)?,
            size_of_raw_data: read_le_at(&buf, &mut pos)?,
            pointer_to_raw_data: read_le_at(&buf, &mut pos)?,
            pointer_to_relocations: read_le_at(&buf, &mut pos)?,
            pointer_to_linenumbers: read_le_at(&buf, &mut pos)?,
            number_of_relocations: read_le_at(&buf, &mut pos)?,
            number_of_linenumbers: read_le_at(&buf, &mut pos)?,
            characteristics: read_le_at(&buf, &mut pos)?,
        };
        Ok((name, descriptor))
    }

    /// All sections, in table order.
    pub fn sections(&mut self) -> Result<Vec<(String, SectionDescriptor)>> {
        (0..self.header.number_of_sections())
            .map(|index| self.section(index))
            .collect()
    }

    /// First section whose name matches exactly.
    pub fn find_section(&mut self, name: &str) -> Result<Option<(String, SectionDescriptor)>> {
        for index in 0..self.header.number_of_sections() {
            let (section_name, descriptor) = self.section(index)?;
            if section_name == name {
                return Ok(Some((section_name, descriptor)));
            }
        }
        Ok(None)
    }

    /// Reads raw bytes at an absolute file offset within the image.
    pub fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.source.read_at(offset, size)
    }

    pub(crate) fn source_mut(&mut self) -> &mut ByteSource<'a> {
        &mut self.source
    }

    pub(crate) fn header_zero_ranges(&self) -> &[crate::zero::ZeroRange] {
        &self.header_zero_ranges
    }
}
