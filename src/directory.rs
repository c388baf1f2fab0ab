//! Debug/CodeView, base-relocation and certificate directory decoders.
//!
//! These all resolve the directory's virtual address through the decoded
//! header ([`PeTeImage::resolve_address`] applies the TE adjustment when
//! one applies) and are display-only: relocations are never applied and
//! certificates are never verified.

use log::debug;

use crate::image::PeTeImage;
use crate::io::read_le_at;
use crate::Result;

/// Fixed size of one debug directory entry.
pub const DEBUG_DIRECTORY_ENTRY_SIZE: usize = 28;

/// Longest symbol-file path the CodeView reader will fetch.
const MAX_SYMBOL_PATH: usize = 512;

/// One entry of the debug data directory.
#[derive(Debug, Clone, Copy)]
pub struct DebugDirectoryEntry {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub entry_type: u32,
    pub size_of_data: u32,
    pub rva: u32,
    pub file_offset: u32,
}

impl DebugDirectoryEntry {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let mut offset = 0;
        Ok(DebugDirectoryEntry {
            characteristics: read_le_at(buf, &mut offset)?,
            time_date_stamp: read_le_at(buf, &mut offset)?,
            major_version: read_le_at(buf, &mut offset)?,
            minor_version: read_le_at(buf, &mut offset)?,
            entry_type: read_le_at(buf, &mut offset)?,
            size_of_data: read_le_at(buf, &mut offset)?,
            rva: read_le_at(buf, &mut offset)?,
            file_offset: read_le_at(buf, &mut offset)?,
        })
    }
}

/// Symbol-file linkage extracted from the CodeView record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo {
    /// Symbol file path, empty when the record tag is unrecognized.
    pub path: String,
    /// Canonical UUID string, only present for MTOC records.
    pub guid: String,
}

/// Follows the debug data directory to the CodeView record and extracts
/// the symbol-file linkage.
///
/// `MTOC` records carry a 16-byte GUID and then the path; `NB10` puts the
/// path at +16, `RSDS` at +24. Any other tag yields an empty [`DebugInfo`]
/// without raising.
pub fn codeview_info(image: &mut PeTeImage<'_>) -> Result<DebugInfo> {
    let Some(dir) = image.header.debug_directory() else {
        return Ok(DebugInfo::default());
    };
    if dir.is_empty() {
        return Ok(DebugInfo::default());
    }

    let entry_offset = image.resolve_address(dir.virtual_address);
    let entry = DebugDirectoryEntry::parse(
        &image
            .source_mut()
            .read_at(entry_offset, DEBUG_DIRECTORY_ENTRY_SIZE)?,
    )?;

    let record_offset = image.resolve_address(entry.file_offset);
    let source = image.source_mut();
    let tag = source.read_at(record_offset, 4)?;
    debug!("CodeView record at {record_offset:#x}, tag {:?}", tag);

    let info = match &tag[..] {
        b"MTOC" => {
            let raw = source.read(16)?;
            let mut guid_bytes = [0u8; 16];
            guid_bytes.copy_from_slice(&raw);
            let guid = uguid::Guid::from_bytes(guid_bytes).to_string();
            let path = source.read_c_string(MAX_SYMBOL_PATH)?;
            DebugInfo {
                path: String::from_utf8_lossy(&path).into_owned(),
                guid,
            }
        }
        b"NB10" => {
            let path = source.read_c_string_at(record_offset + 16, MAX_SYMBOL_PATH)?;
            DebugInfo {
                path: String::from_utf8_lossy(&path).into_owned(),
                guid: String::new(),
            }
        }
        b"RSDS" => {
            let path = source.read_c_string_at(record_offset + 24, MAX_SYMBOL_PATH)?;
            DebugInfo {
                path: String::from_utf8_lossy(&path).into_owned(),
                guid: String::new(),
            }
        }
        _ => DebugInfo::default(),
    };
    Ok(info)
}

/// One decoded base-relocation entry: a 12-bit page offset and a 4-bit
/// relocation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocEntry {
    pub page_offset: u16,
    pub kind: u8,
}

/// One base-relocation block and its decoded entries.
#[derive(Debug, Clone)]
pub struct RelocBlock {
    pub virtual_address: u32,
    pub size_of_block: u32,
    pub entries: Vec<RelocEntry>,
}

/// Walks the `.reloc` section's block list.
///
/// A block whose declared size is zero or larger than the bytes left in
/// the section terminates the walk; that is treated as end-of-table, not
/// an error.
pub fn relocations(image: &mut PeTeImage<'_>) -> Result<Vec<RelocBlock>> {
    let Some((_, section)) = image.find_section(".reloc")? else {
        return Ok(Vec::new());
    };

    let start = image.resolve_address(section.pointer_to_raw_data);
    let data = image
        .source_mut()
        .read_at(start, section.virtual_size as usize)?;

    let mut blocks = Vec::new();
    let mut pos = 0;
    while pos + 8 <= data.len() {
        let block_start = pos;
        let virtual_address: u32 = read_le_at(&data, &mut pos)?;
        let size_of_block: u32 = read_le_at(&data, &mut pos)?;
        if size_of_block == 0 || block_start + size_of_block as usize > data.len() {
            break;
        }

        let count = (size_of_block as usize - 8) / 2;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let raw: u16 = read_le_at(&data, &mut pos)?;
            entries.push(RelocEntry {
                page_offset: raw & 0x0fff,
                kind: (raw >> 12) as u8,
            });
        }

        blocks.push(RelocBlock {
            virtual_address,
            size_of_block,
            entries,
        });
        pos = block_start + size_of_block as usize;
    }
    Ok(blocks)
}

/// Raw bytes of the security directory, under one of two schemes.
#[derive(Debug, Clone)]
pub enum CertificateDump {
    /// A WIN_CERTIFICATE header followed by its payload.
    Uefi {
        length: u32,
        revision: u16,
        cert_type: u16,
        data: Vec<u8>,
    },
    /// Legacy scheme: (address, blob) pairs, each blob located separately.
    Legacy(Vec<(u32, Vec<u8>)>),
}

/// Dumps the security directory's certificate bytes.
///
/// A directory larger than 8 bytes holds a certificate header in place
/// (UEFI scheme); 8 bytes or fewer are interpreted as (virtual-address,
/// size) pairs pointing at separately-located blobs. No integrity or
/// signature validation is performed.
pub fn certificates(image: &mut PeTeImage<'_>) -> Result<Option<CertificateDump>> {
    let Some(dir) = image.header.security_directory() else {
        return Ok(None);
    };
    if dir.is_empty() {
        return Ok(None);
    }

    // The security directory address is a file offset already, not an RVA.
    let offset = u64::from(dir.virtual_address);
    if dir.size > 8 {
        let header = image.source_mut().read_at(offset, 8)?;
        let mut pos = 0;
        let length: u32 = read_le_at(&header, &mut pos)?;
        let revision: u16 = read_le_at(&header, &mut pos)?;
        let cert_type: u16 = read_le_at(&header, &mut pos)?;
        let payload = length.saturating_sub(8).min(dir.size - 8);
        let data = image.source_mut().read(payload as usize)?;
        Ok(Some(CertificateDump::Uefi {
            length,
            revision,
            cert_type,
            data,
        }))
    } else {
        let region = image.source_mut().read_at(offset, dir.size as usize)?;
        let mut pos = 0;
        let mut blobs = Vec::new();
        while pos + 8 <= region.len() {
            let address: u32 = read_le_at(&region, &mut pos)?;
            let size: u32 = read_le_at(&region, &mut pos)?;
            let blob_offset = image.resolve_address(address);
            let blob = image.source_mut().read_at(blob_offset, size as usize)?;
            blobs.push((address, blob));
        }
        Ok(Some(CertificateDump::Legacy(blobs)))
    }
}
