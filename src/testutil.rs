//! Synthetic image builders for unit tests.
//!
//! Layout is deterministic so tests can compute file offsets without
//! parsing: section `i` gets virtual address `(i + 1) * 0x1000` and raw
//! data at `0x400 + i * 0x200` (each section's raw data must fit in the
//! 0x200-byte stride). Anything in `tail` lands at `tail_offset(n)`.

use crate::image::DataDirectory;

pub(crate) const IMAGE_BASE32: u32 = 0x0040_0000;
pub(crate) const IMAGE_BASE64: u64 = 0x0000_0001_4000_0000;
pub(crate) const SECTION_RAW_BASE: u32 = 0x400;
pub(crate) const SECTION_RAW_STRIDE: u32 = 0x200;
pub(crate) const SECTION_VA_STRIDE: u32 = 0x1000;

pub(crate) fn section_raw_offset(index: usize) -> u32 {
    SECTION_RAW_BASE + index as u32 * SECTION_RAW_STRIDE
}

pub(crate) fn section_virtual_address(index: usize) -> u32 {
    (index as u32 + 1) * SECTION_VA_STRIDE
}

pub(crate) fn tail_offset(section_count: usize) -> u32 {
    section_raw_offset(section_count)
}

pub(crate) struct SectionSpec {
    pub name: &'static str,
    pub virtual_size: u32,
    pub data: Vec<u8>,
}

impl SectionSpec {
    pub(crate) fn new(name: &'static str, virtual_size: u32, data: Vec<u8>) -> Self {
        assert!(data.len() <= SECTION_RAW_STRIDE as usize);
        SectionSpec {
            name,
            virtual_size,
            data,
        }
    }
}

pub(crate) struct ImageSpec {
    pub plus: bool,
    pub machine: u16,
    pub sections: Vec<SectionSpec>,
    pub security_dir: Option<DataDirectory>,
    pub reloc_dir: Option<DataDirectory>,
    pub debug_dir: Option<DataDirectory>,
    pub tail: Vec<u8>,
}

impl Default for ImageSpec {
    fn default() -> Self {
        ImageSpec {
            plus: false,
            machine: 0x014c,
            sections: Vec::new(),
            security_dir: None,
            reloc_dir: None,
            debug_dir: None,
            tail: Vec::new(),
        }
    }
}

fn w16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn w32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn w64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn patch32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn push_section_table(buf: &mut Vec<u8>, sections: &[SectionSpec]) {
    for (index, section) in sections.iter().enumerate() {
        let mut name = [0u8; 8];
        name[..section.name.len()].copy_from_slice(section.name.as_bytes());
        buf.extend_from_slice(&name);
        w32(buf, section.virtual_size);
        w32(buf, section_virtual_address(index));
        w32(buf, section.data.len() as u32);
        w32(buf, section_raw_offset(index));
        w32(buf, 0); // PointerToRelocations
        w32(buf, 0); // PointerToLinenumbers
        w16(buf, 0);
        w16(buf, 0);
        w32(buf, 0x6000_0020);
    }
}

fn place_section_data(buf: &mut Vec<u8>, sections: &[SectionSpec], tail: &[u8]) {
    buf.resize(tail_offset(sections.len()) as usize, 0);
    for (index, section) in sections.iter().enumerate() {
        let offset = section_raw_offset(index) as usize;
        buf[offset..offset + section.data.len()].copy_from_slice(&section.data);
    }
    buf.extend_from_slice(tail);
}

/// Builds a PE32 or PE32+ image: DOS header at 0, PE signature at 0x40.
pub(crate) fn build_pe(spec: &ImageSpec) -> Vec<u8> {
    let optional_size: u16 = if spec.plus { 240 } else { 224 };

    let mut buf = vec![0u8; 0x40];
    buf[0] = b'M';
    buf[1] = b'Z';
    patch32(&mut buf, 0x3c, 0x40);

    buf.extend_from_slice(b"PE\0\0");

    // COFF file header.
    w16(&mut buf, spec.machine);
    w16(&mut buf, spec.sections.len() as u16);
    w32(&mut buf, 0x5eed_1234); // TimeDateStamp
    w32(&mut buf, 0);
    w32(&mut buf, 0);
    w16(&mut buf, optional_size);
    w16(&mut buf, 0x0102);

    // Optional header.
    w16(&mut buf, if spec.plus { 0x20b } else { 0x10b });
    buf.push(14);
    buf.push(0);
    w32(&mut buf, 0x1000); // SizeOfCode
    w32(&mut buf, 0x200); // SizeOfInitializedData
    w32(&mut buf, 0); // SizeOfUninitializedData
    w32(&mut buf, 0x1000); // AddressOfEntryPoint
    w32(&mut buf, 0x1000); // BaseOfCode
    if spec.plus {
        w64(&mut buf, IMAGE_BASE64);
    } else {
        w32(&mut buf, 0x2000); // BaseOfData
        w32(&mut buf, IMAGE_BASE32);
    }
    w32(&mut buf, 0x1000); // SectionAlignment
    w32(&mut buf, 0x200); // FileAlignment
    w16(&mut buf, 6);
    w16(&mut buf, 0);
    w16(&mut buf, 0);
    w16(&mut buf, 0);
    w16(&mut buf, 6);
    w16(&mut buf, 0);
    w32(&mut buf, 0); // Win32VersionValue
    w32(&mut buf, (spec.sections.len() as u32 + 1) * 0x1000); // SizeOfImage
    w32(&mut buf, 0x400); // SizeOfHeaders
    w32(&mut buf, 0xdead_beef); // CheckSum
    w16(&mut buf, 10); // Subsystem
    w16(&mut buf, 0);
    for _ in 0..4 {
        if spec.plus {
            w64(&mut buf, 0x1000);
        } else {
            w32(&mut buf, 0x1000);
        }
    }
    w32(&mut buf, 0); // LoaderFlags
    w32(&mut buf, 16); // NumberOfRvaAndSizes
    for index in 0..16usize {
        let dir = match index {
            4 => spec.security_dir,
            5 => spec.reloc_dir,
            6 => spec.debug_dir,
            _ => None,
        }
        .unwrap_or_default();
        w32(&mut buf, dir.virtual_address);
        w32(&mut buf, dir.size);
    }

    push_section_table(&mut buf, &spec.sections);
    place_section_data(&mut buf, &spec.sections, &spec.tail);
    buf
}

/// Builds a TE image: 40-byte header, section table directly after it.
pub(crate) fn build_te(
    machine: u16,
    stripped_size: u16,
    sections: &[SectionSpec],
    reloc_dir: Option<DataDirectory>,
    debug_dir: Option<DataDirectory>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    w16(&mut buf, 0x5a56);
    w16(&mut buf, machine);
    buf.push(sections.len() as u8);
    buf.push(0x0b); // EFI boot-service-driver subsystem
    w16(&mut buf, stripped_size);
    w32(&mut buf, 0x1000); // AddressOfEntryPoint
    w32(&mut buf, 0x1000); // BaseOfCode
    w64(&mut buf, 0xfee0_0000);
    let reloc = reloc_dir.unwrap_or_default();
    w32(&mut buf, reloc.virtual_address);
    w32(&mut buf, reloc.size);
    let debug = debug_dir.unwrap_or_default();
    w32(&mut buf, debug.virtual_address);
    w32(&mut buf, debug.size);

    push_section_table(&mut buf, sections);
    place_section_data(&mut buf, sections, &[]);
    buf
}

/// Builds an EFI fat binary containing the given (cpu type, cpu subtype,
/// image bytes) slices, laid out in entry order after the header.
pub(crate) fn build_fat(slices: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
    let header_size = 8 + slices.len() * 20;
    let mut offsets = Vec::with_capacity(slices.len());
    let mut cursor = (header_size as u32 + 7) & !7;
    for (_, _, data) in slices {
        offsets.push(cursor);
        cursor = (cursor + data.len() as u32 + 7) & !7;
    }

    let mut buf = Vec::new();
    w32(&mut buf, 0x0ef1_fab9);
    w32(&mut buf, slices.len() as u32);
    for ((cpu_type, cpu_subtype, data), offset) in slices.iter().zip(&offsets) {
        w32(&mut buf, *cpu_type);
        w32(&mut buf, *cpu_subtype);
        w32(&mut buf, *offset);
        w32(&mut buf, data.len() as u32);
        w32(&mut buf, 3);
    }
    for ((_, _, data), offset) in slices.iter().zip(&offsets) {
        buf.resize(*offset as usize, 0);
        buf.extend_from_slice(data);
    }
    buf
}
