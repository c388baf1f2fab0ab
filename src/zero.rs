//! Reproducibility scanner and in-place zero rewrite.
//!
//! Rebuilding the same source tree produces images differing only in a
//! handful of byte ranges: header timestamps and checksums, padding past a
//! section's declared virtual size, and the debug directory's timestamp.
//! The scanner collects those ranges; applying them blanks the bytes in
//! place without ever changing the file length.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use log::debug;

use crate::image::PeTeImage;
use crate::Result;

/// Sentinel size meaning "to end of file".
pub const TO_END_OF_FILE: i64 = -1;

/// A reproducibility-sensitive byte range. An `offset` of 0 is reserved as
/// a no-op and skipped when applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroRange {
    pub offset: u64,
    pub size: i64,
}

/// Computes the complete, ordered zero list for `image`: the header ranges
/// recorded during decoding plus the section-driven scan.
pub fn zero_ranges(image: &mut PeTeImage<'_>) -> Result<Vec<ZeroRange>> {
    let mut ranges = image.header_zero_ranges().to_vec();
    let adjust = image.header.te_adjust();

    for (name, section) in image.sections()? {
        if section.size_of_raw_data > section.virtual_size {
            // Trailing raw bytes past the virtual size are link-time padding.
            let diff = i64::from(section.size_of_raw_data - section.virtual_size);
            let end =
                adjust + i64::from(section.pointer_to_raw_data) + i64::from(section.size_of_raw_data);
            ranges.push(ZeroRange {
                offset: (end - diff) as u64,
                size: diff,
            });
        }
        if name == ".debug" {
            // Timestamp of the debug directory entry stored in the section.
            ranges.push(ZeroRange {
                offset: (adjust + i64::from(section.pointer_to_raw_data) + 4) as u64,
                size: 4,
            });
        }
    }

    ranges.sort_by_key(|range| range.offset);
    Ok(ranges)
}

/// Overwrites each range with zero bytes in place.
///
/// Ranges at offset 0 are skipped; a size of [`TO_END_OF_FILE`] resolves to
/// the bytes remaining after the offset. The file length never changes.
pub fn apply_zero_ranges(file: &mut File, ranges: &[ZeroRange]) -> Result<()> {
    let file_len = file.metadata()?.len();
    for range in ranges {
        if range.offset == 0 {
            continue;
        }
        let count = if range.size < 0 {
            file_len.saturating_sub(range.offset)
        } else {
            range.size as u64
        };
        debug!("zeroing {count} bytes at {:#x}", range.offset);
        file.seek(SeekFrom::Start(range.offset))?;
        file.write_all(&vec![0u8; count as usize])?;
    }
    Ok(())
}
