//! Backing-storage abstraction for image decoding.
//!
//! An image can be decoded from a file on disk, from the address space of a
//! live process, or from an in-memory buffer (a slice carved out of a FAT
//! container). All three backends expose the same seek/read/read-C-string
//! semantics relative to their own addressing scheme, so the decoder never
//! cares which one is underneath.

use std::borrow::Cow;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

/// Collaborator capability for reading a live process image.
///
/// The core never manages the underlying debugger or process connection; it
/// only asks for `size` bytes at `address`.
pub trait MemoryReader {
    fn read_memory(&mut self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Reads up to `max_size` bytes at `address` and returns the bytes
    /// preceding the first NUL.
    fn read_c_string_from_memory(&mut self, address: u64, max_size: usize) -> Result<Vec<u8>> {
        let buf = self.read_memory(address, max_size)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(buf[..end].to_vec())
    }
}

/// A positioned byte stream over one of three backends.
///
/// Exactly one backend is active per instance. A `File` source addresses
/// the file itself; byte 0 of a `Memory` source sits at address `base` in
/// the process.
pub enum ByteSource<'a> {
    File { file: File },
    Memory {
        reader: Box<dyn MemoryReader>,
        base: u64,
        cursor: u64,
    },
    Buffer { data: Cow<'a, [u8]>, cursor: usize },
}

impl From<Vec<u8>> for ByteSource<'static> {
    fn from(data: Vec<u8>) -> Self {
        ByteSource::Buffer {
            data: Cow::Owned(data),
            cursor: 0,
        }
    }
}

impl<'a> From<&'a [u8]> for ByteSource<'a> {
    fn from(data: &'a [u8]) -> Self {
        ByteSource::Buffer {
            data: Cow::Borrowed(data),
            cursor: 0,
        }
    }
}

impl<'a> ByteSource<'a> {
    pub fn from_file(file: File) -> Self {
        ByteSource::File { file }
    }

    pub fn from_memory(reader: Box<dyn MemoryReader>, base: u64) -> Self {
        ByteSource::Memory {
            reader,
            base,
            cursor: 0,
        }
    }

    /// Moves the cursor and returns the new position.
    ///
    /// End-relative seeking is only meaningful for backends with a defined
    /// end; on a process-memory source it fails with [`Error::Unsupported`].
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match self {
            ByteSource::File { file } => Ok(file.seek(pos)?),
            ByteSource::Memory { cursor, .. } => match pos {
                SeekFrom::Start(offset) => {
                    *cursor = offset;
                    Ok(*cursor)
                }
                SeekFrom::Current(delta) => {
                    *cursor = cursor
                        .checked_add_signed(delta)
                        .ok_or(Error::Unsupported("seek before start of memory image"))?;
                    Ok(*cursor)
                }
                SeekFrom::End(_) => Err(Error::Unsupported(
                    "end-relative seek on a memory-backed source",
                )),
            },
            ByteSource::Buffer { data, cursor } => {
                let target = match pos {
                    SeekFrom::Start(offset) => offset as i64,
                    SeekFrom::Current(delta) => *cursor as i64 + delta,
                    SeekFrom::End(delta) => data.len() as i64 + delta,
                };
                if target < 0 {
                    return Err(Error::Unsupported("seek before start of buffer"));
                }
                *cursor = target as usize;
                Ok(*cursor as u64)
            }
        }
    }

    /// Current position relative to the backend base.
    pub fn tell(&mut self) -> Result<u64> {
        match self {
            ByteSource::File { file } => Ok(file.stream_position()?),
            ByteSource::Memory { cursor, .. } => Ok(*cursor),
            ByteSource::Buffer { cursor, .. } => Ok(*cursor as u64),
        }
    }

    /// Reads exactly `size` bytes from the current position.
    pub fn read(&mut self, size: usize) -> Result<Vec<u8>> {
        let offset = self.tell()?;
        let buf = self.read_up_to(size)?;
        if buf.len() < size {
            return Err(Error::Truncated {
                offset,
                wanted: size,
                got: buf.len(),
            });
        }
        Ok(buf)
    }

    /// Seeks to `offset`, then reads exactly `size` bytes.
    pub fn read_at(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(size)
    }

    /// Reads at most `size` bytes; short only when the backend runs out.
    fn read_up_to(&mut self, size: usize) -> Result<Vec<u8>> {
        match self {
            ByteSource::File { file, .. } => {
                let mut buf = vec![0u8; size];
                let mut got = 0;
                while got < size {
                    let n = file.read(&mut buf[got..])?;
                    if n == 0 {
                        break;
                    }
                    got += n;
                }
                buf.truncate(got);
                Ok(buf)
            }
            ByteSource::Memory {
                reader,
                base,
                cursor,
            } => {
                let buf = reader.read_memory(*base + *cursor, size)?;
                *cursor += buf.len() as u64;
                Ok(buf)
            }
            ByteSource::Buffer { data, cursor } => {
                let start = (*cursor).min(data.len());
                let end = cursor.saturating_add(size).min(data.len());
                *cursor = end;
                Ok(data[start..end].to_vec())
            }
        }
    }

    /// Reads up to `max_size` bytes and returns the bytes preceding the
    /// first NUL. The cursor ends immediately after the terminator, assuming
    /// one exists within `max_size`.
    pub fn read_c_string(&mut self, max_size: usize) -> Result<Vec<u8>> {
        let start = self.tell()?;
        let buf = self.read_up_to(max_size)?;
        match buf.iter().position(|&b| b == 0) {
            Some(end) => {
                self.seek(SeekFrom::Start(start + end as u64 + 1))?;
                Ok(buf[..end].to_vec())
            }
            None => Ok(buf),
        }
    }

    /// [`Self::read_c_string`] after an absolute seek.
    pub fn read_c_string_at(&mut self, offset: u64, max_size: usize) -> Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_c_string(max_size)
    }
}
