//! Error taxonomy for image decoding.

use thiserror::Error;

/// Errors returned while reading or decoding an image.
///
/// Structural violations ([`Error::Malformed`]) are fatal for the affected
/// image only; when iterating a FAT container they must not stop sibling
/// architectures from being decoded. Unrecognized machine codes, cpu types
/// and CodeView tags are not errors at all and degrade to `"Unknown"` or
/// empty output at the call site.
#[derive(Error, Debug)]
pub enum Error {
    /// The active backend cannot perform the requested operation, e.g. an
    /// end-relative seek on a process-memory source.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The image structure does not decode: bad PE signature, unrecognized
    /// optional-header magic, malformed FAT container header.
    #[error("malformed header: {0}")]
    Malformed(String),

    /// The backing store ran out of bytes mid-read.
    #[error("truncated read at offset {offset:#x}: wanted {wanted} bytes, got {got}")]
    Truncated {
        offset: u64,
        wanted: usize,
        got: usize,
    },

    /// Underlying filesystem I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
