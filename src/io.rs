//! Bounds-checked little-endian field reads from byte slices.
//!
//! Every header in this crate is decoded field by field from a buffer the
//! [`crate::source::ByteSource`] already fetched, so the only failure mode
//! here is running off the end of that buffer.

use crate::{Error, Result};

/// Fixed-width unsigned field that can be decoded from little-endian bytes.
pub trait LeField: Sized {
    type Bytes: for<'a> TryFrom<&'a [u8]>;

    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! le_field {
    ($($ty:ty),*) => {
        $(impl LeField for $ty {
            type Bytes = [u8; std::mem::size_of::<$ty>()];

            fn from_le_bytes(bytes: Self::Bytes) -> Self {
                <$ty>::from_le_bytes(bytes)
            }
        })*
    };
}

le_field!(u8, u16, u32, u64);

/// Reads a `T` at `*offset` and advances the offset past it.
pub fn read_le_at<T: LeField>(data: &[u8], offset: &mut usize) -> Result<T> {
    let len = std::mem::size_of::<T>();
    let end = offset.checked_add(len).ok_or(Error::Truncated {
        offset: *offset as u64,
        wanted: len,
        got: 0,
    })?;
    if end > data.len() {
        return Err(Error::Truncated {
            offset: *offset as u64,
            wanted: len,
            got: data.len().saturating_sub(*offset),
        });
    }

    let Ok(bytes) = data[*offset..end].try_into() else {
        return Err(Error::Truncated {
            offset: *offset as u64,
            wanted: len,
            got: 0,
        });
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Reads a `T` from the start of the buffer.
pub fn read_le<T: LeField>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}
