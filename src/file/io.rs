//! Little- and big-endian primitive access over byte slices.
//!
//! Every structural read in the crate goes through [`read_le_at`] and friends, which check the
//! bounds before touching the slice and advance a caller-owned offset. The write counterparts are
//! used by [`crate::builder`] when emitting images.
//!
//! ```rust
//! use cilfront::file::io::{read_le_at, read_le_at_dyn};
//!
//! let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
//! let mut offset = 0;
//! let a: u16 = read_le_at(&data, &mut offset)?;
//! let b = read_le_at_dyn(&data, &mut offset, true)?;
//! assert_eq!(a, 0x1234);
//! assert_eq!(b, 0x1234_5678);
//! # Ok::<(), cilfront::Error>(())
//! ```

use crate::Result;

/// Fixed-width primitives that can be decoded from and encoded to raw bytes.
pub trait CilIO: Sized + Copy {
    /// Byte array type of the primitive
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Decode from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
    /// Decode from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
    /// Encode as little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
    /// Encode as big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

fn slice_at<T: CilIO>(data: &[u8], offset: usize) -> Result<T::Bytes> {
    let len = std::mem::size_of::<T>();
    let end = offset.checked_add(len).ok_or(out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    T::Bytes::try_from(&data[offset..end]).map_err(|_| out_of_bounds_error!())
}

/// Read a little-endian value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0;
    read_le_at(data, &mut offset)
}

/// Read a little-endian value at `offset` and advance it past the value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let bytes = slice_at::<T>(data, *offset)?;
    *offset += std::mem::size_of::<T>();
    Ok(T::from_le_bytes(bytes))
}

/// Read a table index that is either 2 or 4 bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

/// Read a big-endian value at `offset` and advance it past the value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn read_be_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let bytes = slice_at::<T>(data, *offset)?;
    *offset += std::mem::size_of::<T>();
    Ok(T::from_be_bytes(bytes))
}

/// Write a little-endian value at `offset` and advance it past the value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let len = std::mem::size_of::<T>();
    let end = offset.checked_add(len).ok_or(out_of_bounds_error!())?;
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;
    Ok(())
}

/// Write a table index that is either 2 or 4 bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`, or
/// [`crate::Error::Malformed`] if a narrow index cannot hold `value`.
pub fn write_le_at_dyn(data: &mut [u8], offset: &mut usize, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        write_le_at(data, offset, value)
    } else {
        let narrow = u16::try_from(value)
            .map_err(|_| malformed_error!("Index {} does not fit a 2 byte column", value))?;
        write_le_at(data, offset, narrow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    const DATA: [u8; 12] = [
        0x01, 0x02, 0x03, 0x04,
        0x05, 0x06, 0x07, 0x08,
        0x00, 0x00, 0x80, 0x3F,
    ];

    #[test]
    fn read_widths() {
        let mut offset = 0;
        assert_eq!(read_le_at::<u8>(&DATA, &mut offset).unwrap(), 0x01);
        assert_eq!(read_le_at::<u16>(&DATA, &mut offset).unwrap(), 0x0302);
        assert_eq!(offset, 3);

        let mut offset = 0;
        assert_eq!(read_le_at::<u64>(&DATA, &mut offset).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le_at::<f32>(&DATA, &mut offset).unwrap(), 1.0);

        let mut offset = 0;
        assert_eq!(read_be_at::<u32>(&DATA, &mut offset).unwrap(), 0x0102_0304);
    }

    #[test]
    fn read_dyn() {
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&DATA, &mut offset, false).unwrap(), 0x0201);
        assert_eq!(read_le_at_dyn(&DATA, &mut offset, true).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn out_of_bounds() {
        let mut offset = 10;
        assert!(matches!(
            read_le_at::<u32>(&DATA, &mut offset),
            Err(crate::Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 10);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&DATA, &mut offset).is_err());
    }

    #[test]
    fn write_then_read() {
        let mut buffer = [0u8; 8];
        let mut offset = 0;
        write_le_at(&mut buffer, &mut offset, 0xBEEFu16).unwrap();
        write_le_at_dyn(&mut buffer, &mut offset, 0x1234_5678, true).unwrap();
        assert_eq!(buffer[..6], [0xEF, 0xBE, 0x78, 0x56, 0x34, 0x12]);

        let mut offset = 0;
        assert!(write_le_at_dyn(&mut buffer, &mut offset, 0x10000, false).is_err());
    }
}
