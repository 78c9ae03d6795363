//! Low-level primitive reads and writes for SWF and ABC data.
//!
//! SWF headers and tag records are little-endian fixed width integers. The ABC unit
//! layers variable-length integers on top of that, which live in
//! [`crate::file::parser::Parser`] and [`crate::file::writer::Writer`].

use crate::{Error::OutOfBounds, Result};

/// Trait for fixed-width primitives that can be read from and written to byte buffers.
pub trait SwfIO: Sized {
    /// The byte array representation of this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read `T` from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Read `T` from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Convert `T` to its little-endian representation
    fn to_le_bytes(self) -> Self::Bytes;

    /// Convert `T` to its big-endian representation
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_swf_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl SwfIO for $ty {
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

impl_swf_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order from a data buffer.
///
/// # Arguments
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset, advanced past the value on success
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer.
pub fn read_le_at<T: SwfIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Safely reads a value of type `T` in big-endian byte order from a data buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer.
pub fn read_be_at<T: SwfIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Overwrites a little-endian value of type `T` at `offset` inside an existing buffer.
///
/// Used to back-patch length fields once the size of the following data is known.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn write_le_at<T: SwfIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = value.to_le_bytes();
    data[*offset..end].copy_from_slice(bytes.as_ref());
    *offset = end;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u16() {
        let mut offset = 0;
        let result = read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0201);
        assert_eq!(offset, 2);
    }

    #[test]
    fn read_be_u32() {
        let mut offset = 0;
        let result = read_be_at::<u32>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0102_0304);
    }

    #[test]
    fn read_le_f64() {
        let data = 1.5_f64.to_le_bytes();
        let mut offset = 0;
        assert_eq!(read_le_at::<f64>(&data, &mut offset).unwrap(), 1.5);
    }

    #[test]
    fn read_past_end() {
        let mut offset = 6;
        let result = read_le_at::<u32>(&TEST_BUFFER, &mut offset);
        assert!(matches!(result, Err(OutOfBounds)));
        assert_eq!(offset, 6);
    }

    #[test]
    fn write_back_patch() {
        let mut data = [0u8; 6];
        let mut offset = 2;
        write_le_at::<u32>(&mut data, &mut offset, 0xAABB_CCDD).unwrap();
        assert_eq!(data, [0x00, 0x00, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(offset, 6);

        let mut offset = 4;
        assert!(write_le_at::<u32>(&mut data, &mut offset, 1).is_err());
    }
}
