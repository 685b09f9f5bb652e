//! Little-endian primitives and ECMA-335 compressed integer encoding.
//!
//! Reading goes through [`read_le_at`] (bounds checked, advancing an offset); writing appends
//! to a `Vec<u8>` through the [`CilWrite`] extension trait, which the emitter uses for every
//! table row, heap entry and method body it produces.
//!
//! # Compressed integers
//!
//! ECMA-335 II.23.2 encodes unsigned values in one, two or four bytes:
//!
//! | Range                  | Encoding                              |
//! |------------------------|---------------------------------------|
//! | `0x00..=0x7F`          | `0xxxxxxx`                            |
//! | `0x80..=0x3FFF`        | `10xxxxxx xxxxxxxx`                   |
//! | `0x4000..=0x1FFF_FFFF` | `110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx` |
//!
//! Signed values are rotated so that the sign ends up in the lowest bit before being encoded
//! with the unsigned scheme, using the width the value needs.

use crate::Result;

/// Trait for the primitive types that can be read from and written to little-endian byte
/// buffers.
pub trait CilIO: Sized {
    /// Byte array representation of the type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read from little-endian bytes
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Convert into little-endian bytes
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cilio! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

/// Largest value representable as an ECMA-335 compressed unsigned integer.
pub const COMPRESSED_UINT_MAX: u32 = 0x1FFF_FFFF;

/// Safely reads a value of type `T` in little-endian byte order from the start of a buffer.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing the
/// offset by the size of `T`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed the buffer.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Reads a 2 or 4 byte little-endian index, depending on `is_large`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would exceed the buffer.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

/// Appending writers for the emitter.
pub trait CilWrite {
    /// Append a little-endian value.
    fn write_le<T: CilIO>(&mut self, value: T);

    /// Append a 2 or 4 byte index, depending on `is_large`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` does not fit a small index.
    fn write_le_dyn(&mut self, value: u32, is_large: bool) -> Result<()>;

    /// Append an ECMA-335 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` exceeds [`COMPRESSED_UINT_MAX`].
    fn write_compressed_uint(&mut self, value: u32) -> Result<()>;

    /// Append an ECMA-335 compressed signed integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `value` is outside of the 29-bit signed range.
    fn write_compressed_int(&mut self, value: i32) -> Result<()>;

    /// Pad with zero bytes until the length is a multiple of `alignment`.
    fn align_to(&mut self, alignment: usize);
}

impl CilWrite for Vec<u8> {
    fn write_le<T: CilIO>(&mut self, value: T) {
        self.extend_from_slice(value.to_le_bytes().as_ref());
    }

    fn write_le_dyn(&mut self, value: u32, is_large: bool) -> Result<()> {
        if is_large {
            self.write_le::<u32>(value);
        } else {
            let small = u16::try_from(value)
                .map_err(|_| malformed_error!("Index {} does not fit a 2-byte column", value))?;
            self.write_le::<u16>(small);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        if value <= 0x7F {
            self.push(value as u8);
        } else if value <= 0x3FFF {
            self.push(0x80 | (value >> 8) as u8);
            self.push(value as u8);
        } else if value <= COMPRESSED_UINT_MAX {
            self.push(0xC0 | (value >> 24) as u8);
            self.push((value >> 16) as u8);
            self.push((value >> 8) as u8);
            self.push(value as u8);
        } else {
            return Err(malformed_error!(
                "Value {:#x} can not be stored as compressed integer",
                value
            ));
        }
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        // II.23.2: rotate the sign bit into bit 0 of the chosen width
        let (mask, bits) = if (-0x40..=0x3F).contains(&value) {
            (0x7F_u32, 7)
        } else if (-0x2000..=0x1FFF).contains(&value) {
            (0x3FFF_u32, 14)
        } else if (-0x1000_0000..=0x0FFF_FFFF).contains(&value) {
            (0x1FFF_FFFF_u32, 29)
        } else {
            return Err(malformed_error!(
                "Value {} can not be stored as compressed signed integer",
                value
            ));
        };

        let raw = value as u32 & mask;
        let rotated = ((raw << 1) | (raw >> (bits - 1))) & mask;

        // The width is fixed by the value range, not by the rotated magnitude
        #[allow(clippy::cast_possible_truncation)]
        match bits {
            7 => self.push(rotated as u8),
            14 => {
                self.push(0x80 | (rotated >> 8) as u8);
                self.push(rotated as u8);
            }
            _ => {
                self.push(0xC0 | (rotated >> 24) as u8);
                self.push((rotated >> 16) as u8);
                self.push((rotated >> 8) as u8);
                self.push(rotated as u8);
            }
        }
        Ok(())
    }

    fn align_to(&mut self, alignment: usize) {
        while self.len() % alignment != 0 {
            self.push(0);
        }
    }
}
