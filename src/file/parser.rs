//! Low-level byte stream parser for metadata, method bodies and symbol blobs.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser used by every decoding step of the crate: heaps, table rows, method body headers,
//! CIL instruction streams, signatures and Portable PDB sequence point blobs. All reads are
//! bounds checked and report [`crate::Error::OutOfBounds`] instead of panicking on truncated
//! input.
//!
//! # Usage Examples
//!
//! ```rust
//! use dotweave::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04, 0x81, 0x00];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u32>()?, 0x04030201);
//! assert_eq!(parser.read_compressed_uint()?, 0x100);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    Result,
};

/// A cursor over a byte slice.
///
/// `Parser` maintains an internal position and provides bounds checking to prevent buffer
/// overruns when reading malformed or truncated data.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to `len()` is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Align the position to a multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding would exceed the data length.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a value of type `T` in little-endian byte order and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there is not enough data.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read `count` raw bytes and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there is not enough data.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(count)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data and [`crate::Error::Malformed`]
    /// if the first byte does not start a valid encoding.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        // 1-byte encoding: 0xxxxxxx
        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        // 2-byte encoding: 10xxxxxx xxxxxxxx
        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            let value = ((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte);
            return Ok(value);
        }

        // 4-byte encoding: 110xxxxx xxxxxxxx xxxxxxxx xxxxxxxx
        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            let value = ((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3;
            return Ok(value);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a compressed signed integer (ECMA-335 II.23.2).
    ///
    /// The sign is stored in the lowest bit of the 7, 14 or 29 bit payload selected by the
    /// unsigned encoding.
    ///
    /// # Errors
    /// See [`Parser::read_compressed_uint`].
    #[allow(clippy::cast_possible_wrap)]
    pub fn read_compressed_int(&mut self) -> Result<i32> {
        let start = self.position;
        let unsigned = self.read_compressed_uint()?;
        let bits = match self.position - start {
            1 => 7,
            2 => 14,
            _ => 29,
        };

        let magnitude = (unsigned >> 1) as i32;
        if unsigned & 1 == 0 {
            Ok(magnitude)
        } else {
            Ok(magnitude - (1_i32 << (bits - 1)))
        }
    }

    /// Read a null-terminated UTF-8 string and advance past the terminator.
    ///
    /// A string running to the end of the data without terminator is accepted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the bytes are not valid UTF-8.
    pub fn read_string_utf8(&mut self) -> Result<String> {
        let start = self.position;
        let mut end = start;

        while end < self.data.len() && self.data[end] != 0 {
            end += 1;
        }

        let string_data = &self.data[start..end];

        if end < self.data.len() {
            self.position = end + 1;
        } else {
            self.position = end;
        }

        String::from_utf8(string_data.to_vec()).map_err(|e| {
            malformed_error!(
                "Invalid UTF-8 string at offset {}-{}: {}",
                start,
                end,
                e.utf8_error()
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::io::CilWrite;

    #[test]
    fn navigation() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut parser = Parser::new(&data);

        parser.advance_by(3).unwrap();
        assert_eq!(parser.pos(), 3);
        assert_eq!(parser.peek_byte().unwrap(), 0x04);

        parser.seek(5).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.peek_byte().is_err());
        assert!(parser.seek(6).is_err());
        assert!(parser.advance_by(1).is_err());
    }

    #[test]
    fn align() {
        let data = [0u8; 8];
        let mut parser = Parser::new(&data);
        parser.advance_by(1).unwrap();
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
        parser.align(4).unwrap();
        assert_eq!(parser.pos(), 4);
    }

    #[test]
    fn compressed_uint() {
        let data = [0x03, 0xAE, 0x57, 0xC0, 0x00, 0x40, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x03);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x2E57);
        assert_eq!(parser.read_compressed_uint().unwrap(), 0x4000);

        let invalid = [0xE0, 0x00, 0x00, 0x00];
        assert!(Parser::new(&invalid).read_compressed_uint().is_err());
    }

    #[test]
    fn compressed_int_ecma_samples() {
        let samples: [(i32, &[u8]); 6] = [
            (3, &[0x06]),
            (-3, &[0x7B]),
            (64, &[0x80, 0x80]),
            (-64, &[0x01]),
            (-8192, &[0x80, 0x01]),
            (-268_435_456, &[0xC0, 0x00, 0x00, 0x01]),
        ];

        for (expected, bytes) in samples {
            let mut parser = Parser::new(bytes);
            assert_eq!(parser.read_compressed_int().unwrap(), expected);
        }
    }

    #[test]
    fn compressed_int_matches_writer() {
        for value in [-268_435_456, -70_000, -8193, -65, -1, 0, 1, 63, 64, 8191, 9000, 268_435_455] {
            let mut out = Vec::new();
            out.write_compressed_int(value).unwrap();
            assert_eq!(Parser::new(&out).read_compressed_int().unwrap(), value);
        }
    }

    #[test]
    fn strings_and_bytes() {
        let data = b"abc\0de";
        let mut parser = Parser::new(data);
        assert_eq!(parser.read_string_utf8().unwrap(), "abc");
        assert_eq!(parser.read_bytes(2).unwrap(), b"de");
        assert!(parser.read_bytes(1).is_err());

        let invalid = [0xFF, 0xFE, 0x00];
        assert!(Parser::new(&invalid).read_string_utf8().is_err());
    }
}
