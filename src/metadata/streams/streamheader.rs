//! Stream headers of the metadata root (ECMA-335 II.24.2.2).
//!
//! Each header names one stream of the image and locates it relative to the start of the
//! metadata root. The name is a null-terminated ASCII string padded to a 4-byte boundary.

use crate::{
    file::{io::CilWrite, parser::Parser},
    Result,
};

/// Names of all streams this crate reads or writes
pub const KNOWN_STREAMS: [&str; 8] = [
    "#~", "#Strings", "#US", "#GUID", "#Blob", "#IL", "#CV", "#Pdb",
];

/// Longest stream name allowed by the format, without terminator
const MAX_NAME_LEN: usize = 32;

/// A single stream header of the metadata root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset of the stream, relative to the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Name of the stream, e.g. `#Strings`
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header at the current position of `parser`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown or unterminated names, and
    /// [`crate::Error::OutOfBounds`] on truncated input.
    pub fn read(parser: &mut Parser) -> Result<StreamHeader> {
        let offset = parser.read_le::<u32>()?;
        let size = parser.read_le::<u32>()?;

        let name_start = parser.pos();
        let mut name = String::with_capacity(MAX_NAME_LEN);
        loop {
            let name_char = parser.read_le::<u8>()?;
            if name_char == 0 {
                break;
            }
            if name.len() == MAX_NAME_LEN {
                return Err(malformed_error!(
                    "Stream name at offset {} is not terminated",
                    name_start
                ));
            }
            name.push(char::from(name_char));
        }
        parser.align(4)?;

        if !KNOWN_STREAMS.contains(&name.as_str()) {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader { offset, size, name })
    }

    /// Serialized size of this header, including the padded name
    #[must_use]
    pub fn size_on_disk(name: &str) -> usize {
        8 + ((name.len() + 1 + 3) & !3)
    }

    /// Append this header to `out`
    pub fn write(&self, out: &mut Vec<u8>) {
        out.write_le::<u32>(self.offset);
        out.write_le::<u32>(self.size);
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        out.align_to(4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,
        ];

        let mut parser = Parser::new(&header_bytes);
        let parsed_header = StreamHeader::read(&mut parser).unwrap();

        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#~");
        assert_eq!(parser.pos(), 12);
    }

    #[test]
    fn crafted_invalid() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x24, 0x7E, 0x00, 0x00,
        ];

        assert!(StreamHeader::read(&mut Parser::new(&header_bytes)).is_err());
    }

    #[test]
    fn write_pads_name() {
        let header = StreamHeader {
            offset: 0x20,
            size: 0x10,
            name: "#Strings".to_string(),
        };

        let mut out = Vec::new();
        header.write(&mut out);
        assert_eq!(out.len(), StreamHeader::size_on_disk("#Strings"));
        assert_eq!(out.len(), 20);

        let parsed = StreamHeader::read(&mut Parser::new(&out)).unwrap();
        assert_eq!(parsed, header);
    }
}
