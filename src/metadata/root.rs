//! The metadata root (ECMA-335 II.24.2.1).
//!
//! Both images handled by this crate, the module image and the symbol image, start with a
//! metadata root: the `BSJB` signature, a version string and the headers of the streams that
//! follow. [`Root::read`] validates the header and every stream location, [`RootBuilder`]
//! lays out a complete image from a list of named streams.

use std::collections::HashSet;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::streams::StreamHeader,
    Result,
};

/// Signature of the metadata root, `BSJB` in little-endian
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Version string written into module images
pub const DEFAULT_RUNTIME_VERSION: &str = "v4.0.30319";

/// Version string written into symbol images
pub const PDB_VERSION: &str = "PDB v1.0";

/// Longest version string allowed, including padding
const MAX_VERSION_LEN: u32 = 255;

/// The parsed metadata root of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Version string, without padding
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// Headers of all streams, in file order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse and validate the metadata root at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature or version, duplicate or
    /// unknown streams and streams reaching outside of `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);

        let signature = parser
            .read_le::<u32>()
            .map_err(|_| malformed_error!("Image too small for a metadata root"))?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - 0x{:08x}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        if major_version != 1 || minor_version != 1 {
            return Err(malformed_error!(
                "Unsupported metadata root version {}.{}",
                major_version,
                minor_version
            ));
        }
        let _reserved = parser.read_le::<u32>()?;

        let version_length = parser.read_le::<u32>()?;
        if version_length > MAX_VERSION_LEN {
            return Err(malformed_error!(
                "Version string length {} is too large",
                version_length
            ));
        }
        let version_bytes = parser.read_bytes(version_length as usize)?;
        let version_end = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_bytes.len());
        let version = std::str::from_utf8(&version_bytes[..version_end])
            .map_err(|_| malformed_error!("Version string is not valid UTF-8"))?
            .to_string();

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;
        if stream_count == 0 {
            return Err(malformed_error!("No streams have been found"));
        }

        let mut seen = HashSet::new();
        let mut stream_headers = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let header = StreamHeader::read(&mut parser)?;

            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                _ => {
                    return Err(malformed_error!(
                        "Stream {} at {}+{} reaches outside of the image",
                        header.name,
                        header.offset,
                        header.size
                    ))
                }
            }
            if !seen.insert(header.name.clone()) {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            stream_headers.push(header);
        }

        Ok(Root {
            major_version,
            minor_version,
            version,
            flags,
            stream_headers,
        })
    }

    /// Get the bytes of the stream called `name`
    #[must_use]
    pub fn stream<'a>(&self, data: &'a [u8], name: &str) -> Option<&'a [u8]> {
        self.stream_headers
            .iter()
            .find(|header| header.name == name)
            .map(|header| {
                &data[header.offset as usize..header.offset as usize + header.size as usize]
            })
    }
}

/// Lays out an image: metadata root, stream headers and the 4-byte aligned streams.
pub struct RootBuilder {
    version: String,
    streams: Vec<(&'static str, Vec<u8>)>,
}

impl RootBuilder {
    /// Create a builder for an image with the given version string
    #[must_use]
    pub fn new(version: &str) -> Self {
        RootBuilder {
            version: version.to_string(),
            streams: Vec::new(),
        }
    }

    /// Append a stream; streams are written in the order they are added
    pub fn stream(&mut self, name: &'static str, data: Vec<u8>) -> &mut Self {
        self.streams.push((name, data));
        self
    }

    /// Serialize the image.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the version string is too long or the image
    /// outgrows 32-bit offsets.
    pub fn build(&self) -> Result<Vec<u8>> {
        let padded_version = (self.version.len() + 1 + 3) & !3;
        if padded_version > MAX_VERSION_LEN as usize {
            return Err(malformed_error!("Version string '{}' is too long", self.version));
        }

        let header_size = 20
            + padded_version
            + self
                .streams
                .iter()
                .map(|(name, _)| StreamHeader::size_on_disk(name))
                .sum::<usize>();

        let mut headers = Vec::with_capacity(self.streams.len());
        let mut offset = header_size;
        for (name, data) in &self.streams {
            let size = (data.len() + 3) & !3;
            headers.push(StreamHeader {
                offset: u32::try_from(offset)
                    .map_err(|_| malformed_error!("Image exceeds 4GB"))?,
                size: u32::try_from(size).map_err(|_| malformed_error!("Stream exceeds 4GB"))?,
                name: (*name).to_string(),
            });
            offset += size;
        }

        let mut out = Vec::with_capacity(offset);
        out.write_le::<u32>(CIL_HEADER_MAGIC);
        out.write_le::<u16>(1);
        out.write_le::<u16>(1);
        out.write_le::<u32>(0);
        #[allow(clippy::cast_possible_truncation)]
        out.write_le::<u32>(padded_version as u32);
        out.extend_from_slice(self.version.as_bytes());
        out.align_to(4);
        if out.len() < 16 + padded_version {
            out.resize(16 + padded_version, 0);
        }
        out.write_le::<u16>(0);
        #[allow(clippy::cast_possible_truncation)]
        out.write_le::<u16>(self.streams.len() as u16);
        for header in &headers {
            header.write(&mut out);
        }
        for (_, data) in &self.streams {
            out.extend_from_slice(data);
            out.align_to(4);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            b'H', b'E', b'L', b'L', b'O', 0x00, 0x00, 0x00,
            0x00, 0x60,
            0x01, 0x00,

            0x28, 0x00, 0x00, 0x00, // StreamHeader
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,

            0x00, 0x00, 0x00, 0x00,
        ];

        let parsed_header = Root::read(&header_bytes).unwrap();

        assert_eq!(parsed_header.version, "HELLO");
        assert_eq!(parsed_header.flags, 0x6000);
        assert_eq!(parsed_header.stream_headers.len(), 1);
        assert_eq!(parsed_header.stream_headers[0].offset, 0x28);
        assert_eq!(parsed_header.stream_headers[0].size, 0x4);
        assert_eq!(parsed_header.stream_headers[0].name, "#~");
        assert_eq!(
            parsed_header.stream(&header_bytes, "#~"),
            Some(&[0u8, 0, 0, 0][..])
        );
        assert_eq!(parsed_header.stream(&header_bytes, "#Blob"), None);
    }

    #[test]
    fn build_and_read() {
        let mut builder = RootBuilder::new(DEFAULT_RUNTIME_VERSION);
        builder
            .stream("#Strings", b"\0abc\0".to_vec())
            .stream("#Blob", vec![0]);
        let image = builder.build().unwrap();

        let root = Root::read(&image).unwrap();
        assert_eq!(root.version, DEFAULT_RUNTIME_VERSION);
        assert_eq!(root.stream_headers.len(), 2);
        assert_eq!(&root.stream(&image, "#Strings").unwrap()[..5], b"\0abc\0");
        assert_eq!(root.stream(&image, "#Blob").unwrap(), &[0, 0, 0, 0]);
    }

    #[test]
    fn invalid() {
        assert!(Root::read(&[]).is_err());
        assert!(Root::read(&[0x42, 0x53, 0x4A, 0x43, 0x01, 0x00, 0x01, 0x00]).is_err());

        let mut builder = RootBuilder::new(PDB_VERSION);
        builder.stream("#Blob", vec![0]).stream("#Blob", vec![0]);
        let duplicate = builder.build().unwrap();
        assert!(Root::read(&duplicate).is_err());

        let mut builder = RootBuilder::new(PDB_VERSION);
        builder.stream("#Blob", vec![0; 8]);
        let image = builder.build().unwrap();
        assert!(Root::read(&image[..image.len() - 4]).is_err());
    }
}
