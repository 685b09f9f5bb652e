//! Debug records linking a module image with its symbol image.
//!
//! The module image carries a `#CV` stream naming the symbol file and its 20-byte identifier.
//! The symbol image starts with a `#Pdb` stream repeating that identifier together with the
//! entry point and the row counts of the module's tables. Documents of the symbol image store
//! their path as a Portable PDB document-name blob.

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::{
        streams::{Blob, BlobHeapBuilder},
        tables::TableId,
        token::Token,
    },
    Result,
};

/// Length of the identifier shared by a module image and its symbol image
pub const PDB_ID_SIZE: usize = 20;

/// Signature of the `#CV` record
pub const CODEVIEW_SIGNATURE: u32 = 0x5344_5352;

/// Hash algorithm of a `Document`: SHA-1
pub const HASH_ALGORITHM_SHA1: uguid::Guid = uguid::guid!("ff1816ec-aa5e-4d10-87f7-6f4963833460");

/// Hash algorithm of a `Document`: SHA-256
pub const HASH_ALGORITHM_SHA256: uguid::Guid =
    uguid::guid!("8829d00f-11b8-4213-878b-770e8597ac16");

/// Language of a `Document`: C#
pub const LANGUAGE_CSHARP: uguid::Guid = uguid::guid!("3f5162f8-07c6-11d3-9053-00c04fa302a1");

/// The `#CV` stream of a module image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewRecord {
    /// Identifier of the matching symbol image
    pub id: [u8; PDB_ID_SIZE],
    /// Incremented each time the symbol file is rewritten in place
    pub age: u32,
    /// File name of the symbol image
    pub path: String,
}

impl CodeViewRecord {
    /// Parse the `#CV` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a wrong signature or a truncated record.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let signature = parser
            .read_le::<u32>()
            .map_err(|_| malformed_error!("#CV stream too small"))?;
        if signature != CODEVIEW_SIGNATURE {
            return Err(malformed_error!("Invalid #CV signature - 0x{:08x}", signature));
        }

        let mut id = [0_u8; PDB_ID_SIZE];
        id.copy_from_slice(
            parser
                .read_bytes(PDB_ID_SIZE)
                .map_err(|_| malformed_error!("#CV stream truncated"))?,
        );
        let age = parser.read_le::<u32>()?;
        let path = parser.read_string_utf8()?;

        Ok(CodeViewRecord { id, age, path })
    }

    /// Serialize the record; the stream is padded by the metadata root
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(29 + self.path.len());
        out.write_le::<u32>(CODEVIEW_SIGNATURE);
        out.extend_from_slice(&self.id);
        out.write_le::<u32>(self.age);
        out.extend_from_slice(self.path.as_bytes());
        out.push(0);
        out
    }
}

/// The `#Pdb` stream of a symbol image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdbStream {
    /// Identifier matching the module's [`CodeViewRecord`]
    pub id: [u8; PDB_ID_SIZE],
    /// Entry point of the module, null if none
    pub entry_point: Token,
    /// Row counts of the module tables referenced by the symbol image
    pub type_system_rows: Vec<(TableId, u32)>,
}

impl PdbStream {
    /// Parse the `#Pdb` stream.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for truncated data and unknown referenced tables.
    pub fn read(data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let mut id = [0_u8; PDB_ID_SIZE];
        id.copy_from_slice(
            parser
                .read_bytes(PDB_ID_SIZE)
                .map_err(|_| malformed_error!("#Pdb stream truncated"))?,
        );
        let entry_point = Token::new(parser.read_le::<u32>()?);
        let referenced = parser.read_le::<u64>()?;

        let mut type_system_rows = Vec::new();
        for bit in 0..64_u8 {
            if referenced & (1 << bit) == 0 {
                continue;
            }

            let table = TableId::from_repr(bit)
                .filter(|table| TableId::MODULE_TABLES.contains(table))
                .ok_or_else(|| {
                    malformed_error!("#Pdb references unsupported table 0x{:02x}", bit)
                })?;
            type_system_rows.push((table, parser.read_le::<u32>()?));
        }

        Ok(PdbStream {
            id,
            entry_point,
            type_system_rows,
        })
    }

    /// Recorded row count of `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> Option<u32> {
        self.type_system_rows
            .iter()
            .find(|(id, _)| *id == table)
            .map(|(_, rows)| *rows)
    }

    /// Serialize the stream; `type_system_rows` must be in ascending table order
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.type_system_rows.len() * 4);
        out.extend_from_slice(&self.id);
        out.write_le::<u32>(self.entry_point.value());
        out.write_le::<u64>(
            self.type_system_rows
                .iter()
                .fold(0, |mask, (table, _)| mask | table.mask()),
        );
        for (_, rows) in &self.type_system_rows {
            out.write_le::<u32>(*rows);
        }
        out
    }
}

/// Decode a document-name blob: a separator byte followed by blob indexes of the parts.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid part indexes or non UTF-8 parts.
pub fn parse_document_name(data: &[u8], blobs: &Blob) -> Result<String> {
    let mut parser = Parser::new(data);
    let separator = parser
        .read_le::<u8>()
        .map_err(|_| malformed_error!("Empty document name blob"))?;

    let mut parts = Vec::new();
    while parser.has_more_data() {
        let index = parser.read_compressed_uint()?;
        let part = blobs.get(index as usize)?;
        parts.push(
            std::str::from_utf8(part)
                .map_err(|_| malformed_error!("Document name part is not valid UTF-8"))?,
        );
    }

    if separator == 0 {
        Ok(parts.concat())
    } else {
        Ok(parts.join(char::from(separator).to_string().as_str()))
    }
}

/// Encode `name` as a document-name blob, adding the parts to `blobs`.
///
/// Returns the blob index of the name itself.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the heap outgrows compressed indexes.
pub fn encode_document_name(name: &str, blobs: &mut BlobHeapBuilder) -> Result<u32> {
    let separator = if name.contains('/') {
        Some('/')
    } else if name.contains('\\') {
        Some('\\')
    } else {
        None
    };

    let mut data = Vec::new();
    match separator {
        Some(separator) => {
            #[allow(clippy::cast_possible_truncation)]
            data.push(separator as u8);
            for part in name.split(separator) {
                data.write_compressed_uint(blobs.add(part.as_bytes())?)?;
            }
        }
        None => {
            data.push(0);
            data.write_compressed_uint(blobs.add(name.as_bytes())?)?;
        }
    }

    blobs.add(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::streams::HeapBuilder;

    #[test]
    fn codeview_roundtrip() {
        let record = CodeViewRecord {
            id: [7; PDB_ID_SIZE],
            age: 1,
            path: "Game.pdb".to_string(),
        };
        let data = record.build();
        assert_eq!(&data[..4], b"RSDS");
        assert_eq!(CodeViewRecord::read(&data).unwrap(), record);

        assert!(CodeViewRecord::read(b"NB10").is_err());
        assert!(CodeViewRecord::read(&data[..10]).is_err());
    }

    #[test]
    fn pdb_stream() {
        let stream = PdbStream {
            id: [1; PDB_ID_SIZE],
            entry_point: Token::from_parts(TableId::MethodDef, 2),
            type_system_rows: vec![(TableId::TypeDef, 3), (TableId::MethodDef, 9)],
        };
        let data = stream.build();
        assert_eq!(data.len(), 20 + 4 + 8 + 8);

        let parsed = PdbStream::read(&data).unwrap();
        assert_eq!(parsed, stream);
        assert_eq!(parsed.rows(TableId::MethodDef), Some(9));
        assert_eq!(parsed.rows(TableId::Field), None);

        let mut unknown = data.clone();
        unknown[24..32].copy_from_slice(&(1_u64 << 0x30).to_le_bytes());
        assert!(PdbStream::read(&unknown).is_err());
    }

    #[test]
    fn document_names() {
        let mut builder = BlobHeapBuilder::new();
        let unix = encode_document_name("/src/game/Program.cs", &mut builder).unwrap();
        let windows = encode_document_name("C:\\src\\Program.cs", &mut builder).unwrap();
        let plain = encode_document_name("Program.cs", &mut builder).unwrap();
        let heap = builder.build();

        let blobs = Blob::from(&heap).unwrap();
        for (index, expected) in [
            (unix, "/src/game/Program.cs"),
            (windows, "C:\\src\\Program.cs"),
            (plain, "Program.cs"),
        ] {
            let data = blobs.get(index as usize).unwrap();
            assert_eq!(parse_document_name(data, &blobs).unwrap(), expected);
        }
    }
}
