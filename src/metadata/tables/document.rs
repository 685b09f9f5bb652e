use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the Portable PDB `Document` table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRaw {
    /// `#Blob` index of the document name blob
    pub name: u32,
    /// `#GUID` index of the hash algorithm
    pub hash_algorithm: u32,
    /// `#Blob` index of the content hash
    pub hash: u32,
    /// `#GUID` index of the source language
    pub language: u32,
}

impl RowReadable for DocumentRaw {
    const TABLE: TableId = TableId::Document;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* name */            sizes.blob_bytes() +
            /* hash_algorithm */  sizes.guid_bytes() +
            /* hash */            sizes.blob_bytes() +
            /* language */        sizes.guid_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(DocumentRaw {
            name: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            hash_algorithm: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            hash: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            language: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
        })
    }
}

impl RowWritable for DocumentRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le_dyn(self.name, sizes.is_large_blob())?;
        out.write_le_dyn(self.hash_algorithm, sizes.is_large_guid())?;
        out.write_le_dyn(self.hash, sizes.is_large_blob())?;
        out.write_le_dyn(self.language, sizes.is_large_guid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let data = vec![
            0x01, 0x00, // name
            0x01, 0x00, // hash_algorithm
            0x08, 0x00, // hash
            0x02, 0x00, // language
        ];

        let sizes = TableInfo::new(&[(TableId::Document, 1)], 0);
        let row = DocumentRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.name, 1);
        assert_eq!(row.hash, 8);
        assert_eq!(row.language, 2);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }
}
