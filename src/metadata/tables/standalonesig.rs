use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `StandAloneSig` table (ECMA-335 II.22.36)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandAloneSigRaw {
    /// `#Blob` index of the signature
    pub signature: u32,
}

impl RowReadable for StandAloneSigRaw {
    const TABLE: TableId = TableId::StandAloneSig;

    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(sizes.blob_bytes())
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(StandAloneSigRaw {
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for StandAloneSigRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le_dyn(self.signature, sizes.is_large_blob())
    }
}
