use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the Portable PDB `MethodDebugInformation` table
///
/// Row *n* describes `MethodDef` row *n* of the module image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDebugInformationRaw {
    /// `Document` row of the first sequence point, 0 if the blob names it
    pub document: u32,
    /// `#Blob` index of the sequence points, 0 for none
    pub sequence_points: u32,
}

impl RowReadable for MethodDebugInformationRaw {
    const TABLE: TableId = TableId::MethodDebugInformation;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* document */          sizes.table_index_bytes(TableId::Document) +
            /* sequence_points */   sizes.blob_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(MethodDebugInformationRaw {
            document: read_le_at_dyn(data, offset, sizes.is_large(TableId::Document))?,
            sequence_points: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for MethodDebugInformationRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le_dyn(self.document, sizes.is_large(TableId::Document))?;
        out.write_le_dyn(self.sequence_points, sizes.is_large_blob())
    }
}
