use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `Param` table (ECMA-335 II.22.33)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamRaw {
    /// `ParamAttributes`
    pub flags: u16,
    /// 0 for the return value, 1.. for the parameters
    pub sequence: u16,
    /// `#Strings` index of the parameter name
    pub name: u32,
}

impl RowReadable for ParamRaw {
    const TABLE: TableId = TableId::Param;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* flags */     2 +
            /* sequence */  2 +
            /* name */      sizes.str_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(ParamRaw {
            flags: read_le_at::<u16>(data, offset)?,
            sequence: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

impl RowWritable for ParamRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u16>(self.flags);
        out.write_le::<u16>(self.sequence);
        out.write_le_dyn(self.name, sizes.is_large_str())
    }
}
