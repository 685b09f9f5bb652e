use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `MethodDef` table (ECMA-335 II.22.26)
///
/// In a module image the `rva` column is an offset into the `#IL` stream; 0 means the method
/// has no body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDefRaw {
    /// Offset of the method body in `#IL`, 0 for none
    pub rva: u32,
    /// `MethodImplAttributes`
    pub impl_flags: u16,
    /// `MethodAttributes`
    pub flags: u16,
    /// `#Strings` index of the method name
    pub name: u32,
    /// `#Blob` index of the method signature
    pub signature: u32,
    /// First row of the owned `Param` run
    pub param_list: u32,
}

impl RowReadable for MethodDefRaw {
    const TABLE: TableId = TableId::MethodDef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* rva */           4 +
            /* impl_flags */    2 +
            /* flags */         2 +
            /* name */          sizes.str_bytes() +
            /* signature */     sizes.blob_bytes() +
            /* param_list */    sizes.table_index_bytes(TableId::Param)
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(MethodDefRaw {
            rva: read_le_at::<u32>(data, offset)?,
            impl_flags: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            param_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Param))?,
        })
    }
}

impl RowWritable for MethodDefRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u32>(self.rva);
        out.write_le::<u16>(self.impl_flags);
        out.write_le::<u16>(self.flags);
        out.write_le_dyn(self.name, sizes.is_large_str())?;
        out.write_le_dyn(self.signature, sizes.is_large_blob())?;
        out.write_le_dyn(self.param_list, sizes.is_large(TableId::Param))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted_short() {
        let data = vec![
            0x04, 0x00, 0x00, 0x00, // rva
            0x00, 0x00, // impl_flags
            0x96, 0x00, // flags
            0x02, 0x02, // name
            0x03, 0x03, // signature
            0x01, 0x00, // param_list
        ];

        let sizes = TableInfo::new(&[(TableId::MethodDef, 1), (TableId::Param, 1)], 0);
        let row = MethodDefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.rva, 4);
        assert_eq!(row.flags, 0x96);
        assert_eq!(row.param_list, 1);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn large_param_list() {
        let sizes = TableInfo::new(&[(TableId::Param, 0x1_0000)], 0);
        assert_eq!(MethodDefRaw::row_size(&sizes), 4 + 2 + 2 + 2 + 2 + 4);
    }
}
