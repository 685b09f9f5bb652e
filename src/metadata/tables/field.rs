use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `Field` table (ECMA-335 II.22.15)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRaw {
    /// `FieldAttributes`
    pub flags: u16,
    /// `#Strings` index of the field name
    pub name: u32,
    /// `#Blob` index of the field signature
    pub signature: u32,
}

impl RowReadable for FieldRaw {
    const TABLE: TableId = TableId::Field;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* flags */     2 +
            /* name */      sizes.str_bytes() +
            /* signature */ sizes.blob_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(FieldRaw {
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for FieldRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u16>(self.flags);
        out.write_le_dyn(self.name, sizes.is_large_str())?;
        out.write_le_dyn(self.signature, sizes.is_large_blob())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let data = vec![
            0x16, 0x00, // flags
            0x02, 0x02, // name
            0x03, 0x03, 0x03, 0x03, // signature
        ];

        let sizes = TableInfo::new(&[(TableId::Field, 1)], 0x04);
        let row = FieldRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.flags, 0x16);
        assert_eq!(row.name, 0x0202);
        assert_eq!(row.signature, 0x0303_0303);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }
}
