use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::tables::{
        CodedIndex, CodedIndexType, RowReadable, RowWritable, TableId, TableInfo,
    },
    Result,
};

/// Raw row of the `MemberRef` table (ECMA-335 II.22.25)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRefRaw {
    /// `MemberRefParent`: the type declaring the member
    pub class: CodedIndex,
    /// `#Strings` index of the member name
    pub name: u32,
    /// `#Blob` index of the method or field signature
    pub signature: u32,
}

impl RowReadable for MemberRefRaw {
    const TABLE: TableId = TableId::MemberRef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* class */     sizes.coded_index_bytes(CodedIndexType::MemberRefParent) +
            /* name */      sizes.str_bytes() +
            /* signature */ sizes.blob_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(MemberRefRaw {
            class: CodedIndex::read(data, offset, sizes, CodedIndexType::MemberRefParent)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for MemberRefRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        self.class.write(out, sizes, CodedIndexType::MemberRefParent)?;
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
            0x09, 0x00, // class: TypeRef 1
            0x02, 0x02, // name
            0x03, 0x03, // signature
        ];

        let sizes = TableInfo::new(&[(TableId::MemberRef, 1), (TableId::TypeRef, 1)], 0);
        let row = MemberRefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.class, CodedIndex::new(TableId::TypeRef, 1));

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }
}
