use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::tables::{
        CodedIndex, CodedIndexType, RowReadable, RowWritable, TableId, TableInfo,
    },
    Result,
};

/// Raw row of the `TypeRef` table (ECMA-335 II.22.38)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeRefRaw {
    /// `ResolutionScope`: the assembly, module or enclosing type defining this type
    pub resolution_scope: CodedIndex,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
}

impl RowReadable for TypeRefRaw {
    const TABLE: TableId = TableId::TypeRef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* resolution_scope */  sizes.coded_index_bytes(CodedIndexType::ResolutionScope) +
            /* type_name */         sizes.str_bytes() +
            /* type_namespace */    sizes.str_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(TypeRefRaw {
            resolution_scope: CodedIndex::read(
                data,
                offset,
                sizes,
                CodedIndexType::ResolutionScope,
            )?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

impl RowWritable for TypeRefRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        self.resolution_scope
            .write(out, sizes, CodedIndexType::ResolutionScope)?;
        out.write_le_dyn(self.type_name, sizes.is_large_str())?;
        out.write_le_dyn(self.type_namespace, sizes.is_large_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted_short() {
        let data = vec![
            0x06, 0x00, // resolution_scope: AssemblyRef 1
            0x02, 0x02, // type_name
            0x03, 0x03, // type_namespace
        ];

        let sizes = TableInfo::new(&[(TableId::AssemblyRef, 1)], 0);
        let row = TypeRefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(
            row.resolution_scope,
            CodedIndex::new(TableId::AssemblyRef, 1)
        );
        assert_eq!(row.type_name, 0x0202);
        assert_eq!(row.type_namespace, 0x0303);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn crafted_long() {
        let data = vec![
            0x07, 0x00, 0x01, 0x00, // resolution_scope: TypeRef 0x4001
            0x02, 0x02, 0x02, 0x02, // type_name
            0x03, 0x03, 0x03, 0x03, // type_namespace
        ];

        let sizes = TableInfo::new(&[(TableId::TypeRef, 0x4001)], 0x01);
        assert_eq!(TypeRefRaw::row_size(&sizes), 12);

        let row = TypeRefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.resolution_scope, CodedIndex::new(TableId::TypeRef, 0x4001));
        assert_eq!(row.type_name, 0x0202_0202);
    }
}
