use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{
        CodedIndex, CodedIndexType, RowReadable, RowWritable, TableId, TableInfo,
    },
    Result,
};

/// Raw row of the `TypeDef` table (ECMA-335 II.22.37)
///
/// `field_list` and `method_list` mark the first row of a run that extends to the next
/// type's first row, or to the end of the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDefRaw {
    /// `TypeAttributes`
    pub flags: u32,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace
    pub type_namespace: u32,
    /// `TypeDefOrRef` of the base type, null for interfaces and `System.Object`
    pub extends: CodedIndex,
    /// First row of the owned `Field` run
    pub field_list: u32,
    /// First row of the owned `MethodDef` run
    pub method_list: u32,
}

impl RowReadable for TypeDefRaw {
    const TABLE: TableId = TableId::TypeDef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* flags */             4 +
            /* type_name */         sizes.str_bytes() +
            /* type_namespace */    sizes.str_bytes() +
            /* extends */           sizes.coded_index_bytes(CodedIndexType::TypeDefOrRef) +
            /* field_list */        sizes.table_index_bytes(TableId::Field) +
            /* method_list */       sizes.table_index_bytes(TableId::MethodDef)
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(TypeDefRaw {
            flags: read_le_at::<u32>(data, offset)?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            extends: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
            field_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Field))?,
            method_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::MethodDef))?,
        })
    }
}

impl RowWritable for TypeDefRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u32>(self.flags);
        out.write_le_dyn(self.type_name, sizes.is_large_str())?;
        out.write_le_dyn(self.type_namespace, sizes.is_large_str())?;
        self.extends.write(out, sizes, CodedIndexType::TypeDefOrRef)?;
        out.write_le_dyn(self.field_list, sizes.is_large(TableId::Field))?;
        out.write_le_dyn(self.method_list, sizes.is_large(TableId::MethodDef))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted_short() {
        let data = vec![
            0x01, 0x00, 0x10, 0x00, // flags
            0x02, 0x02, // type_name
            0x03, 0x03, // type_namespace
            0x05, 0x00, // extends: TypeRef 1
            0x01, 0x00, // field_list
            0x02, 0x00, // method_list
        ];

        let sizes = TableInfo::new(&[(TableId::TypeDef, 2), (TableId::TypeRef, 1)], 0);
        let row = TypeDefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.flags, 0x0010_0001);
        assert_eq!(row.extends, CodedIndex::new(TableId::TypeRef, 1));
        assert_eq!(row.field_list, 1);
        assert_eq!(row.method_list, 2);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn large_method_list() {
        let sizes = TableInfo::new(&[(TableId::MethodDef, 0x1_0000)], 0);
        assert_eq!(TypeDefRaw::row_size(&sizes), 4 + 2 + 2 + 2 + 2 + 4);
    }
}
