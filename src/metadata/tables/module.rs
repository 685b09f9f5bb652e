use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `Module` table (ECMA-335 II.22.30)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleRaw {
    /// Reserved, shall be zero
    pub generation: u16,
    /// `#Strings` index of the module name
    pub name: u32,
    /// `#GUID` index of the module version id
    pub mvid: u32,
    /// `#GUID` index, reserved
    pub enc_id: u32,
    /// `#GUID` index, reserved
    pub enc_base_id: u32,
}

impl RowReadable for ModuleRaw {
    const TABLE: TableId = TableId::Module;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* generation */  2 +
            /* name */        sizes.str_bytes() +
            /* mvid */        sizes.guid_bytes() +
            /* encid */       sizes.guid_bytes() +
            /* encbaseid */   sizes.guid_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(ModuleRaw {
            generation: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            mvid: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            enc_id: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
            enc_base_id: read_le_at_dyn(data, offset, sizes.is_large_guid())?,
        })
    }
}

impl RowWritable for ModuleRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u16>(self.generation);
        out.write_le_dyn(self.name, sizes.is_large_str())?;
        out.write_le_dyn(self.mvid, sizes.is_large_guid())?;
        out.write_le_dyn(self.enc_id, sizes.is_large_guid())?;
        out.write_le_dyn(self.enc_base_id, sizes.is_large_guid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted_short() {
        let data = vec![
            0x01, 0x01, // generation
            0x02, 0x02, // name
            0x03, 0x03, // mvid
            0x04, 0x04, // encid
            0x05, 0x05, // encbaseid
        ];

        let sizes = TableInfo::new(&[(TableId::Module, 1)], 0);
        assert_eq!(ModuleRaw::row_size(&sizes) as usize, data.len());

        let row = ModuleRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.generation, 0x0101);
        assert_eq!(row.name, 0x0202);
        assert_eq!(row.mvid, 0x0303);
        assert_eq!(row.enc_id, 0x0404);
        assert_eq!(row.enc_base_id, 0x0505);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn crafted_long() {
        let data = vec![
            0x01, 0x01, // generation
            0x02, 0x02, 0x02, 0x02, // name
            0x03, 0x03, 0x03, 0x03, // mvid
            0x04, 0x04, 0x04, 0x04, // encid
            0x05, 0x05, 0x05, 0x05, // encbaseid
        ];

        let sizes = TableInfo::new(&[(TableId::Module, 1)], 0x03);
        let row = ModuleRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.name, 0x0202_0202);
        assert_eq!(row.enc_base_id, 0x0505_0505);
    }
}
