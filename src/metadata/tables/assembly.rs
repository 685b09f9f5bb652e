use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `Assembly` table (ECMA-335 II.22.2)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyRaw {
    /// `AssemblyHashAlgorithm`
    pub hash_alg_id: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// `AssemblyFlags`
    pub flags: u32,
    /// `#Blob` index of the public key
    pub public_key: u32,
    /// `#Strings` index of the assembly name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
}

impl RowReadable for AssemblyRaw {
    const TABLE: TableId = TableId::Assembly;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* hash_alg_id */       4 +
            /* versions */          8 +
            /* flags */             4 +
            /* public_key */        sizes.blob_bytes() +
            /* name */              sizes.str_bytes() +
            /* culture */           sizes.str_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(AssemblyRaw {
            hash_alg_id: read_le_at::<u32>(data, offset)?,
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}

impl RowWritable for AssemblyRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u32>(self.hash_alg_id);
        out.write_le::<u16>(self.major_version);
        out.write_le::<u16>(self.minor_version);
        out.write_le::<u16>(self.build_number);
        out.write_le::<u16>(self.revision_number);
        out.write_le::<u32>(self.flags);
        out.write_le_dyn(self.public_key, sizes.is_large_blob())?;
        out.write_le_dyn(self.name, sizes.is_large_str())?;
        out.write_le_dyn(self.culture, sizes.is_large_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let data = vec![
            0x04, 0x80, 0x00, 0x00, // hash_alg_id
            0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00, // version
            0x00, 0x00, 0x00, 0x00, // flags
            0x00, 0x00, // public_key
            0x05, 0x00, // name
            0x00, 0x00, // culture
        ];

        let sizes = TableInfo::new(&[(TableId::Assembly, 1)], 0);
        let row = AssemblyRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.hash_alg_id, 0x8004);
        assert_eq!(
            (row.major_version, row.minor_version, row.build_number, row.revision_number),
            (1, 2, 3, 4)
        );
        assert_eq!(row.name, 5);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }
}
