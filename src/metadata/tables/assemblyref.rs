use crate::{
    file::io::{read_le_at, read_le_at_dyn, CilWrite},
    metadata::tables::{RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Raw row of the `AssemblyRef` table (ECMA-335 II.22.5)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblyRefRaw {
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
    /// `#Blob` index of the public key or its token
    pub public_key_or_token: u32,
    /// `#Strings` index of the assembly name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

impl RowReadable for AssemblyRefRaw {
    const TABLE: TableId = TableId::AssemblyRef;

    #[rustfmt::skip]
    fn row_size(sizes: &TableInfo) -> u32 {
        u32::from(
            /* versions */              8 +
            /* flags */                 4 +
            /* public_key_or_token */   sizes.blob_bytes() +
            /* name */                  sizes.str_bytes() +
            /* culture */               sizes.str_bytes() +
            /* hash_value */            sizes.blob_bytes()
        )
    }

    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self> {
        Ok(AssemblyRefRaw {
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key_or_token: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            hash_value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

impl RowWritable for AssemblyRefRaw {
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()> {
        out.write_le::<u16>(self.major_version);
        out.write_le::<u16>(self.minor_version);
        out.write_le::<u16>(self.build_number);
        out.write_le::<u16>(self.revision_number);
        out.write_le::<u32>(self.flags);
        out.write_le_dyn(self.public_key_or_token, sizes.is_large_blob())?;
        out.write_le_dyn(self.name, sizes.is_large_str())?;
        out.write_le_dyn(self.culture, sizes.is_large_str())?;
        out.write_le_dyn(self.hash_value, sizes.is_large_blob())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let data = vec![
            0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // version
            0x00, 0x00, 0x00, 0x00, // flags
            0x01, 0x00, // public_key_or_token
            0x0A, 0x00, // name
            0x00, 0x00, // culture
            0x00, 0x00, // hash_value
        ];

        let sizes = TableInfo::new(&[(TableId::AssemblyRef, 1)], 0);
        assert_eq!(AssemblyRefRaw::row_size(&sizes) as usize, data.len());

        let row = AssemblyRefRaw::row_read(&data, &mut 0, &sizes).unwrap();
        assert_eq!(row.major_version, 8);
        assert_eq!(row.public_key_or_token, 1);
        assert_eq!(row.name, 0x0A);

        let mut out = Vec::new();
        row.row_write(&mut out, &sizes).unwrap();
        assert_eq!(out, data);
    }
}
