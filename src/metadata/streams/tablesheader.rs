//! The `#~` table stream (ECMA-335 II.24.2.6).
//!
//! Layout of the stream header:
//!
//! | Offset | Size | Field                                             |
//! |--------|------|---------------------------------------------------|
//! | 0      | 4    | Reserved, 0                                       |
//! | 4      | 1    | Major version, 2                                  |
//! | 5      | 1    | Minor version, 0                                  |
//! | 6      | 1    | Heap-size flags                                   |
//! | 7      | 1    | Reserved, 1                                       |
//! | 8      | 8    | `valid` bit vector of present tables              |
//! | 16     | 8    | `sorted` bit vector                               |
//! | 24     | 4*n  | Row counts of the present tables, ascending by id |
//!
//! The rows of all present tables follow, again in ascending table order.

use std::collections::BTreeMap;

use log::trace;

use crate::{
    file::{io::CilWrite, parser::Parser},
    metadata::tables::{row_size, RowReadable, RowWritable, TableId, TableInfo},
    Result,
};

/// Major version of the table stream schema
pub const TABLES_MAJOR_VERSION: u8 = 2;

/// A parsed `#~` stream header with the location of every present table.
pub struct TablesHeader<'a> {
    data: &'a [u8],
    info: TableInfo,
    valid: u64,
    sorted: u64,
    locations: BTreeMap<TableId, (usize, u32)>,
}

impl<'a> TablesHeader<'a> {
    /// Parse the table stream header.
    ///
    /// `allowed` lists the tables that may carry rows in this kind of image.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown or disallowed tables, unexpected
    /// versions, or rows reaching past the end of the stream.
    pub fn from(data: &'a [u8], allowed: &[TableId]) -> Result<TablesHeader<'a>> {
        let mut parser = Parser::new(data);
        let _reserved = parser.read_le::<u32>()?;
        let major_version = parser.read_le::<u8>()?;
        let minor_version = parser.read_le::<u8>()?;
        if major_version != TABLES_MAJOR_VERSION || minor_version != 0 {
            return Err(malformed_error!(
                "Unsupported table stream version {}.{}",
                major_version,
                minor_version
            ));
        }

        let heap_sizes = parser.read_le::<u8>()?;
        let _reserved = parser.read_le::<u8>()?;
        let valid = parser.read_le::<u64>()?;
        let sorted = parser.read_le::<u64>()?;

        let mut row_counts = Vec::new();
        for bit in 0..64_u8 {
            if valid & (1 << bit) == 0 {
                continue;
            }

            let table = TableId::from_repr(bit)
                .filter(|table| allowed.contains(table))
                .ok_or_else(|| malformed_error!("Unsupported metadata table 0x{:02x}", bit))?;
            let rows = parser.read_le::<u32>()?;
            if rows > 0x00FF_FFFF {
                return Err(malformed_error!(
                    "Table {:?} has {} rows, more than a token can address",
                    table,
                    rows
                ));
            }
            row_counts.push((table, rows));
        }

        let info = TableInfo::new(&row_counts, heap_sizes);

        let mut locations = BTreeMap::new();
        let mut offset = parser.pos();
        for (table, rows) in row_counts {
            let size = row_size(table, &info)
                .ok_or_else(|| malformed_error!("Unsupported metadata table {:?}", table))?;
            let length = (size as usize)
                .checked_mul(rows as usize)
                .ok_or_else(|| malformed_error!("Table {:?} size overflows", table))?;
            let end = offset
                .checked_add(length)
                .filter(|end| *end <= data.len())
                .ok_or_else(|| {
                    malformed_error!("Table {:?} reaches past the end of the #~ stream", table)
                })?;

            trace!("table {:?}: {} rows of {} bytes at {}", table, rows, size, offset);
            locations.insert(table, (offset, rows));
            offset = end;
        }

        Ok(TablesHeader {
            data,
            info,
            valid,
            sorted,
            locations,
        })
    }

    /// Index widths and row counts of this stream
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// The `valid` bit vector
    #[must_use]
    pub fn valid(&self) -> u64 {
        self.valid
    }

    /// The `sorted` bit vector
    #[must_use]
    pub fn sorted(&self) -> u64 {
        self.sorted
    }

    /// Number of rows of `table`, 0 if absent
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.info.rows(table)
    }

    /// Parse all rows of the table holding `T`; an absent table yields no rows.
    ///
    /// # Errors
    /// Returns the error of the first row that fails to parse.
    pub fn table<T: RowReadable>(&self) -> Result<Vec<T>> {
        let Some((start, rows)) = self.locations.get(&T::TABLE) else {
            return Ok(Vec::new());
        };

        let mut offset = *start;
        let mut result = Vec::with_capacity(*rows as usize);
        for _ in 0..*rows {
            result.push(T::row_read(self.data, &mut offset, &self.info)?);
        }

        Ok(result)
    }
}

/// Serializer for a `#~` stream.
///
/// Row counts and heap sizes are fixed up front through the [`TableInfo`]; tables must then
/// be added in ascending [`TableId`] order.
pub struct TablesBuilder {
    info: TableInfo,
    valid: u64,
    counts: Vec<u32>,
    rows: Vec<u8>,
    last: Option<TableId>,
}

impl TablesBuilder {
    /// Create a builder for the index widths of `info`
    #[must_use]
    pub fn new(info: TableInfo) -> Self {
        TablesBuilder {
            info,
            valid: 0,
            counts: Vec::new(),
            rows: Vec::new(),
            last: None,
        }
    }

    /// Append all rows of one table; empty tables are omitted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if tables are added out of order, the row count
    /// disagrees with the [`TableInfo`], or a value does not fit its column.
    pub fn add_table<T: RowReadable + RowWritable>(&mut self, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if self.last.is_some_and(|last| last >= T::TABLE) {
            return Err(malformed_error!("Table {:?} added out of order", T::TABLE));
        }

        let count = u32::try_from(rows.len())
            .ok()
            .filter(|count| *count == self.info.rows(T::TABLE))
            .ok_or_else(|| {
                malformed_error!(
                    "Table {:?} has {} rows, layout expects {}",
                    T::TABLE,
                    rows.len(),
                    self.info.rows(T::TABLE)
                )
            })?;

        for row in rows {
            row.row_write(&mut self.rows, &self.info)?;
        }

        self.valid |= T::TABLE.mask();
        self.counts.push(count);
        self.last = Some(T::TABLE);
        Ok(())
    }

    /// Finish the stream, padded to a 4-byte boundary
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.counts.len() * 4 + self.rows.len());
        out.write_le::<u32>(0);
        out.write_le::<u8>(TABLES_MAJOR_VERSION);
        out.write_le::<u8>(0);
        out.write_le::<u8>(self.info.heap_sizes());
        out.write_le::<u8>(1);
        out.write_le::<u64>(self.valid);
        out.write_le::<u64>(0);
        for count in self.counts {
            out.write_le::<u32>(count);
        }
        out.extend_from_slice(&self.rows);
        out.align_to(4);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{CodedIndex, ModuleRaw, TypeRefRaw};

    fn sample_rows() -> (Vec<ModuleRaw>, Vec<TypeRefRaw>) {
        let module = vec![ModuleRaw {
            generation: 0,
            name: 1,
            mvid: 1,
            enc_id: 0,
            enc_base_id: 0,
        }];
        let typerefs = vec![
            TypeRefRaw {
                resolution_scope: CodedIndex::new(TableId::AssemblyRef, 1),
                type_name: 10,
                type_namespace: 20,
            },
            TypeRefRaw {
                resolution_scope: CodedIndex::new(TableId::TypeRef, 1),
                type_name: 30,
                type_namespace: 0,
            },
        ];
        (module, typerefs)
    }

    #[test]
    fn build_and_read() {
        let (module, typerefs) = sample_rows();
        let info = TableInfo::new(&[(TableId::Module, 1), (TableId::TypeRef, 2)], 0);

        let mut builder = TablesBuilder::new(info);
        builder.add_table(&module).unwrap();
        builder.add_table(&typerefs).unwrap();
        builder.add_table::<crate::metadata::tables::TypeDefRaw>(&[]).unwrap();
        let stream = builder.build();

        let header = TablesHeader::from(&stream, &TableId::MODULE_TABLES).unwrap();
        assert_eq!(header.valid(), 0b11);
        assert_eq!(header.rows(TableId::TypeRef), 2);
        assert_eq!(header.table::<ModuleRaw>().unwrap(), module);
        assert_eq!(header.table::<TypeRefRaw>().unwrap(), typerefs);
        assert!(header.table::<crate::metadata::tables::TypeDefRaw>().unwrap().is_empty());
    }

    #[test]
    fn out_of_order() {
        let (module, typerefs) = sample_rows();
        let info = TableInfo::new(&[(TableId::Module, 1), (TableId::TypeRef, 2)], 0);

        let mut builder = TablesBuilder::new(info);
        builder.add_table(&typerefs).unwrap();
        assert!(builder.add_table(&module).is_err());
    }

    #[test]
    fn count_mismatch() {
        let (module, _) = sample_rows();
        let info = TableInfo::new(&[(TableId::Module, 2)], 0);
        assert!(TablesBuilder::new(info).add_table(&module).is_err());
    }

    #[test]
    fn rejects_disallowed_tables() {
        let (module, _) = sample_rows();
        let info = TableInfo::new(&[(TableId::Module, 1)], 0);
        let mut builder = TablesBuilder::new(info);
        builder.add_table(&module).unwrap();
        let stream = builder.build();

        assert!(TablesHeader::from(&stream, &TableId::SYMBOL_TABLES).is_err());
    }

    #[test]
    fn rejects_bad_version_and_truncation() {
        let (module, _) = sample_rows();
        let info = TableInfo::new(&[(TableId::Module, 1)], 0);
        let mut builder = TablesBuilder::new(info);
        builder.add_table(&module).unwrap();
        let mut stream = builder.build();

        let truncated = &stream[..stream.len() - 8];
        assert!(TablesHeader::from(truncated, &TableId::MODULE_TABLES).is_err());

        stream[4] = 3;
        assert!(TablesHeader::from(&stream, &TableId::MODULE_TABLES).is_err());
    }

    #[test]
    fn rejects_unknown_table() {
        let mut stream = vec![0, 0, 0, 0, 2, 0, 0, 1];
        stream.extend_from_slice(&(1_u64 << 0x0C).to_le_bytes());
        stream.extend_from_slice(&0_u64.to_le_bytes());
        stream.extend_from_slice(&1_u32.to_le_bytes());
        assert!(TablesHeader::from(&stream, &TableId::MODULE_TABLES).is_err());
    }
}
