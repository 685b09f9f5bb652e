use crate::metadata::tables::{CodedIndexType, TableId};

/// Heap-size flag: `#Strings` indexes are 4 bytes wide
pub const HEAP_LARGE_STRINGS: u8 = 0x01;
/// Heap-size flag: `#GUID` indexes are 4 bytes wide
pub const HEAP_LARGE_GUID: u8 = 0x02;
/// Heap-size flag: `#Blob` indexes are 4 bytes wide
pub const HEAP_LARGE_BLOB: u8 = 0x04;

/// Row counts and index widths of one table stream.
///
/// Every column that references a heap or another table is 2 or 4 bytes wide depending on
/// the heap-size flags and on the row counts of the referenced tables. `TableInfo` computes
/// these widths once, both for reading and for writing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    rows: [u32; 64],
    heap_sizes: u8,
}

impl TableInfo {
    /// Create a `TableInfo` from the row counts of the present tables and the heap-size flags
    #[must_use]
    pub fn new(row_counts: &[(TableId, u32)], heap_sizes: u8) -> Self {
        let mut rows = [0_u32; 64];
        for (table, count) in row_counts {
            rows[*table as usize] = *count;
        }

        TableInfo { rows, heap_sizes }
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize]
    }

    /// The heap-size flags byte of the table stream header
    #[must_use]
    pub fn heap_sizes(&self) -> u8 {
        self.heap_sizes
    }

    /// Returns true if `#Strings` indexes are 4 bytes wide
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_STRINGS != 0
    }

    /// Returns true if `#GUID` indexes are 4 bytes wide
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_GUID != 0
    }

    /// Returns true if `#Blob` indexes are 4 bytes wide
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.heap_sizes & HEAP_LARGE_BLOB != 0
    }

    /// Width of a `#Strings` index
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.is_large_str() {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.is_large_guid() {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.is_large_blob() {
            4
        } else {
            2
        }
    }

    /// Returns true if a simple index into `table` is 4 bytes wide
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows(table) > u32::from(u16::MAX)
    }

    /// Width of a simple index into `table`
    #[must_use]
    pub fn table_index_bytes(&self, table: TableId) -> u8 {
        if self.is_large(table) {
            4
        } else {
            2
        }
    }

    /// Width of a coded index of `coded_index_type`
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        let limit = 1_u32 << (16 - coded_index_type.tag_bits());
        let max_rows = coded_index_type
            .tables()
            .iter()
            .map(|table| self.rows(*table))
            .max()
            .unwrap_or(0);

        if max_rows < limit {
            2
        } else {
            4
        }
    }
}
