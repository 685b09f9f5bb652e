//! Metadata tables of module and symbol images.
//!
//! Each supported table has a `*Raw` row type that mirrors the physical columns: heap
//! indexes, simple indexes and [`CodedIndex`] values, with column widths taken from a
//! [`TableInfo`]. Rows are read through [`RowReadable`] and written through [`RowWritable`];
//! the module reader and the emitter translate between these rows and the object graph.

mod assembly;
mod assemblyref;
mod codedindex;
mod document;
mod field;
mod memberref;
mod methoddebuginformation;
mod methoddef;
mod module;
mod param;
mod standalonesig;
mod tableid;
mod tableinfo;
mod typedef;
mod typeref;

pub use assembly::AssemblyRaw;
pub use assemblyref::AssemblyRefRaw;
pub use codedindex::{CodedIndex, CodedIndexType};
pub use document::DocumentRaw;
pub use field::FieldRaw;
pub use memberref::MemberRefRaw;
pub use methoddebuginformation::MethodDebugInformationRaw;
pub use methoddef::MethodDefRaw;
pub use module::ModuleRaw;
pub use param::ParamRaw;
pub use standalonesig::StandAloneSigRaw;
pub use tableid::TableId;
pub use tableinfo::{TableInfo, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS};
pub use typedef::TypeDefRaw;
pub use typeref::TypeRefRaw;

use crate::Result;

/// A row type that can be parsed from a table stream
pub trait RowReadable: Sized {
    /// The table holding rows of this type
    const TABLE: TableId;

    /// Size of one row in bytes, for the given index widths
    fn row_size(sizes: &TableInfo) -> u32;

    /// Parse one row at `offset`, advancing it by [`RowReadable::row_size`].
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data and [`crate::Error::Malformed`]
    /// for invalid coded index tags.
    fn row_read(data: &[u8], offset: &mut usize, sizes: &TableInfo) -> Result<Self>;
}

/// A row type that can be serialized into a table stream
pub trait RowWritable {
    /// Append this row to `out`, using the index widths of `sizes`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a value does not fit its column.
    fn row_write(&self, out: &mut Vec<u8>, sizes: &TableInfo) -> Result<()>;
}

/// Row size of `table`, or `None` for tables that only exist as coded index tags
#[must_use]
pub fn row_size(table: TableId, sizes: &TableInfo) -> Option<u32> {
    let size = match table {
        TableId::Module => ModuleRaw::row_size(sizes),
        TableId::TypeRef => TypeRefRaw::row_size(sizes),
        TableId::TypeDef => TypeDefRaw::row_size(sizes),
        TableId::Field => FieldRaw::row_size(sizes),
        TableId::MethodDef => MethodDefRaw::row_size(sizes),
        TableId::Param => ParamRaw::row_size(sizes),
        TableId::MemberRef => MemberRefRaw::row_size(sizes),
        TableId::StandAloneSig => StandAloneSigRaw::row_size(sizes),
        TableId::Assembly => AssemblyRaw::row_size(sizes),
        TableId::AssemblyRef => AssemblyRefRaw::row_size(sizes),
        TableId::Document => DocumentRaw::row_size(sizes),
        TableId::MethodDebugInformation => MethodDebugInformationRaw::row_size(sizes),
        TableId::ModuleRef | TableId::TypeSpec => return None,
    };

    Some(size)
}
