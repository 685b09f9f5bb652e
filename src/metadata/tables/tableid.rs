use strum::{EnumIter, FromRepr};

/// Identifiers of the metadata tables known to this crate (ECMA-335 II.22, Portable PDB).
///
/// The discriminant is the table number as used in the `valid` bit vector of the table
/// stream and in the high byte of a [`crate::metadata::token::Token`].
///
/// `ModuleRef` and `TypeSpec` only appear as tags of coded indexes; images containing rows
/// for them are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, FromRepr)]
#[repr(u8)]
pub enum TableId {
    /// `Module`, exactly one row
    Module = 0x00,
    /// `TypeRef`, types defined in other modules
    TypeRef = 0x01,
    /// `TypeDef`, types defined in this module
    TypeDef = 0x02,
    /// `Field`
    Field = 0x04,
    /// `MethodDef`
    MethodDef = 0x06,
    /// `Param`
    Param = 0x08,
    /// `MemberRef`, fields and methods of referenced types
    MemberRef = 0x0A,
    /// `StandAloneSig`, local variable signatures
    StandAloneSig = 0x11,
    /// `ModuleRef`
    ModuleRef = 0x1A,
    /// `TypeSpec`
    TypeSpec = 0x1B,
    /// `Assembly`, at most one row
    Assembly = 0x20,
    /// `AssemblyRef`
    AssemblyRef = 0x23,
    /// `Document` of the symbol image
    Document = 0x30,
    /// `MethodDebugInformation` of the symbol image, parallel to `MethodDef`
    MethodDebugInformation = 0x31,
}

impl TableId {
    /// Tables that may carry rows in a module image
    pub const MODULE_TABLES: [TableId; 10] = [
        TableId::Module,
        TableId::TypeRef,
        TableId::TypeDef,
        TableId::Field,
        TableId::MethodDef,
        TableId::Param,
        TableId::MemberRef,
        TableId::StandAloneSig,
        TableId::Assembly,
        TableId::AssemblyRef,
    ];

    /// Tables that may carry rows in a symbol image
    pub const SYMBOL_TABLES: [TableId; 2] = [TableId::Document, TableId::MethodDebugInformation];

    /// Bit of this table in the `valid` vector of the table stream
    #[must_use]
    pub fn mask(self) -> u64 {
        1_u64 << (self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr() {
        assert_eq!(TableId::from_repr(0x06), Some(TableId::MethodDef));
        assert_eq!(TableId::from_repr(0x31), Some(TableId::MethodDebugInformation));
        assert_eq!(TableId::from_repr(0x0C), None);
        assert_eq!(TableId::AssemblyRef.mask(), 1 << 0x23);
    }

    #[test]
    fn ordered() {
        use strum::IntoEnumIterator;

        let ids: Vec<u8> = TableId::iter().map(|id| id as u8).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
