//! Coded indexes (ECMA-335 II.24.2.6).
//!
//! A coded index packs a table tag into the low bits of a row index, so that a single column
//! can point into one of several tables. The width of the column (2 or 4 bytes) depends on
//! the largest of the candidate tables.

use crate::{
    file::io::{read_le_at_dyn, CilWrite},
    metadata::{
        tables::{TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// The coded index kinds used by the supported tables.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy)]
pub enum CodedIndexType {
    /// `TypeDef`, `TypeRef` or `TypeSpec`; base types and signature type references
    TypeDefOrRef,
    /// `TypeDef`, `TypeRef`, `ModuleRef`, `MethodDef` or `TypeSpec`; parent of a `MemberRef`
    MemberRefParent,
    /// `Module`, `ModuleRef`, `AssemblyRef` or `TypeRef`; scope of a `TypeRef`
    ResolutionScope,
}

impl CodedIndexType {
    /// The candidate tables, in tag order
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
        }
    }

    /// Number of low bits holding the tag
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        match self.tables().len() {
            0..=2 => 1,
            3..=4 => 2,
            _ => 3,
        }
    }
}

/// A decoded coded index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The table the index points into
    pub tag: TableId,
    /// The 1-based row, 0 for a null reference
    pub row: u32,
}

impl CodedIndex {
    /// Create a new coded index
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex { tag, row }
    }

    /// The token of the referenced row
    #[must_use]
    pub fn token(&self) -> Token {
        Token::from_parts(self.tag, self.row)
    }

    /// Returns true for a null reference
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row == 0
    }

    /// Create a coded index from a token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the token's table is not a candidate of `ci_type`.
    pub fn from_token(token: Token, ci_type: CodedIndexType) -> Result<CodedIndex> {
        let tag = ci_type
            .tables()
            .iter()
            .find(|table| **table as u8 == token.table())
            .ok_or_else(|| {
                malformed_error!("Token {} can not be stored as {:?}", token, ci_type)
            })?;

        Ok(CodedIndex::new(*tag, token.row()))
    }

    /// Read a coded index column.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data and [`crate::Error::Malformed`]
    /// for tags outside of `ci_type`.
    pub fn read(
        data: &[u8],
        offset: &mut usize,
        info: &TableInfo,
        ci_type: CodedIndexType,
    ) -> Result<Self> {
        let value = read_le_at_dyn(data, offset, info.coded_index_bytes(ci_type) == 4)?;
        Self::decode(value, ci_type)
    }

    /// Split a raw coded index value into tag and row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for tags outside of `ci_type`.
    pub fn decode(value: u32, ci_type: CodedIndexType) -> Result<Self> {
        let tag_bits = ci_type.tag_bits();
        let tag = (value & ((1 << tag_bits) - 1)) as usize;

        match ci_type.tables().get(tag) {
            Some(table) => Ok(CodedIndex::new(*table, value >> tag_bits)),
            None => Err(malformed_error!(
                "Invalid tag {} for coded index {:?}",
                tag,
                ci_type
            )),
        }
    }

    /// Pack tag and row into a raw value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the tag is not a candidate of `ci_type`.
    pub fn encode(&self, ci_type: CodedIndexType) -> Result<u32> {
        let tag = ci_type
            .tables()
            .iter()
            .position(|table| *table == self.tag)
            .ok_or_else(|| {
                malformed_error!("Table {:?} is not part of {:?}", self.tag, ci_type)
            })?;

        #[allow(clippy::cast_possible_truncation)]
        Ok((self.row << ci_type.tag_bits()) | tag as u32)
    }

    /// Append this coded index as a column of `info`'s layout.
    ///
    /// # Errors
    /// See [`CodedIndex::encode`].
    pub fn write(&self, out: &mut Vec<u8>, info: &TableInfo, ci_type: CodedIndexType) -> Result<()> {
        let value = self.encode(ci_type)?;
        out.write_le_dyn(value, info.coded_index_bytes(ci_type) == 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode() {
        // TypeRef 0x40 as ResolutionScope: (0x40 << 2) | 3
        let index = CodedIndex::decode(0x0103, CodedIndexType::ResolutionScope).unwrap();
        assert_eq!(index, CodedIndex::new(TableId::TypeRef, 0x40));
        assert_eq!(index.token(), Token(0x0100_0040));

        let index = CodedIndex::decode(0x09, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(index, CodedIndex::new(TableId::TypeRef, 2));

        // tag 3 does not exist for TypeDefOrRef
        assert!(CodedIndex::decode(0x03, CodedIndexType::TypeDefOrRef).is_err());
        // tag 5..7 do not exist for MemberRefParent
        assert!(CodedIndex::decode(0x0D, CodedIndexType::MemberRefParent).is_err());
    }

    #[test]
    fn encode() {
        let index = CodedIndex::new(TableId::MethodDef, 7);
        assert_eq!(index.encode(CodedIndexType::MemberRefParent).unwrap(), (7 << 3) | 3);
        assert!(index.encode(CodedIndexType::ResolutionScope).is_err());

        let from_token =
            CodedIndex::from_token(Token(0x2300_0001), CodedIndexType::ResolutionScope).unwrap();
        assert_eq!(from_token, CodedIndex::new(TableId::AssemblyRef, 1));
        assert!(CodedIndex::from_token(Token(0x0600_0001), CodedIndexType::TypeDefOrRef).is_err());
    }

    #[test]
    fn column_width() {
        let small = TableInfo::new(&[(TableId::TypeRef, 10)], 0);
        let large = TableInfo::new(&[(TableId::TypeRef, 0x4000)], 0);

        let mut out = Vec::new();
        let index = CodedIndex::new(TableId::TypeRef, 3);
        index.write(&mut out, &small, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(out.len(), 2);
        index.write(&mut out, &large, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(out.len(), 6);

        let mut offset = 2;
        let read_back = CodedIndex::read(&out, &mut offset, &large, CodedIndexType::TypeDefOrRef)
            .unwrap();
        assert_eq!(read_back, index);
    }
}
