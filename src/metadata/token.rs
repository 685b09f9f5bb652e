//! Metadata tokens: table id and row packed into one `u32`.

use std::fmt;

use crate::metadata::tables::TableId;

/// A metadata token referencing a row of a metadata table.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table
/// - The low 24 bits (bits 0-23) hold the 1-based row index within that table
///
/// Tokens are what CIL instructions carry as operands (`call`, `ldfld`, `newobj`, ...), and
/// what the module graph uses to link types, methods and references with each other. Since
/// the emitter writes every table in graph order, a token stays valid across a read / emit
/// cycle.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token for `row` of `table`
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token((table as u32) << 24 | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the token points into `table`
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(token.is_table(TableId::MethodDef));
        assert!(!token.is_table(TableId::MemberRef));

        let max_token = Token(0xFFFF_FFFF);
        assert_eq!(max_token.table(), 0xFF);
        assert_eq!(max_token.row(), 0x00FF_FFFF);
    }

    #[test]
    fn from_parts() {
        assert_eq!(Token::from_parts(TableId::MemberRef, 3), Token(0x0A00_0003));
        assert_eq!(Token::from_parts(TableId::Module, 1), Token(0x0000_0001));
        assert_eq!(
            Token::from_parts(TableId::StandAloneSig, 0x0100_0002),
            Token(0x1100_0002)
        );
    }

    #[test]
    fn null() {
        assert!(Token::default().is_null());
        assert!(!Token(0x0200_0001).is_null());
    }

    #[test]
    fn formatting() {
        let token = Token(0x0600_0001);
        assert_eq!(format!("{token}"), "0x06000001");

        let debug_str = format!("{token:?}");
        assert!(debug_str.contains("Token(0x06000001"));
        assert!(debug_str.contains("table: 0x06"));
        assert!(debug_str.contains("row: 1"));
    }

    #[test]
    fn ordering() {
        assert!(Token(0x0600_0001) < Token(0x0600_0002));
        assert!(Token(0x0600_0002) < Token(0x0700_0001));
    }
}
