use bitflags::bitflags;

bitflags! {
    /// Kind of an exception handling clause (ECMA-335 II.25.4.6)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// Fault clause (finally that is called on exception only)
        const FAULT = 0x0004;
    }
}

/// One exception handling clause as stored after a method's code, with IL byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Kind of the clause
    pub flags: ExceptionHandlerFlags,
    /// Offset of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Offset of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Class token of a typed clause, or the filter offset of a filter clause
    pub class_token_or_filter: u32,
}

impl ExceptionHandler {
    /// Returns true if all offsets and lengths fit the small section format
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= 0xFFFF
            && self.try_length <= 0xFF
            && self.handler_offset <= 0xFFFF
            && self.handler_length <= 0xFF
    }
}
