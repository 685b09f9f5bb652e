use bitflags::bitflags;

/// Mask of the access bits of `MethodAttributes`
pub const METHOD_ACCESS_MASK: u16 = 0x0007;

/// Mask of the code type bits of `MethodImplAttributes`
pub const METHOD_IMPL_CODE_TYPE_MASK: u16 = 0x0003;

bitflags! {
    /// Access of a method (ECMA-335 II.23.1.10), stored in the low bits of its flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodAccessFlags: u16 {
        /// Member not referenceable
        const COMPILER_CONTROLLED = 0x0000;
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone
        const PUBLIC = 0x0006;
    }
}

impl MethodAccessFlags {
    /// Extract the access bits of a method's flags
    #[must_use]
    pub fn from_method_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & METHOD_ACCESS_MASK)
    }
}

bitflags! {
    /// Method attributes besides the access bits (ECMA-335 II.23.1.10)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodModifiers: u16 {
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method can not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Runtime should check name encoding
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodModifiers {
    /// Extract the modifier bits of a method's flags
    #[must_use]
    pub fn from_method_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & !METHOD_ACCESS_MASK)
    }
}

bitflags! {
    /// Code type of a method implementation (ECMA-335 II.23.1.11)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodImplCodeType: u16 {
        /// Method impl is CIL
        const IL = 0x0000;
        /// Method impl is native
        const NATIVE = 0x0001;
        /// Reserved
        const OPTIL = 0x0002;
        /// Method impl is provided by the runtime
        const RUNTIME = 0x0003;
    }
}

impl MethodImplCodeType {
    /// Extract the code type of a method's implementation flags
    #[must_use]
    pub fn from_impl_flags(flags: u16) -> Self {
        Self::from_bits_truncate(flags & METHOD_IMPL_CODE_TYPE_MASK)
    }
}

bitflags! {
    /// Flags of a method body header (ECMA-335 II.25.4.4)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header, the code size is stored in the upper 6 bits
        const TINY_FORMAT = 0x2;
        /// Fat header
        const FAT_FORMAT = 0x3;
        /// More sections follow the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all locals
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags of an extra data section after the code (ECMA-335 II.25.4.5)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling data
        const EHTABLE = 0x1;
        /// Reserved
        const OPT_ILTABLE = 0x2;
        /// Data format is of the fat variety
        const FAT_FORMAT = 0x40;
        /// Another data section occurs after this one
        const MORE_SECTS = 0x80;
    }
}
