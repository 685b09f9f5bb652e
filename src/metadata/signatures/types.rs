use crate::metadata::token::Token;

#[allow(non_snake_case, missing_docs)]
/// Element types used in signature blobs (ECMA-335 II.23.1.16)
pub mod ELEMENT_TYPE {
    /// Marks the end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    /// Followed by type
    pub const PTR: u8 = 0x0f;
    /// Followed by type
    pub const BYREF: u8 = 0x10;
    /// Followed by `TypeDefOrRefOrSpecEncoded`
    pub const VALUETYPE: u8 = 0x11;
    /// Followed by `TypeDefOrRefOrSpecEncoded`
    pub const CLASS: u8 = 0x12;
    /// Generic parameter of a type, followed by its number
    pub const VAR: u8 = 0x13;
    /// type rank boundsCount bound1 ... loCount lo1 ...
    pub const ARRAY: u8 = 0x14;
    /// Generic type instantiation, followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    /// `System.IntPtr`
    pub const I: u8 = 0x18;
    /// `System.UIntPtr`
    pub const U: u8 = 0x19;
    /// Followed by a full method signature
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    /// Single-dimensional array with lower bound 0
    pub const SZARRAY: u8 = 0x1d;
    /// Generic parameter of a method, followed by its number
    pub const MVAR: u8 = 0x1e;
    /// Required modifier, followed by a `TypeDefOrRefOrSpecEncoded`
    pub const CMOD_REQD: u8 = 0x1f;
    /// Optional modifier, followed by a `TypeDefOrRefOrSpecEncoded`
    pub const CMOD_OPT: u8 = 0x20;
    /// Separates fixed and variable arguments of a vararg call site
    pub const SENTINEL: u8 = 0x41;
    /// Pinned local
    pub const PINNED: u8 = 0x45;
}

#[allow(non_snake_case, missing_docs)]
/// First byte of a signature blob (ECMA-335 II.23.2.1 - II.23.2.6)
pub mod SIGNATURE_HEADER {
    /// Calling convention mask of a method signature
    pub const CALLING_CONVENTION_MASK: u8 = 0x0F;
    pub const DEFAULT: u8 = 0x00;
    pub const C: u8 = 0x01;
    pub const STDCALL: u8 = 0x02;
    pub const THISCALL: u8 = 0x03;
    pub const FASTCALL: u8 = 0x04;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    /// Generic method, followed by the generic parameter count
    pub const GENERIC: u8 = 0x10;
    pub const HASTHIS: u8 = 0x20;
    pub const EXPLICITTHIS: u8 = 0x40;
}

/// A custom modifier attached to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomModifier {
    /// `modreq` if true, `modopt` otherwise
    pub is_required: bool,
    /// The modifier type, a `TypeDef`, `TypeRef` or `TypeSpec` token
    pub modifier_type: Token,
}

/// Shape of a general array (ECMA-335 II.23.2.13)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayShape {
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions
    pub lower_bounds: Vec<i32>,
}

/// A decoded type signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSignature {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `uint8`
    U1,
    /// `int16`
    I2,
    /// `uint16`
    U2,
    /// `int32`
    I4,
    /// `uint32`
    U4,
    /// `int64`
    I8,
    /// `uint64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `string`
    String,
    /// `object`
    Object,
    /// `typedref`
    TypedByRef,
    /// Native integer
    I,
    /// Native unsigned integer
    U,
    /// Unmanaged pointer
    Ptr(Box<TypeSignature>),
    /// Managed reference
    ByRef(Box<TypeSignature>),
    /// Pinned local
    Pinned(Box<TypeSignature>),
    /// Reference type
    Class(Token),
    /// Value type
    ValueType(Token),
    /// Single-dimensional, zero-based array
    SzArray(Box<TypeSignature>),
    /// General array
    Array(Box<TypeSignature>, ArrayShape),
    /// Instantiation of a generic type, the base is a `Class` or `ValueType`
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Generic parameter of the declaring type (`!n`)
    GenericParamType(u32),
    /// Generic parameter of the method (`!!n`)
    GenericParamMethod(u32),
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// A type preceded by a custom modifier
    Modified(CustomModifier, Box<TypeSignature>),
}

/// A method definition, reference or function pointer signature (ECMA-335 II.23.2.1 - 3)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureMethod {
    /// Instance method, `this` is passed implicitly
    pub has_this: bool,
    /// `this` is passed as first explicit parameter
    pub explicit_this: bool,
    /// Low nibble of the header: default, vararg, cdecl, ...
    pub calling_convention: u8,
    /// Number of generic parameters, 0 for non-generic methods
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSignature,
    /// Fixed parameters
    pub params: Vec<TypeSignature>,
    /// Extra arguments after the sentinel of a vararg call site
    pub varargs: Vec<TypeSignature>,
}

impl SignatureMethod {
    /// Returns true for the vararg calling convention
    #[must_use]
    pub fn is_vararg(&self) -> bool {
        self.calling_convention == SIGNATURE_HEADER::VARARG
    }

    /// A static method with the default calling convention
    #[must_use]
    pub fn new_static(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: false,
            explicit_this: false,
            calling_convention: SIGNATURE_HEADER::DEFAULT,
            generic_param_count: 0,
            return_type,
            params,
            varargs: Vec::new(),
        }
    }

    /// An instance method with the default calling convention
    #[must_use]
    pub fn new_instance(return_type: TypeSignature, params: Vec<TypeSignature>) -> Self {
        SignatureMethod {
            has_this: true,
            ..Self::new_static(return_type, params)
        }
    }
}

/// A field signature (ECMA-335 II.23.2.4)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignatureField {
    /// Type of the field
    pub base: TypeSignature,
}

/// A local variable signature (ECMA-335 II.23.2.6)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureLocalVariables {
    /// Types of the locals, in slot order
    pub locals: Vec<TypeSignature>,
}
