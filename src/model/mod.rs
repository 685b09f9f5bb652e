//! The in-memory object graph of one module.
//!
//! A [`Module`] is produced by the [`crate::reader::ModuleReader`], mutated by the
//! [`crate::weaver`] and serialized by the [`crate::emitter`]. It owns every type, method,
//! body and instruction; the only things it shares are the resolver-provided definitions
//! behind its [`TypeRef`] and [`MemberRef`] rows.
//!
//! Rows keep their metadata order. Tokens stored in instruction operands and signatures are
//! therefore stable as long as no rows are added or removed, which the weaving pass never
//! does.
//!
//! # Key Components
//!
//! - [`Module`] - top level unit, owns types, references and source documents
//! - [`TypeDef`] / [`MethodDef`] / [`FieldDef`] - definitions of this module
//! - [`MethodBody`] - instructions with exception regions and sequence points, all indexed by
//!   instruction position
//! - [`ModuleBuilder`] - authoring modules from scratch

mod body;
mod builder;

pub use body::{DebugSymbolMap, ExceptionRegion, MethodBody, RegionKind, SourcePoint};
pub use builder::{MethodBodyBuilder, ModuleBuilder, MODULE_TYPE};

use std::{fmt, sync::Arc};

use crate::{
    metadata::{tables::TableId, token::Token},
    resolution::Definition,
};

/// Deepest chain of enclosing `TypeRef` scopes that is followed
pub const MAX_NESTING: usize = 64;

/// A four part version number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl Version {
    /// Create a version
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Version {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Identity of the assembly a module belongs to (`Assembly` table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyIdentity {
    /// Simple name
    pub name: String,
    /// Version
    pub version: Version,
    /// `AssemblyFlags`
    pub flags: u32,
    /// Hash algorithm id
    pub hash_alg_id: u32,
    /// Full public key, empty for unsigned assemblies
    pub public_key: Vec<u8>,
    /// Culture, empty for neutral
    pub culture: String,
}

/// A referenced assembly (`AssemblyRef` table)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRef {
    /// Simple name
    pub name: String,
    /// Version
    pub version: Version,
    /// `AssemblyFlags`
    pub flags: u32,
    /// Public key or token
    pub public_key_or_token: Vec<u8>,
    /// Culture, empty for neutral
    pub culture: String,
    /// Hash of the referenced file
    pub hash_value: Vec<u8>,
}

/// A type defined in another module (`TypeRef` table)
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    /// `ResolutionScope` token: an `AssemblyRef`, the `Module` or an enclosing `TypeRef`
    pub scope: Token,
    /// Namespace, empty for nested types
    pub namespace: String,
    /// Name
    pub name: String,
    /// The definition supplied by the resolver, `None` until resolved or for references into
    /// this module itself
    pub definition: Option<Arc<Definition>>,
}

/// A field or method of a referenced type (`MemberRef` table)
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    /// `MemberRefParent` token
    pub parent: Token,
    /// Name
    pub name: String,
    /// Signature blob
    pub signature: Vec<u8>,
    /// The definition supplied by the resolver, `None` until resolved or for members of this
    /// module
    pub definition: Option<Arc<Definition>>,
}

/// A field defined in this module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// `FieldAttributes`
    pub flags: u16,
    /// Name
    pub name: String,
    /// Signature blob
    pub signature: Vec<u8>,
}

/// A parameter row of a method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    /// `ParamAttributes`
    pub flags: u16,
    /// 0 for the return value, 1.. for the parameters
    pub sequence: u16,
    /// Name
    pub name: String,
}

/// A method defined in this module
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// `MethodAttributes`
    pub flags: u16,
    /// `MethodImplAttributes`
    pub impl_flags: u16,
    /// Name, the key the weaver matches on
    pub name: String,
    /// Signature blob, preserved byte for byte
    pub signature: Vec<u8>,
    /// Parameter rows
    pub params: Vec<ParamDef>,
    /// The body, `None` for abstract, extern and runtime provided methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Returns true if the method has the `static` attribute
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & 0x0010 != 0
    }
}

/// A type defined in this module
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// `TypeAttributes`
    pub flags: u32,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
    /// `TypeDefOrRef` token of the base type, null for interfaces and `<Module>`
    pub extends: Token,
    /// Fields, in row order
    pub fields: Vec<FieldDef>,
    /// Methods, in row order
    pub methods: Vec<MethodDef>,
}

impl TypeDef {
    /// `Namespace.Name`, or just the name in the global namespace
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }
}

/// A source document of the symbol image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path of the source file
    pub name: String,
    /// Hash algorithm GUID, nil if no hash is recorded
    pub hash_algorithm: uguid::Guid,
    /// Hash of the file contents
    pub hash: Vec<u8>,
    /// Language GUID
    pub language: uguid::Guid,
}

/// Where the module's symbols live, as recorded in its debug record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFile {
    /// File name of the symbol image
    pub path: String,
    /// Age of the symbol image
    pub age: u32,
}

/// One compiled module with everything reachable from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name, usually the file name
    pub name: String,
    /// Runtime version string of the metadata root
    pub runtime_version: String,
    /// Module version id
    pub mvid: uguid::Guid,
    /// Generation, 0 for modules not produced by edit and continue
    pub generation: u16,
    /// The assembly identity, `None` for netmodules
    pub assembly: Option<AssemblyIdentity>,
    /// Referenced assemblies
    pub assembly_refs: Vec<AssemblyRef>,
    /// Referenced types
    pub type_refs: Vec<TypeRef>,
    /// Referenced members
    pub member_refs: Vec<MemberRef>,
    /// `StandAloneSig` blobs, the local variable signatures of method bodies
    pub local_signatures: Vec<Vec<u8>>,
    /// Defined types, in row order
    pub types: Vec<TypeDef>,
    /// Source documents referenced by sequence points
    pub documents: Vec<Document>,
    /// Entry point method token, null for libraries
    pub entry_point: Token,
    /// Symbol file record, `None` if the module was read without symbols
    pub symbols: Option<SymbolFile>,
}

impl Module {
    /// An empty module named `name`
    #[must_use]
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_string(),
            runtime_version: crate::metadata::root::DEFAULT_RUNTIME_VERSION.to_string(),
            mvid: uguid::Guid::ZERO,
            generation: 0,
            assembly: None,
            assembly_refs: Vec::new(),
            type_refs: Vec::new(),
            member_refs: Vec::new(),
            local_signatures: Vec::new(),
            types: Vec::new(),
            documents: Vec::new(),
            entry_point: Token::new(0),
            symbols: None,
        }
    }

    /// Number of rows of `table` this module occupies
    #[must_use]
    pub fn rows(&self, table: TableId) -> usize {
        match table {
            TableId::Module => 1,
            TableId::TypeRef => self.type_refs.len(),
            TableId::TypeDef => self.types.len(),
            TableId::Field => self.types.iter().map(|t| t.fields.len()).sum(),
            TableId::MethodDef => self.types.iter().map(|t| t.methods.len()).sum(),
            TableId::Param => self
                .types
                .iter()
                .flat_map(|t| &t.methods)
                .map(|m| m.params.len())
                .sum(),
            TableId::MemberRef => self.member_refs.len(),
            TableId::StandAloneSig => self.local_signatures.len(),
            TableId::Assembly => usize::from(self.assembly.is_some()),
            TableId::AssemblyRef => self.assembly_refs.len(),
            TableId::Document => self.documents.len(),
            TableId::MethodDebugInformation => {
                if self.symbols.is_some() {
                    self.rows(TableId::MethodDef)
                } else {
                    0
                }
            }
            TableId::ModuleRef | TableId::TypeSpec => 0,
        }
    }

    /// Returns true if `token` names an existing row of this module
    #[must_use]
    pub fn contains(&self, token: Token) -> bool {
        let Some(table) = TableId::from_repr(token.table()) else {
            return false;
        };
        token.row() >= 1 && token.row() as usize <= self.rows(table)
    }

    /// All methods with their `MethodDef` token and declaring type
    pub fn methods(&self) -> impl Iterator<Item = (Token, &TypeDef, &MethodDef)> {
        self.types
            .iter()
            .flat_map(|t| t.methods.iter().map(move |m| (t, m)))
            .enumerate()
            .map(|(index, (t, m))| {
                (
                    Token::from_parts(TableId::MethodDef, index as u32 + 1),
                    t,
                    m,
                )
            })
    }

    /// The method behind a `MethodDef` token
    #[must_use]
    pub fn method(&self, token: Token) -> Option<&MethodDef> {
        if !token.is_table(TableId::MethodDef) || token.row() == 0 {
            return None;
        }
        self.types
            .iter()
            .flat_map(|t| &t.methods)
            .nth(token.row() as usize - 1)
    }

    /// Find a method by declaring type full name and method name
    #[must_use]
    pub fn find_method(&self, type_name: &str, method_name: &str) -> Option<(Token, &MethodDef)> {
        self.methods()
            .find(|(_, t, m)| t.full_name() == type_name && m.name == method_name)
            .map(|(token, _, m)| (token, m))
    }

    /// Full name of the type behind a `TypeDef` or `TypeRef` token
    #[must_use]
    pub fn type_name(&self, token: Token) -> Option<String> {
        self.type_name_nested(token, 0)
    }

    fn type_name_nested(&self, token: Token, depth: usize) -> Option<String> {
        let row = token.row() as usize;
        if row == 0 || depth > MAX_NESTING {
            return None;
        }
        match TableId::from_repr(token.table())? {
            TableId::TypeDef => self.types.get(row - 1).map(TypeDef::full_name),
            TableId::TypeRef => {
                let type_ref = self.type_refs.get(row - 1)?;
                if type_ref.scope.is_table(TableId::TypeRef) {
                    let outer = self.type_name_nested(type_ref.scope, depth + 1)?;
                    Some(format!("{outer}/{}", type_ref.name))
                } else {
                    Some(full_name(&type_ref.namespace, &type_ref.name))
                }
            }
            _ => None,
        }
    }
}

/// `namespace.name`, or `name` alone for the global namespace
#[must_use]
pub fn full_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}
