//! Reference resolution policies.
//!
//! A module refers to types and members of other assemblies by name only. While reading, the
//! [`crate::reader::ModuleReader`] turns every such reference into a [`ReferenceDescriptor`]
//! and asks a [`ReferenceResolver`] for the matching [`Definition`]; the read fails if any of
//! them can not be found, so a loaded module never contains dangling references.
//!
//! # Key Components
//!
//! - [`ReferenceResolver`] - the capability injected into the reader
//! - [`RuntimeResolver`] - definitions built into this crate plus host registrations
//! - [`SearchPathResolver`] - definitions read from candidate modules
//! - [`ChainedResolver`] - several policies tried in order
//! - [`Catalog`] - the concurrent name index both policies answer from
//!
//! # Examples
//!
//! ```rust
//! use dotweave::resolution::{ReferenceDescriptor, ReferenceResolver, RuntimeResolver, TypeReference};
//!
//! let resolver = RuntimeResolver::new();
//! let object = TypeReference::new("System.Runtime", "System", "Object");
//! let definition = resolver.resolve(&ReferenceDescriptor::Type(object))?;
//! assert!(definition.as_type().is_some());
//! # Ok::<(), dotweave::Error>(())
//! ```

mod catalog;
mod runtime;
mod searchpath;

pub use catalog::{assembly_key, member_signature, Catalog};
pub use runtime::RuntimeResolver;
pub use searchpath::SearchPathResolver;

use std::{fmt, sync::Arc};

use log::trace;

use crate::{model::full_name, Error, Result};

/// Name under which every core library alias is resolved
pub const CORE_LIBRARY: &str = "System.Private.CoreLib";

/// Assembly names that all forward to the core library
pub const CORE_LIBRARY_ALIASES: [&str; 4] = [
    "mscorlib",
    "System.Runtime",
    "System.Private.CoreLib",
    "netstandard",
];

/// Returns the name `assembly` is resolved under: the core library for any of its aliases,
/// `assembly` itself otherwise.
#[must_use]
pub fn canonical_assembly(assembly: &str) -> &str {
    if CORE_LIBRARY_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(assembly))
    {
        CORE_LIBRARY
    } else {
        assembly
    }
}

/// A type named by a reference: owning assembly, namespace and name.
///
/// Nested types carry the namespace of their outermost type and a `/` separated name,
/// e.g. `Environment/SpecialFolder`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeReference {
    /// Simple name of the owning assembly
    pub assembly: String,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl TypeReference {
    /// Create a type reference
    #[must_use]
    pub fn new(assembly: &str, namespace: &str, name: &str) -> Self {
        TypeReference {
            assembly: assembly.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// `Namespace.Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.assembly, self.full_name())
    }
}

/// Whether a member is a method or a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A method, including constructors
    Method,
    /// A field
    Field,
}

/// A member named by a reference: declaring type, name and normalized signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberReference {
    /// The declaring type
    pub declaring: TypeReference,
    /// Member name
    pub name: String,
    /// Method or field
    pub kind: MemberKind,
    /// Signature rendered by [`crate::metadata::signatures::render_method`] or
    /// [`crate::metadata::signatures::render_type`]
    pub signature: String,
}

impl fmt::Display for MemberReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.declaring, self.name)
    }
}

/// What the reader asks a resolver for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceDescriptor {
    /// A `TypeRef` row
    Type(TypeReference),
    /// A `MemberRef` row
    Member(MemberReference),
}

impl ReferenceDescriptor {
    /// The assembly the reference points into
    #[must_use]
    pub fn assembly(&self) -> &str {
        match self {
            ReferenceDescriptor::Type(t) => &t.assembly,
            ReferenceDescriptor::Member(m) => &m.declaring.assembly,
        }
    }
}

impl fmt::Display for ReferenceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceDescriptor::Type(t) => t.fmt(f),
            ReferenceDescriptor::Member(m) => m.fmt(f),
        }
    }
}

/// A type as defined by its owning assembly
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDefinition {
    /// Assembly defining the type, canonicalized with [`canonical_assembly`]
    pub assembly: String,
    /// Namespace
    pub namespace: String,
    /// Name
    pub name: String,
}

impl TypeDefinition {
    /// `Namespace.Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        full_name(&self.namespace, &self.name)
    }
}

/// A member as defined by its declaring type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDefinition {
    /// The declaring type
    pub declaring: TypeDefinition,
    /// Member name
    pub name: String,
    /// Method or field
    pub kind: MemberKind,
    /// Normalized signature
    pub signature: String,
}

/// A resolved definition, shared read-only by every module referring to it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Definition {
    /// A type
    Type(TypeDefinition),
    /// A field or method
    Member(MemberDefinition),
}

impl Definition {
    /// The type, if this is a type definition
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeDefinition> {
        match self {
            Definition::Type(t) => Some(t),
            Definition::Member(_) => None,
        }
    }

    /// The member, if this is a member definition
    #[must_use]
    pub fn as_member(&self) -> Option<&MemberDefinition> {
        match self {
            Definition::Member(m) => Some(m),
            Definition::Type(_) => None,
        }
    }
}

/// A policy locating the definitions behind references.
///
/// Implementations must be usable from several weaving invocations at once; any caching they
/// do is scoped to the instance.
pub trait ReferenceResolver: Send + Sync {
    /// Find the definition named by `reference`.
    ///
    /// # Errors
    /// Returns [`Error::ReferenceNotFound`] if the policy has no such definition. Other
    /// errors, such as unreadable candidate files, are passed through.
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>>;
}

impl<T: ReferenceResolver + ?Sized> ReferenceResolver for Arc<T> {
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        (**self).resolve(reference)
    }
}

impl<T: ReferenceResolver + ?Sized> ReferenceResolver for Box<T> {
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        (**self).resolve(reference)
    }
}

/// Tries several resolvers in order and returns the first definition found.
#[derive(Default)]
pub struct ChainedResolver {
    resolvers: Vec<Box<dyn ReferenceResolver>>,
}

impl ChainedResolver {
    /// An empty chain, which resolves nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `resolver` to the chain
    #[must_use]
    pub fn with(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    /// Number of resolvers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns true if the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl ReferenceResolver for ChainedResolver {
    fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        for (position, resolver) in self.resolvers.iter().enumerate() {
            match resolver.resolve(reference) {
                Ok(definition) => return Ok(definition),
                Err(Error::ReferenceNotFound(_)) => {
                    trace!("resolver {position} has no {reference}");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ReferenceNotFound(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<Definition>);

    impl ReferenceResolver for Fixed {
        fn resolve(&self, reference: &ReferenceDescriptor) -> Result<Arc<Definition>> {
            self.0
                .clone()
                .map(Arc::new)
                .ok_or_else(|| Error::ReferenceNotFound(reference.to_string()))
        }
    }

    fn type_definition(name: &str) -> Definition {
        Definition::Type(TypeDefinition {
            assembly: "Lib".to_string(),
            namespace: "N".to_string(),
            name: name.to_string(),
        })
    }

    #[test]
    fn canonical_names() {
        assert_eq!(canonical_assembly("mscorlib"), CORE_LIBRARY);
        assert_eq!(canonical_assembly("System.Runtime"), CORE_LIBRARY);
        assert_eq!(canonical_assembly("NETStandard"), CORE_LIBRARY);
        assert_eq!(canonical_assembly("Game.Core"), "Game.Core");
    }

    #[test]
    fn display() {
        let console = TypeReference::new("System.Runtime", "System", "Console");
        assert_eq!(console.to_string(), "[System.Runtime]System.Console");

        let write_line = MemberReference {
            declaring: console,
            name: "WriteLine".to_string(),
            kind: MemberKind::Method,
            signature: "void(string)".to_string(),
        };
        assert_eq!(
            ReferenceDescriptor::Member(write_line).to_string(),
            "[System.Runtime]System.Console::WriteLine"
        );
    }

    #[test]
    fn chain_order() {
        let reference = ReferenceDescriptor::Type(TypeReference::new("Lib", "N", "T"));

        let chain = ChainedResolver::new()
            .with(Fixed(None))
            .with(Fixed(Some(type_definition("First"))))
            .with(Fixed(Some(type_definition("Second"))));
        assert_eq!(chain.len(), 3);
        let found = chain.resolve(&reference).unwrap();
        assert_eq!(found.as_type().unwrap().name, "First");

        let empty = ChainedResolver::new().with(Fixed(None));
        assert!(matches!(
            empty.resolve(&reference),
            Err(Error::ReferenceNotFound(name)) if name == "[Lib]N.T"
        ));
    }
}
