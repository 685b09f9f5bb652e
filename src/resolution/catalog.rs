use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    metadata::signatures::{
        is_field_signature, parse_field_signature, parse_method_signature, render_method,
        render_type,
    },
    metadata::token::Token,
    model::{Module, MODULE_TYPE},
    resolution::{
        canonical_assembly, Definition, MemberDefinition, MemberKind, ReferenceDescriptor,
        TypeDefinition,
    },
    Result,
};

type TypeKey = (String, String);
type MemberKey = (String, String, String);

/// The form of an assembly name used in lookup keys: core library aliases collapse into
/// [`crate::resolution::CORE_LIBRARY`] and case is ignored.
#[must_use]
pub fn assembly_key(assembly: &str) -> String {
    canonical_assembly(assembly).to_ascii_lowercase()
}

/// Render a member signature blob of `module` into the normalized form used for matching.
///
/// Type tokens are replaced by the full names of the types they denote, so the same member
/// renders identically in the defining and in every referencing module.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the blob can not be parsed or refers to a type row
/// that does not exist.
pub fn member_signature(module: &Module, blob: &[u8]) -> Result<(MemberKind, String)> {
    let names = |token: Token| {
        module
            .type_name(token)
            .ok_or_else(|| malformed_error!("Signature refers to missing type {}", token))
    };

    if is_field_signature(blob) {
        let field = parse_field_signature(blob)?;
        Ok((MemberKind::Field, render_type(&field.base, &names)?))
    } else {
        let method = parse_method_signature(blob)?;
        Ok((MemberKind::Method, render_method(&method, &names)?))
    }
}

/// A concurrent index of type and member definitions.
///
/// Keys use [`assembly_key`] names, so a reference into `mscorlib` finds a definition
/// registered for `System.Runtime`, and `game.core` finds `Game.Core`. Methods are matched by name and normalized signature,
/// which distinguishes overloads.
#[derive(Default)]
pub struct Catalog {
    types: DashMap<TypeKey, Arc<Definition>>,
    members: DashMap<MemberKey, Vec<Arc<Definition>>>,
}

impl Catalog {
    /// An empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every type, method and field defined by `module`.
    ///
    /// The assembly name is taken from the module's `Assembly` row, or from its module name
    /// without extension for netmodules. `<Module>` is skipped.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a member signature can not be rendered.
    pub fn from_module(module: &Module) -> Result<Catalog> {
        let catalog = Catalog::new();
        let assembly = module.assembly.as_ref().map_or_else(
            || {
                module
                    .name
                    .rsplit_once('.')
                    .map_or(module.name.as_str(), |(stem, _)| stem)
                    .to_string()
            },
            |identity| identity.name.clone(),
        );

        for ty in module.types.iter().filter(|t| t.name != MODULE_TYPE) {
            let declaring = TypeDefinition {
                assembly: canonical_assembly(&assembly).to_string(),
                namespace: ty.namespace.clone(),
                name: ty.name.clone(),
            };
            catalog.insert_type(declaring.clone());

            for method in &ty.methods {
                let (kind, signature) = member_signature(module, &method.signature)?;
                catalog.insert_member(MemberDefinition {
                    declaring: declaring.clone(),
                    name: method.name.clone(),
                    kind,
                    signature,
                });
            }
            for field in &ty.fields {
                let (kind, signature) = member_signature(module, &field.signature)?;
                catalog.insert_member(MemberDefinition {
                    declaring: declaring.clone(),
                    name: field.name.clone(),
                    kind,
                    signature,
                });
            }
        }

        Ok(catalog)
    }

    /// Add a type, replacing an existing one with the same name
    pub fn insert_type(&self, mut definition: TypeDefinition) -> Arc<Definition> {
        definition.assembly = canonical_assembly(&definition.assembly).to_string();
        let key = (assembly_key(&definition.assembly), definition.full_name());
        let definition = Arc::new(Definition::Type(definition));
        self.types.insert(key, definition.clone());
        definition
    }

    /// Add a member; its declaring type is added too if it is not known yet
    pub fn insert_member(&self, mut definition: MemberDefinition) {
        definition.declaring.assembly =
            canonical_assembly(&definition.declaring.assembly).to_string();
        let assembly = assembly_key(&definition.declaring.assembly);
        let type_name = definition.declaring.full_name();

        self.types
            .entry((assembly.clone(), type_name.clone()))
            .or_insert_with(|| Arc::new(Definition::Type(definition.declaring.clone())));

        let key = (assembly, type_name, definition.name.clone());
        let mut overloads = self.members.entry(key).or_default();
        let exists = overloads.iter().any(|existing| {
            existing
                .as_member()
                .is_some_and(|m| m.kind == definition.kind && m.signature == definition.signature)
        });
        if !exists {
            overloads.push(Arc::new(Definition::Member(definition)));
        }
    }

    /// Find the definition matching `reference`
    #[must_use]
    pub fn lookup(&self, reference: &ReferenceDescriptor) -> Option<Arc<Definition>> {
        match reference {
            ReferenceDescriptor::Type(t) => self
                .types
                .get(&(assembly_key(&t.assembly), t.full_name()))
                .map(|entry| entry.value().clone()),
            ReferenceDescriptor::Member(m) => {
                let key = (
                    assembly_key(&m.declaring.assembly),
                    m.declaring.full_name(),
                    m.name.clone(),
                );
                let overloads = self.members.get(&key)?;
                overloads
                    .iter()
                    .find(|candidate| {
                        candidate.as_member().is_some_and(|d| {
                            d.kind == m.kind && d.signature == m.signature
                        })
                    })
                    .cloned()
            }
        }
    }

    /// Returns true if any type of `assembly` is known
    #[must_use]
    pub fn has_assembly(&self, assembly: &str) -> bool {
        let assembly = assembly_key(assembly);
        self.types.iter().any(|entry| entry.key().0 == assembly)
    }

    /// Number of types
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of members, counting every overload
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.iter().map(|entry| entry.value().len()).sum()
    }
}
