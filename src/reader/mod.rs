//! The binary module reader.
//!
//! [`ModuleReader`] turns a module image and its symbol image into a fully populated
//! [`Module`]. Reading is all or nothing: any structural inconsistency fails the read with
//! [`crate::Error::Malformed`], and every reference to another assembly is resolved eagerly
//! through the injected [`ReferenceResolver`], failing with
//! [`crate::Error::UnresolvedReference`] for the first one that can not be found.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::reader::ModuleReader;
//! use dotweave::resolution::RuntimeResolver;
//!
//! let code = std::fs::read("Game.dll")?;
//! let symbols = std::fs::read("Game.pdb")?;
//!
//! let resolver = RuntimeResolver::new();
//! let module = ModuleReader::new(&resolver).read("Game.dll", &code, Some(symbols.as_slice()))?;
//! for (token, ty, method) in module.methods() {
//!     println!("{token} {}::{}", ty.full_name(), method.name);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod body;
mod image;
mod symbols;

use std::sync::Arc;

use log::{debug, trace};

use crate::{
    assembly::DecodedBody,
    metadata::{tables::TableId, token::Token},
    model::{
        AssemblyIdentity, AssemblyRef, FieldDef, MemberRef, MethodDef, Module, ParamDef,
        SymbolFile, TypeDef, TypeRef, Version, MAX_NESTING,
    },
    resolution::{
        member_signature, Definition, MemberReference, ReferenceDescriptor, ReferenceResolver,
        TypeReference,
    },
    Error, Result,
};

use body::read_body;
use image::CodeImage;
use symbols::SymbolImage;

/// Default upper bound for the code size of a single method body
pub const DEFAULT_MAX_BODY_SIZE: usize = 0x0100_0000;

/// Knobs of a [`ModuleReader`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Fail if no symbol image is supplied. Without it the module is read without sequence
    /// points and emitted without a symbol image.
    pub symbols_required: bool,
    /// Largest code size in bytes accepted for one method body
    pub max_body_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            symbols_required: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Reads module and symbol images into a [`Module`], resolving references on the way.
pub struct ModuleReader<'r> {
    resolver: &'r dyn ReferenceResolver,
    options: ReaderOptions,
}

impl<'r> ModuleReader<'r> {
    /// A reader with default options
    #[must_use]
    pub fn new(resolver: &'r dyn ReferenceResolver) -> Self {
        Self::with_options(resolver, ReaderOptions::default())
    }

    /// A reader with explicit options
    #[must_use]
    pub fn with_options(resolver: &'r dyn ReferenceResolver, options: ReaderOptions) -> Self {
        ModuleReader { resolver, options }
    }

    /// The options this reader was created with
    #[must_use]
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Read the module image `code` and its symbol image.
    ///
    /// `name` is only used in diagnostics; the module keeps the name of its `Module` row.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if either image is inconsistent or the symbol image is
    /// missing although required, and [`Error::UnresolvedReference`] if a reference can not be
    /// resolved.
    pub fn read(&self, name: &str, code: &[u8], symbols: Option<&[u8]>) -> Result<Module> {
        if symbols.is_none() && self.options.symbols_required {
            return Err(malformed_error!("{} was supplied without its symbol image", name));
        }

        let mut module = load(name, code, symbols, self.options.max_body_size)
            .map_err(as_malformed)?;
        self.resolve(&mut module)?;

        debug!(
            "read {}: {} type(s), {} method(s), {} reference(s) resolved",
            name,
            module.types.len(),
            module.rows(TableId::MethodDef),
            module
                .type_refs
                .iter()
                .filter(|r| r.definition.is_some())
                .count()
                + module
                    .member_refs
                    .iter()
                    .filter(|r| r.definition.is_some())
                    .count()
        );
        Ok(module)
    }

    fn resolve(&self, module: &mut Module) -> Result<()> {
        let shared: &Module = module;
        let type_descriptors = (1..=shared.type_refs.len())
            .map(|row| type_reference(shared, Token::from_parts(TableId::TypeRef, row as u32)))
            .collect::<Result<Vec<_>>>()?;

        let mut member_descriptors = Vec::with_capacity(shared.member_refs.len());
        for member in &shared.member_refs {
            let declaring = if member.parent.is_table(TableId::TypeRef) {
                type_descriptors
                    .get(member.parent.row() as usize - 1)
                    .cloned()
                    .flatten()
            } else {
                None
            };

            let descriptor = match declaring {
                Some(declaring) => {
                    let (kind, signature) = member_signature(shared, &member.signature)?;
                    Some(ReferenceDescriptor::Member(MemberReference {
                        declaring,
                        name: member.name.clone(),
                        kind,
                        signature,
                    }))
                }
                None => None,
            };
            member_descriptors.push(descriptor);
        }

        for (type_ref, descriptor) in module.type_refs.iter_mut().zip(type_descriptors) {
            if let Some(descriptor) = descriptor {
                type_ref.definition =
                    Some(self.lookup(&ReferenceDescriptor::Type(descriptor))?);
            }
        }
        for (member_ref, descriptor) in module.member_refs.iter_mut().zip(member_descriptors) {
            if let Some(descriptor) = descriptor {
                member_ref.definition = Some(self.lookup(&descriptor)?);
            }
        }

        Ok(())
    }

    fn lookup(&self, descriptor: &ReferenceDescriptor) -> Result<Arc<Definition>> {
        trace!("resolving {descriptor}");
        self.resolver
            .resolve(descriptor)
            .map_err(|source| Error::UnresolvedReference {
                symbol: descriptor.to_string(),
                source: Box::new(source),
            })
    }
}

/// Read the definitions of a module image without symbols and without resolving its
/// references.
///
/// Used for candidate modules of [`crate::resolution::SearchPathResolver`], whose own
/// references do not matter.
///
/// # Errors
/// Returns [`Error::Malformed`] if the image is inconsistent.
pub fn read_definitions(name: &str, code: &[u8]) -> Result<Module> {
    load(name, code, None, DEFAULT_MAX_BODY_SIZE).map_err(as_malformed)
}

fn as_malformed(error: Error) -> Error {
    match error {
        Error::OutOfBounds { file, line } => Error::Malformed {
            message: "Read past the end of the data".to_string(),
            file,
            line,
        },
        other => other,
    }
}

/// The descriptor of an external `TypeRef`, `None` for references into this module.
///
/// Nested references take the namespace of their outermost type and a `/` separated name.
fn type_reference(module: &Module, token: Token) -> Result<Option<TypeReference>> {
    let mut names = Vec::new();
    let mut current = token;
    for _ in 0..=MAX_NESTING {
        let type_ref = module
            .type_refs
            .get(current.row() as usize - 1)
            .ok_or_else(|| malformed_error!("TypeRef {} does not exist", current))?;
        names.push(type_ref.name.as_str());

        let scope = type_ref.scope;
        if scope.is_table(TableId::TypeRef) {
            current = scope;
            continue;
        }

        names.reverse();
        let name = names.join("/");
        return if scope.is_table(TableId::AssemblyRef) {
            let assembly = &module.assembly_refs[scope.row() as usize - 1];
            Ok(Some(TypeReference::new(
                &assembly.name,
                &type_ref.namespace,
                &name,
            )))
        } else if scope.is_table(TableId::Module) {
            Ok(None)
        } else {
            Err(malformed_error!(
                "TypeRef {} has unsupported resolution scope {}",
                token,
                scope
            ))
        };
    }

    Err(malformed_error!(
        "TypeRef {} is nested deeper than {} levels",
        token,
        MAX_NESTING
    ))
}

fn load(name: &str, code: &[u8], symbols: Option<&[u8]>, max_body_size: usize) -> Result<Module> {
    let image = CodeImage::parse(code)?;

    let symbol_image = match (symbols, &image.codeview) {
        (Some(data), Some(record)) => Some(SymbolImage::parse(data, &record.id, image.methods.len())?),
        (Some(_), None) => {
            return Err(malformed_error!(
                "{} has no debug record to match its symbol image against",
                name
            ))
        }
        (None, _) => None,
    };

    let mut module = Module::new(&image.string(image.module.name)?);
    module.runtime_version = image.root.version.clone();
    module.mvid = image.guids.get(image.module.mvid as usize)?;
    module.generation = image.module.generation;

    if let Some(row) = &image.assembly {
        module.assembly = Some(AssemblyIdentity {
            name: image.string(row.name)?,
            version: Version::new(
                row.major_version,
                row.minor_version,
                row.build_number,
                row.revision_number,
            ),
            flags: row.flags,
            hash_alg_id: row.hash_alg_id,
            public_key: image.blob(row.public_key)?,
            culture: image.string(row.culture)?,
        });
    }

    for row in &image.assembly_refs {
        module.assembly_refs.push(AssemblyRef {
            name: image.string(row.name)?,
            version: Version::new(
                row.major_version,
                row.minor_version,
                row.build_number,
                row.revision_number,
            ),
            flags: row.flags,
            public_key_or_token: image.blob(row.public_key_or_token)?,
            culture: image.string(row.culture)?,
            hash_value: image.blob(row.hash_value)?,
        });
    }

    for row in &image.type_refs {
        module.type_refs.push(TypeRef {
            scope: row.resolution_scope.token(),
            namespace: image.string(row.type_namespace)?,
            name: image.string(row.type_name)?,
            definition: None,
        });
    }

    for row in &image.member_refs {
        module.member_refs.push(MemberRef {
            parent: row.class.token(),
            name: image.string(row.name)?,
            signature: image.blob(row.signature)?,
            definition: None,
        });
    }

    for row in &image.signatures {
        module.local_signatures.push(image.blob(row.signature)?);
    }

    let field_runs = image.field_runs()?;
    let method_runs = image.method_runs()?;
    let param_runs = image.param_runs()?;

    let mut decoded_bodies: Vec<Option<DecodedBody>> = Vec::with_capacity(image.methods.len());
    for ((row, fields), methods) in image.type_defs.iter().zip(field_runs).zip(method_runs) {
        let mut ty = TypeDef {
            flags: row.flags,
            namespace: image.string(row.type_namespace)?,
            name: image.string(row.type_name)?,
            extends: if row.extends.is_null() {
                Token::new(0)
            } else {
                row.extends.token()
            },
            fields: Vec::with_capacity(fields.len()),
            methods: Vec::with_capacity(methods.len()),
        };

        for field in &image.fields[fields] {
            ty.fields.push(FieldDef {
                flags: field.flags,
                name: image.string(field.name)?,
                signature: image.blob(field.signature)?,
            });
        }

        for method_row in methods {
            let raw = &image.methods[method_row];
            let method_name = image.string(raw.name)?;
            let context = format!("{}::{}", ty.full_name(), method_name);

            let params = image.params[param_runs[method_row].clone()]
                .iter()
                .map(|param| {
                    Ok(ParamDef {
                        flags: param.flags,
                        sequence: param.sequence,
                        name: image.string(param.name)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let (mut body, decoded) = if raw.rva == 0 {
                (None, None)
            } else {
                let (body, decoded) = read_body(&image, raw.rva, max_body_size, &context)?;
                (Some(body), Some(decoded))
            };

            if let Some(symbols) = &symbol_image {
                let points = symbols.points(method_row, decoded.as_ref(), &context)?;
                if let Some(body) = &mut body {
                    body.symbols = points;
                }
            }

            trace!(
                "{}: {} instruction(s)",
                context,
                body.as_ref().map_or(0, |b| b.instructions.len())
            );

            ty.methods.push(MethodDef {
                flags: raw.flags,
                impl_flags: raw.impl_flags,
                name: method_name,
                signature: image.blob(raw.signature)?,
                params,
                body,
            });
            decoded_bodies.push(decoded);
        }

        module.types.push(ty);
    }

    if let (Some(symbols), Some(record)) = (symbol_image, &image.codeview) {
        let entry_point = symbols.entry_point;
        if !entry_point.is_null()
            && (!entry_point.is_table(TableId::MethodDef)
                || entry_point.row() as usize > image.methods.len())
        {
            return Err(malformed_error!(
                "Entry point {} is not a method of {}",
                symbols.entry_point,
                name
            ));
        }

        module.documents = symbols.documents;
        module.entry_point = symbols.entry_point;
        module.symbols = Some(SymbolFile {
            path: record.path.clone(),
            age: record.age,
        });
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode},
        emitter::emit,
        metadata::signatures::{SignatureMethod, TypeSignature},
        model::{MethodBodyBuilder, ModuleBuilder},
        resolution::RuntimeResolver,
    };

    fn console_module() -> Module {
        let mut builder = ModuleBuilder::new("Hello.dll");
        builder.assembly("Hello", Version::new(1, 0, 0, 0));
        builder.symbols("Hello.pdb");
        let runtime = builder.assembly_ref("System.Runtime", Version::new(8, 0, 0, 0));
        let object = builder.type_ref(runtime, "System", "Object");
        let console = builder.type_ref(runtime, "System", "Console");
        let write_line = builder
            .method_ref(
                console,
                "WriteLine",
                &SignatureMethod::new_static(TypeSignature::Void, vec![TypeSignature::String]),
            )
            .unwrap();
        let document = builder.document("/src/Hello/Program.cs");

        builder.type_def("Hello", "Program", object);
        let body = MethodBodyBuilder::new()
            .line(document, 5, 9, 40)
            .instruction(Instruction::ldstr("hello"))
            .instruction(Instruction::call(write_line))
            .line(document, 6, 5, 6)
            .instruction(Instruction::ret())
            .build();
        builder
            .method(
                "Main",
                0x0096,
                &SignatureMethod::new_static(TypeSignature::Void, vec![]),
                Some(body),
            )
            .unwrap();
        builder.build()
    }

    #[test]
    fn read_emitted() {
        let module = console_module();
        let emitted = emit(&module).unwrap();

        let resolver = RuntimeResolver::new();
        let read = ModuleReader::new(&resolver)
            .read("Hello.dll", &emitted.code, Some(emitted.symbols.as_slice()))
            .unwrap();

        assert_eq!(read.name, "Hello.dll");
        assert_eq!(read.documents.len(), 1);
        assert_eq!(read.documents[0].name, "/src/Hello/Program.cs");
        assert!(read.type_refs.iter().all(|r| r.definition.is_some()));
        assert!(read.member_refs[0].definition.is_some());

        let (_, main) = read.find_method("Hello.Program", "Main").unwrap();
        let body = main.body.as_ref().unwrap();
        assert_eq!(body.instructions[0], Instruction::ldstr("hello"));
        assert_eq!(body.instructions[2].opcode, OpCode::RET);

        let points = &body.symbols.as_ref().unwrap().points;
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].instruction, 2);
        assert_eq!(points[1].start_line, 6);
    }

    #[test]
    fn symbols_required() {
        let emitted = emit(&console_module()).unwrap();
        let resolver = RuntimeResolver::new();

        let err = ModuleReader::new(&resolver)
            .read("Hello.dll", &emitted.code, None)
            .unwrap_err();
        assert!(err.is_malformed());

        let options = ReaderOptions {
            symbols_required: false,
            ..ReaderOptions::default()
        };
        let module = ModuleReader::with_options(&resolver, options)
            .read("Hello.dll", &emitted.code, None)
            .unwrap();
        assert!(module.symbols.is_none());
        assert!(module.documents.is_empty());
    }

    #[test]
    fn unresolved() {
        let emitted = emit(&console_module()).unwrap();
        let resolver = RuntimeResolver::empty();

        let err = ModuleReader::new(&resolver)
            .read("Hello.dll", &emitted.code, Some(emitted.symbols.as_slice()))
            .unwrap_err();
        match err {
            Error::UnresolvedReference { symbol, source } => {
                assert_eq!(symbol, "[System.Runtime]System.Object");
                assert!(matches!(*source, Error::ReferenceNotFound(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn mismatched_symbols() {
        let emitted = emit(&console_module()).unwrap();
        let mut symbols = emitted.symbols.clone();

        // Flip a byte of the id recorded in #Pdb
        let root = crate::metadata::root::Root::read(&symbols).unwrap();
        let pdb = root
            .stream_headers
            .iter()
            .find(|h| h.name == "#Pdb")
            .unwrap()
            .offset as usize;
        symbols[pdb] ^= 0xFF;

        let resolver = RuntimeResolver::new();
        let err = ModuleReader::new(&resolver)
            .read("Hello.dll", &emitted.code, Some(symbols.as_slice()))
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn truncated() {
        let emitted = emit(&console_module()).unwrap();
        let resolver = RuntimeResolver::new();

        for len in [0, 4, 16, emitted.code.len() / 2] {
            let err = ModuleReader::new(&resolver)
                .read("Hello.dll", &emitted.code[..len], Some(emitted.symbols.as_slice()))
                .unwrap_err();
            assert!(err.is_malformed(), "{len}: {err:?}");
        }
    }

    #[test]
    fn definitions_only() {
        let emitted = emit(&console_module()).unwrap();
        let module = read_definitions("Hello.dll", &emitted.code).unwrap();
        assert!(module.type_refs.iter().all(|r| r.definition.is_none()));
        assert!(module.find_method("Hello.Program", "Main").is_some());
    }
}
