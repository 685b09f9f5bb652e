//! Serialization of the module image.

use log::trace;

use crate::{
    assembly::{encode_body, Operand},
    file::io::CilWrite,
    metadata::{
        method::{write_method_body, ExceptionHandler, ExceptionHandlerFlags},
        pdb::CodeViewRecord,
        root::RootBuilder,
        streams::{
            BlobHeapBuilder, GuidHeapBuilder, HeapBuilder, StringsHeapBuilder, TablesBuilder,
            UserStringsHeapBuilder,
        },
        tables::{
            AssemblyRaw, AssemblyRefRaw, CodedIndex, CodedIndexType, FieldRaw, MemberRefRaw,
            MethodDefRaw, ModuleRaw, ParamRaw, StandAloneSigRaw, TableId, TableInfo, TypeDefRaw,
            TypeRefRaw, HEAP_LARGE_BLOB, HEAP_LARGE_GUID, HEAP_LARGE_STRINGS,
        },
        token::Token,
    },
    model::{ExceptionRegion, MethodBody, Module, RegionKind},
    Result,
};

/// The streams of a module image, ready to be laid out.
pub(crate) struct CodeStreams {
    tables: Vec<u8>,
    strings: Vec<u8>,
    user_strings: Vec<u8>,
    guids: Vec<u8>,
    blobs: Vec<u8>,
    il: Vec<u8>,
    /// Instruction offsets of every method body, by `MethodDef` row; the last entry of each
    /// is the code size
    pub offsets: Vec<Option<Vec<u32>>>,
}

impl CodeStreams {
    /// Lay out the image, with a `#CV` stream if `codeview` is given
    pub(crate) fn image(
        &self,
        runtime_version: &str,
        codeview: Option<&CodeViewRecord>,
    ) -> Result<Vec<u8>> {
        let mut root = RootBuilder::new(runtime_version);
        root.stream("#~", self.tables.clone())
            .stream("#Strings", self.strings.clone())
            .stream("#US", self.user_strings.clone())
            .stream("#GUID", self.guids.clone())
            .stream("#Blob", self.blobs.clone())
            .stream("#IL", self.il.clone());
        if let Some(record) = codeview {
            root.stream("#CV", record.build());
        }

        root.build()
    }
}

fn coded(token: Token, kind: CodedIndexType, context: &str) -> Result<CodedIndex> {
    CodedIndex::from_token(token, kind).map_err(|_| {
        emission_error!(context, "token {} can not be stored as {:?}", token, kind)
    })
}

fn check_token(module: &Module, token: Token, context: &str, what: &str) -> Result<()> {
    if module.contains(token) {
        Ok(())
    } else {
        Err(emission_error!(context, "{} refers to missing row {}", what, token))
    }
}

fn handler(region: &ExceptionRegion, offsets: &[u32]) -> ExceptionHandler {
    let (flags, class_token_or_filter) = match &region.kind {
        RegionKind::Catch(token) => (ExceptionHandlerFlags::EXCEPTION, token.value()),
        RegionKind::Filter(start) => (ExceptionHandlerFlags::FILTER, offsets[*start]),
        RegionKind::Finally => (ExceptionHandlerFlags::FINALLY, 0),
        RegionKind::Fault => (ExceptionHandlerFlags::FAULT, 0),
    };

    ExceptionHandler {
        flags,
        try_offset: offsets[region.try_start],
        try_length: offsets[region.try_end] - offsets[region.try_start],
        handler_offset: offsets[region.handler_start],
        handler_length: offsets[region.handler_end] - offsets[region.handler_start],
        class_token_or_filter,
    }
}

/// Check the body of `context` and append it to `il`, returning its instruction offsets
fn write_body(
    module: &Module,
    body: &MethodBody,
    il: &mut Vec<u8>,
    user_strings: &mut UserStringsHeapBuilder,
    context: &str,
) -> Result<Vec<u32>> {
    body.check_indices(context, module.documents.len())?;

    for (index, instruction) in body.instructions.iter().enumerate() {
        if let Operand::Token(token) = instruction.operand {
            check_token(
                module,
                token,
                context,
                &format!("{} at instruction {}", instruction.mnemonic(), index),
            )?;
        }
    }
    for region in &body.exception_regions {
        if let RegionKind::Catch(token) = region.kind {
            check_token(module, token, context, "catch clause")?;
        }
    }
    if !body.local_var_sig.is_null() {
        if !body.local_var_sig.is_table(TableId::StandAloneSig) {
            return Err(emission_error!(
                context,
                "local signature {} is not a StandAloneSig",
                body.local_var_sig
            ));
        }
        check_token(module, body.local_var_sig, context, "local signature")?;
    }

    let encoded = encode_body(
        &body.instructions,
        &mut |literal: &str| user_strings.add(literal),
        context,
    )?;
    if encoded.promoted > 0 {
        trace!("{}: promoted {} short branch(es)", context, encoded.promoted);
    }

    let handlers: Vec<ExceptionHandler> = body
        .exception_regions
        .iter()
        .map(|region| handler(region, &encoded.offsets))
        .collect();

    write_method_body(
        il,
        &encoded.code,
        body.max_stack,
        body.init_locals,
        body.local_var_sig.value(),
        &handlers,
    )
    .map_err(|e| emission_error!(context, "{}", e))?;

    Ok(encoded.offsets)
}

/// Build every stream of the module image of `module`.
///
/// Heaps are filled in row order, so the same module always yields the same bytes.
pub(crate) fn build(module: &Module) -> Result<CodeStreams> {
    let mut strings = StringsHeapBuilder::new();
    let mut user_strings = UserStringsHeapBuilder::new();
    let mut guids = GuidHeapBuilder::new();
    let mut blobs = BlobHeapBuilder::new();
    let mut il = vec![0_u8; 4];

    if !module.entry_point.is_null()
        && (!module.entry_point.is_table(TableId::MethodDef)
            || !module.contains(module.entry_point))
    {
        return Err(emission_error!(
            module.name,
            "entry point {} is not a method of the module",
            module.entry_point
        ));
    }

    let module_row = ModuleRaw {
        generation: module.generation,
        name: strings.add(&module.name)?,
        mvid: guids.add(module.mvid)?,
        enc_id: 0,
        enc_base_id: 0,
    };

    let mut type_refs = Vec::with_capacity(module.type_refs.len());
    for (row, type_ref) in module.type_refs.iter().enumerate() {
        let context = format!("TypeRef {}", row + 1);
        check_token(module, type_ref.scope, &context, "resolution scope")?;
        type_refs.push(TypeRefRaw {
            resolution_scope: coded(type_ref.scope, CodedIndexType::ResolutionScope, &context)?,
            type_name: strings.add(&type_ref.name)?,
            type_namespace: strings.add(&type_ref.namespace)?,
        });
    }

    let mut type_defs = Vec::with_capacity(module.types.len());
    let mut fields = Vec::new();
    let mut methods = Vec::new();
    let mut params = Vec::new();
    let mut offsets = Vec::new();
    for ty in &module.types {
        let type_name = ty.full_name();
        let extends = if ty.extends.is_null() {
            CodedIndex::new(TableId::TypeDef, 0)
        } else {
            check_token(module, ty.extends, &type_name, "base type")?;
            coded(ty.extends, CodedIndexType::TypeDefOrRef, &type_name)?
        };

        #[allow(clippy::cast_possible_truncation)]
        type_defs.push(TypeDefRaw {
            flags: ty.flags,
            type_name: strings.add(&ty.name)?,
            type_namespace: strings.add(&ty.namespace)?,
            extends,
            field_list: fields.len() as u32 + 1,
            method_list: methods.len() as u32 + 1,
        });

        for field in &ty.fields {
            fields.push(FieldRaw {
                flags: field.flags,
                name: strings.add(&field.name)?,
                signature: blobs.add(&field.signature)?,
            });
        }

        for method in &ty.methods {
            let context = format!("{}::{}", type_name, method.name);
            let rva = match &method.body {
                Some(body) => {
                    il.align_to(4);
                    let rva = u32::try_from(il.len())
                        .map_err(|_| emission_error!(context, "#IL stream exceeds 4GB"))?;
                    offsets.push(Some(write_body(
                        module,
                        body,
                        &mut il,
                        &mut user_strings,
                        &context,
                    )?));
                    rva
                }
                None => {
                    offsets.push(None);
                    0
                }
            };

            #[allow(clippy::cast_possible_truncation)]
            methods.push(MethodDefRaw {
                rva,
                impl_flags: method.impl_flags,
                flags: method.flags,
                name: strings.add(&method.name)?,
                signature: blobs.add(&method.signature)?,
                param_list: params.len() as u32 + 1,
            });

            for param in &method.params {
                params.push(ParamRaw {
                    flags: param.flags,
                    sequence: param.sequence,
                    name: strings.add(&param.name)?,
                });
            }
        }
    }

    let mut member_refs = Vec::with_capacity(module.member_refs.len());
    for (row, member) in module.member_refs.iter().enumerate() {
        let context = format!("MemberRef {}", row + 1);
        check_token(module, member.parent, &context, "parent")?;
        member_refs.push(MemberRefRaw {
            class: coded(member.parent, CodedIndexType::MemberRefParent, &context)?,
            name: strings.add(&member.name)?,
            signature: blobs.add(&member.signature)?,
        });
    }

    let signatures = module
        .local_signatures
        .iter()
        .map(|signature| {
            Ok(StandAloneSigRaw {
                signature: blobs.add(signature)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let assembly = match &module.assembly {
        Some(identity) => vec![AssemblyRaw {
            hash_alg_id: identity.hash_alg_id,
            major_version: identity.version.major,
            minor_version: identity.version.minor,
            build_number: identity.version.build,
            revision_number: identity.version.revision,
            flags: identity.flags,
            public_key: blobs.add(&identity.public_key)?,
            name: strings.add(&identity.name)?,
            culture: strings.add(&identity.culture)?,
        }],
        None => Vec::new(),
    };

    let assembly_refs = module
        .assembly_refs
        .iter()
        .map(|reference| {
            Ok(AssemblyRefRaw {
                major_version: reference.version.major,
                minor_version: reference.version.minor,
                build_number: reference.version.build,
                revision_number: reference.version.revision,
                flags: reference.flags,
                public_key_or_token: blobs.add(&reference.public_key_or_token)?,
                name: strings.add(&reference.name)?,
                culture: strings.add(&reference.culture)?,
                hash_value: blobs.add(&reference.hash_value)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut heap_sizes = 0;
    if strings.is_large() {
        heap_sizes |= HEAP_LARGE_STRINGS;
    }
    if guids.is_large() {
        heap_sizes |= HEAP_LARGE_GUID;
    }
    if blobs.is_large() {
        heap_sizes |= HEAP_LARGE_BLOB;
    }

    let row_counts: Vec<(TableId, u32)> = TableId::MODULE_TABLES
        .iter()
        .map(|table| (*table, module.rows(*table) as u32))
        .filter(|(_, rows)| *rows > 0)
        .collect();
    let mut tables = TablesBuilder::new(TableInfo::new(&row_counts, heap_sizes));
    tables.add_table(&[module_row])?;
    tables.add_table(&type_refs)?;
    tables.add_table(&type_defs)?;
    tables.add_table(&fields)?;
    tables.add_table(&methods)?;
    tables.add_table(&params)?;
    tables.add_table(&member_refs)?;
    tables.add_table(&signatures)?;
    tables.add_table(&assembly)?;
    tables.add_table(&assembly_refs)?;

    trace!(
        "module image: {} method bytes, {} row(s) in {} table(s)",
        il.len(),
        row_counts.iter().map(|(_, rows)| rows).sum::<u32>(),
        row_counts.len()
    );

    Ok(CodeStreams {
        tables: tables.build(),
        strings: strings.build(),
        user_strings: user_strings.build(),
        guids: guids.build(),
        blobs: blobs.build(),
        il,
        offsets,
    })
}
