//! Builders for authoring modules without a compiler.
//!
//! [`ModuleBuilder`] hands out the tokens of the rows it creates, so instructions can refer
//! to them right away. Types are appended in order and members always go to the most
//! recently added type, which keeps every token stable.

use crate::{
    assembly::Instruction,
    metadata::{
        pdb::{HASH_ALGORITHM_SHA1, LANGUAGE_CSHARP},
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_method_signature,
            SignatureField, SignatureLocalVariables, SignatureMethod, TypeSignature,
        },
        tables::TableId,
        token::Token,
    },
    model::{
        AssemblyIdentity, AssemblyRef, DebugSymbolMap, Document, ExceptionRegion, FieldDef,
        MemberRef, MethodBody, MethodDef, Module, ParamDef, SourcePoint, SymbolFile, TypeDef,
        TypeRef, Version,
    },
    Result,
};

/// Name of the pseudo type holding global members, always `TypeDef` row 1
pub const MODULE_TYPE: &str = "<Module>";

fn row_token(table: TableId, len: usize) -> Token {
    Token::from_parts(table, len as u32)
}

/// Builder for a complete [`Module`].
///
/// # Examples
///
/// ```rust
/// use dotweave::assembly::Instruction;
/// use dotweave::metadata::signatures::{SignatureMethod, TypeSignature};
/// use dotweave::model::{MethodBodyBuilder, ModuleBuilder, Version};
///
/// let mut builder = ModuleBuilder::new("Game.dll");
/// builder.assembly("Game", Version::new(1, 0, 0, 0));
/// let runtime = builder.assembly_ref("System.Runtime", Version::new(8, 0, 0, 0));
/// let object = builder.type_ref(runtime, "System", "Object");
///
/// builder.type_def("Game", "Program", object);
/// let body = MethodBodyBuilder::new()
///     .instruction(Instruction::ldc_i4(0))
///     .instruction(Instruction::ret())
///     .build();
/// let signature = SignatureMethod::new_static(TypeSignature::I4, vec![]);
/// builder.method("_Debug_Weaver", 0x0016, &signature, Some(body))?;
///
/// let module = builder.build();
/// assert!(module.find_method("Game.Program", "_Debug_Weaver").is_some());
/// # Ok::<(), dotweave::Error>(())
/// ```
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    /// Start a module named `name`, already containing the `<Module>` type
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut module = Module::new(name);
        module.types.push(TypeDef {
            flags: 0,
            namespace: String::new(),
            name: MODULE_TYPE.to_string(),
            extends: Token::new(0),
            fields: Vec::new(),
            methods: Vec::new(),
        });

        ModuleBuilder { module }
    }

    /// Set the module version id
    pub fn mvid(&mut self, mvid: uguid::Guid) -> &mut Self {
        self.module.mvid = mvid;
        self
    }

    /// Make the module the manifest module of assembly `name`
    pub fn assembly(&mut self, name: &str, version: Version) -> &mut Self {
        self.module.assembly = Some(AssemblyIdentity {
            name: name.to_string(),
            version,
            flags: 0,
            hash_alg_id: 0x8004,
            public_key: Vec::new(),
            culture: String::new(),
        });
        self
    }

    /// Record a symbol file, so that the module is emitted together with a symbol image
    pub fn symbols(&mut self, path: &str) -> &mut Self {
        self.module.symbols = Some(SymbolFile {
            path: path.to_string(),
            age: 1,
        });
        self
    }

    /// Set the entry point method
    pub fn entry_point(&mut self, method: Token) -> &mut Self {
        self.module.entry_point = method;
        self
    }

    /// Add an assembly reference and return its token
    pub fn assembly_ref(&mut self, name: &str, version: Version) -> Token {
        self.module.assembly_refs.push(AssemblyRef {
            name: name.to_string(),
            version,
            flags: 0,
            public_key_or_token: Vec::new(),
            culture: String::new(),
            hash_value: Vec::new(),
        });
        row_token(TableId::AssemblyRef, self.module.assembly_refs.len())
    }

    /// Add a type reference in `scope` and return its token
    pub fn type_ref(&mut self, scope: Token, namespace: &str, name: &str) -> Token {
        self.module.type_refs.push(TypeRef {
            scope,
            namespace: namespace.to_string(),
            name: name.to_string(),
            definition: None,
        });
        row_token(TableId::TypeRef, self.module.type_refs.len())
    }

    /// Add a method reference on `parent` and return its token
    ///
    /// # Errors
    /// Returns an error if the signature can not be encoded.
    pub fn method_ref(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureMethod,
    ) -> Result<Token> {
        let signature = encode_method_signature(signature)?;
        Ok(self.member_ref(parent, name, signature))
    }

    /// Add a field reference on `parent` and return its token
    ///
    /// # Errors
    /// Returns an error if the signature can not be encoded.
    pub fn field_ref(
        &mut self,
        parent: Token,
        name: &str,
        signature: &SignatureField,
    ) -> Result<Token> {
        let signature = encode_field_signature(signature)?;
        Ok(self.member_ref(parent, name, signature))
    }

    fn member_ref(&mut self, parent: Token, name: &str, signature: Vec<u8>) -> Token {
        self.module.member_refs.push(MemberRef {
            parent,
            name: name.to_string(),
            signature,
            definition: None,
        });
        row_token(TableId::MemberRef, self.module.member_refs.len())
    }

    /// Add a local variable signature and return its `StandAloneSig` token
    ///
    /// # Errors
    /// Returns an error if the signature can not be encoded.
    pub fn local_signature(&mut self, locals: &SignatureLocalVariables) -> Result<Token> {
        self.module
            .local_signatures
            .push(encode_local_var_signature(locals)?);
        Ok(row_token(
            TableId::StandAloneSig,
            self.module.local_signatures.len(),
        ))
    }

    /// Add a type definition and return its token; following members are added to it
    pub fn type_def(&mut self, namespace: &str, name: &str, extends: Token) -> Token {
        self.module.types.push(TypeDef {
            flags: 0x0010_0001,
            namespace: namespace.to_string(),
            name: name.to_string(),
            extends,
            fields: Vec::new(),
            methods: Vec::new(),
        });
        row_token(TableId::TypeDef, self.module.types.len())
    }

    /// Add a field to the most recent type and return its token
    ///
    /// # Errors
    /// Returns an error if the signature can not be encoded.
    pub fn field(&mut self, name: &str, flags: u16, signature: &SignatureField) -> Result<Token> {
        let signature = encode_field_signature(signature)?;
        let count = self.module.rows(TableId::Field);
        if let Some(owner) = self.module.types.last_mut() {
            owner.fields.push(FieldDef {
                flags,
                name: name.to_string(),
                signature,
            });
        }
        Ok(row_token(TableId::Field, count + 1))
    }

    /// Add a method to the most recent type and return its token.
    ///
    /// A parameter row is created for every parameter, named `arg0`, `arg1` and so on.
    ///
    /// # Errors
    /// Returns an error if the signature can not be encoded.
    pub fn method(
        &mut self,
        name: &str,
        flags: u16,
        signature: &SignatureMethod,
        body: Option<MethodBody>,
    ) -> Result<Token> {
        let params = (1..=signature.params.len())
            .map(|sequence| ParamDef {
                flags: 0,
                sequence: sequence as u16,
                name: format!("arg{}", sequence - 1),
            })
            .collect();
        let method = MethodDef {
            flags,
            impl_flags: 0,
            name: name.to_string(),
            signature: encode_method_signature(signature)?,
            params,
            body,
        };

        let count = self.module.rows(TableId::MethodDef);
        if let Some(owner) = self.module.types.last_mut() {
            owner.methods.push(method);
        }
        Ok(row_token(TableId::MethodDef, count + 1))
    }

    /// Add a source document and return its 1-based row
    pub fn document(&mut self, name: &str) -> u32 {
        self.module.documents.push(Document {
            name: name.to_string(),
            hash_algorithm: HASH_ALGORITHM_SHA1,
            hash: Vec::new(),
            language: LANGUAGE_CSHARP,
        });
        self.module.documents.len() as u32
    }

    /// Finish the module
    #[must_use]
    pub fn build(self) -> Module {
        self.module
    }
}

/// Builder for a [`MethodBody`].
///
/// Sequence points added with [`MethodBodyBuilder::line`] and
/// [`MethodBodyBuilder::hidden`] start at the next instruction added.
#[derive(Default)]
pub struct MethodBodyBuilder {
    instructions: Vec<Instruction>,
    max_stack: Option<u16>,
    init_locals: bool,
    local_var_sig: Option<(Token, Vec<TypeSignature>)>,
    regions: Vec<ExceptionRegion>,
    points: Vec<SourcePoint>,
}

impl MethodBodyBuilder {
    /// Create an empty body builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the max stack hint, 8 if not set
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.max_stack = Some(max_stack);
        self
    }

    /// Zero initialize locals
    #[must_use]
    pub fn init_locals(mut self, init: bool) -> Self {
        self.init_locals = init;
        self
    }

    /// Use the local variable signature `token`, holding `locals`
    #[must_use]
    pub fn locals(mut self, token: Token, locals: Vec<TypeSignature>) -> Self {
        self.local_var_sig = Some((token, locals));
        self
    }

    /// Append one instruction
    #[must_use]
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Append several instructions
    #[must_use]
    pub fn instructions(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    /// Add an exception region
    #[must_use]
    pub fn region(mut self, region: ExceptionRegion) -> Self {
        self.regions.push(region);
        self
    }

    /// Map the next instruction to `line` of `document`, columns `start_col..end_col`
    #[must_use]
    pub fn line(mut self, document: u32, line: u32, start_col: u16, end_col: u16) -> Self {
        self.points.push(SourcePoint {
            instruction: self.instructions.len(),
            document,
            start_line: line,
            start_col,
            end_line: line,
            end_col,
        });
        self
    }

    /// Mark the next instruction as hidden
    #[must_use]
    pub fn hidden(mut self, document: u32) -> Self {
        self.points
            .push(SourcePoint::hidden(self.instructions.len(), document));
        self
    }

    /// Finish the body
    #[must_use]
    pub fn build(self) -> MethodBody {
        let (local_var_sig, locals) = self
            .local_var_sig
            .unwrap_or_else(|| (Token::new(0), Vec::new()));
        let local_signature = if local_var_sig.is_null() {
            0
        } else {
            local_var_sig.row()
        };

        MethodBody {
            instructions: self.instructions,
            max_stack: self.max_stack.unwrap_or(8),
            init_locals: self.init_locals,
            local_var_sig,
            locals,
            exception_regions: self.regions,
            symbols: if self.points.is_empty() {
                None
            } else {
                Some(DebugSymbolMap {
                    local_signature,
                    points: self.points,
                })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::OpCode;

    #[test]
    fn tokens_follow_rows() {
        let mut builder = ModuleBuilder::new("Test.dll");
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

        let program = builder.type_def("App", "Program", object);
        let main = builder
            .method(
                "Main",
                0x0016,
                &SignatureMethod::new_static(TypeSignature::Void, vec![]),
                None,
            )
            .unwrap();
        let helper = builder
            .method(
                "Helper",
                0x0016,
                &SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]),
                None,
            )
            .unwrap();
        builder.entry_point(main);
        let module = builder.build();

        assert_eq!(runtime, Token::new(0x2300_0001));
        assert_eq!(console, Token::new(0x0100_0002));
        assert_eq!(write_line, Token::new(0x0A00_0001));
        assert_eq!(program, Token::new(0x0200_0002));
        assert_eq!(main, Token::new(0x0600_0001));
        assert_eq!(helper, Token::new(0x0600_0002));
        assert_eq!(module.types[0].name, MODULE_TYPE);
        assert_eq!(module.method(helper).unwrap().params.len(), 1);
        assert_eq!(module.type_name(console).unwrap(), "System.Console");
    }

    #[test]
    fn body_points_anchor_on_next_instruction() {
        let body = MethodBodyBuilder::new()
            .hidden(1)
            .instruction(Instruction::simple(OpCode::NOP))
            .line(1, 12, 9, 18)
            .instruction(Instruction::ldc_i4(0))
            .instruction(Instruction::ret())
            .build();

        let points = body.symbols.unwrap().points;
        assert_eq!(points.len(), 2);
        assert!(points[0].is_hidden());
        assert_eq!(points[1].instruction, 1);
        assert_eq!(points[1].start_line, 12);
        assert_eq!(body.max_stack, 8);
    }
}
