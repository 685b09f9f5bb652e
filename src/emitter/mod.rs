//! The binary module emitter.
//!
//! [`emit`] serializes a [`Module`] into a module image and, if the module records a symbol
//! file, a matching symbol image. Everything the graph holds is written back, including
//! unreachable instructions. Instructions are re-encoded from scratch: byte offsets of
//! branches, exception clauses and sequence points are recomputed from instruction indices,
//! and short branches that no longer reach their target are promoted to the long form.
//!
//! Emission is deterministic. Heaps are filled in row order and the identifier linking both
//! images is the SHA-1 of the two images with the identifier zeroed, so the same graph
//! always yields the same bytes.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::Instruction;
//! use dotweave::emitter::emit;
//! use dotweave::metadata::signatures::{SignatureMethod, TypeSignature};
//! use dotweave::model::{MethodBodyBuilder, ModuleBuilder};
//!
//! let mut builder = ModuleBuilder::new("Tiny.dll");
//! builder.symbols("Tiny.pdb");
//! builder.type_def("", "Program", dotweave::metadata::token::Token::new(0));
//! let body = MethodBodyBuilder::new().instruction(Instruction::ret()).build();
//! builder.method("Run", 0x0016, &SignatureMethod::new_static(TypeSignature::Void, vec![]), Some(body))?;
//!
//! let emitted = emit(&builder.build())?;
//! assert_eq!(&emitted.code[..4], b"BSJB");
//! assert_eq!(&emitted.symbols[..4], b"BSJB");
//! # Ok::<(), dotweave::Error>(())
//! ```

mod code;
mod symbols;

use log::debug;
use sha1::{Digest, Sha1};

use crate::{
    metadata::pdb::{CodeViewRecord, PDB_ID_SIZE},
    model::Module,
    Result,
};

/// The two images produced for one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedModule {
    /// The module image
    pub code: Vec<u8>,
    /// The symbol image, empty if the module records no symbol file
    pub symbols: Vec<u8>,
}

/// Serialize `module`.
///
/// # Errors
/// Returns [`crate::Error::EmissionFailure`] naming the offending method or row if the graph
/// can not be represented: indices out of range, tokens of missing rows, operands that do not
/// fit their opcode, or invalid sequence points.
pub fn emit(module: &Module) -> Result<EmittedModule> {
    let code_streams = code::build(module)?;

    let Some(symbol_file) = &module.symbols else {
        let code = code_streams.image(&module.runtime_version, None)?;
        debug!("emitted {}: {} bytes, no symbols", module.name, code.len());
        return Ok(EmittedModule {
            code,
            symbols: Vec::new(),
        });
    };

    let symbol_streams = symbols::build(module, &code_streams.offsets)?;
    let mut record = CodeViewRecord {
        id: [0; PDB_ID_SIZE],
        age: symbol_file.age,
        path: symbol_file.path.clone(),
    };

    let mut hasher = Sha1::new();
    hasher.update(code_streams.image(&module.runtime_version, Some(&record))?);
    hasher.update(symbol_streams.image(record.id)?);
    record.id.copy_from_slice(&hasher.finalize());

    let code = code_streams.image(&module.runtime_version, Some(&record))?;
    let symbols = symbol_streams.image(record.id)?;
    debug!(
        "emitted {}: {} bytes, {} bytes of symbols",
        module.name,
        code.len(),
        symbols.len()
    );

    Ok(EmittedModule { code, symbols })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode, Operand},
        metadata::{
            signatures::{SignatureMethod, TypeSignature},
            token::Token,
        },
        model::{ExceptionRegion, MethodBody, MethodBodyBuilder, ModuleBuilder, RegionKind},
        reader::ModuleReader,
        resolution::RuntimeResolver,
        Error,
    };

    fn module_with(body: MethodBody) -> Module {
        let mut builder = ModuleBuilder::new("Emit.dll");
        builder.symbols("Emit.pdb");
        builder.document("Emit.cs");
        builder.type_def("Emit", "Target", Token::new(0));
        builder
            .method(
                "Run",
                0x0016,
                &SignatureMethod::new_static(TypeSignature::I4, vec![]),
                Some(body),
            )
            .unwrap();
        builder.build()
    }

    fn reread(emitted: &EmittedModule) -> Module {
        ModuleReader::new(&RuntimeResolver::new())
            .read("Emit.dll", &emitted.code, Some(emitted.symbols.as_slice()))
            .unwrap()
    }

    #[test]
    fn deterministic() {
        let module = module_with(MethodBody::new(vec![
            Instruction::ldc_i4(7),
            Instruction::ret(),
        ]));
        assert_eq!(emit(&module).unwrap(), emit(&module).unwrap());
    }

    #[test]
    fn without_symbols() {
        let mut module = module_with(MethodBody::new(vec![Instruction::ret()]));
        module.symbols = None;
        module.documents.clear();

        let emitted = emit(&module).unwrap();
        assert!(emitted.symbols.is_empty());
    }

    #[test]
    fn promotes_short_branch() {
        let mut instructions = vec![Instruction::branch(OpCode::BR_S, 201)];
        instructions.extend((0..200).map(|_| Instruction::simple(OpCode::NOP)));
        instructions.push(Instruction::ldc_i4(1));
        instructions.push(Instruction::ret());

        let emitted = emit(&module_with(MethodBody::new(instructions))).unwrap();
        let read = reread(&emitted);
        let (_, method) = read.find_method("Emit.Target", "Run").unwrap();
        let body = method.body.as_ref().unwrap();
        assert_eq!(body.instructions[0].opcode, OpCode::BR);
        assert_eq!(body.instructions[0].operand, Operand::Target(201));
    }

    #[test]
    fn region_roundtrip() {
        let body = MethodBodyBuilder::new()
            .instructions([
                Instruction::simple(OpCode::NOP),
                Instruction::branch(OpCode::LEAVE_S, 4),
                Instruction::simple(OpCode::NOP),
                Instruction::simple(OpCode::ENDFINALLY),
                Instruction::ldc_i4(0),
                Instruction::ret(),
            ])
            .region(ExceptionRegion {
                kind: RegionKind::Finally,
                try_start: 0,
                try_end: 2,
                handler_start: 2,
                handler_end: 4,
            })
            .build();

        let module = module_with(body.clone());
        let read = reread(&emit(&module).unwrap());
        let (_, method) = read.find_method("Emit.Target", "Run").unwrap();
        let read_body = method.body.as_ref().unwrap();
        assert_eq!(read_body.exception_regions, body.exception_regions);
        assert_eq!(read_body.instructions, body.instructions);
    }

    #[test]
    fn rejects_dangling_token() {
        let body = MethodBody::new(vec![
            Instruction::call(Token::new(0x0A00_0009)),
            Instruction::ret(),
        ]);
        match emit(&module_with(body)) {
            Err(Error::EmissionFailure { context, .. }) => assert_eq!(context, "Emit.Target::Run"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_sequence_point() {
        let body = MethodBodyBuilder::new()
            .line(1, 3, 1, 1)
            .instruction(Instruction::ldc_i4(1))
            .instruction(Instruction::ret())
            .build();
        assert!(matches!(
            emit(&module_with(body)),
            Err(Error::EmissionFailure { .. })
        ));

        let body = MethodBodyBuilder::new()
            .line(2, 3, 1, 9)
            .instruction(Instruction::ret())
            .build();
        assert!(matches!(
            emit(&module_with(body)),
            Err(Error::EmissionFailure { .. })
        ));
    }
}
