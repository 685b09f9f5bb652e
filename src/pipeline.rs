//! The weaving pipeline: read, weave, emit.
//!
//! [`weave`] is a stateless function over one compiled module. It holds no state between
//! calls; the only thing shared across invocations is the resolver, which is `Send + Sync`.
//! [`weave_all`] runs many independent invocations in parallel.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::Instruction;
//! use dotweave::emitter::emit;
//! use dotweave::metadata::signatures::{SignatureMethod, TypeSignature};
//! use dotweave::metadata::token::Token;
//! use dotweave::model::{MethodBody, ModuleBuilder};
//! use dotweave::pipeline::{weave, CompiledModule};
//! use dotweave::resolution::RuntimeResolver;
//! use dotweave::weaver::{TimeOfDay, WeaveOptions};
//!
//! let mut builder = ModuleBuilder::new("Game.dll");
//! builder.symbols("Game.pdb");
//! builder.type_def("Game", "Clock", Token::new(0));
//! builder.method(
//!     "_Debug_Weaver",
//!     0x0016,
//!     &SignatureMethod::new_static(TypeSignature::I4, vec![]),
//!     Some(MethodBody::new(vec![Instruction::ldc_i4(0), Instruction::ret()])),
//! )?;
//! let compiled = emit(&builder.build())?;
//!
//! let input = CompiledModule::new("Game.dll", compiled.code, compiled.symbols);
//! let time = TimeOfDay::from_hms(13, 7, 45)?;
//! let output = weave(&input, time, &RuntimeResolver::new(), &WeaveOptions::default())?;
//! assert_eq!(output.report.constant, 47265);
//! # Ok::<(), dotweave::Error>(())
//! ```

use log::debug;
use rayon::prelude::*;

use crate::{
    emitter::emit,
    reader::ModuleReader,
    resolution::ReferenceResolver,
    weaver::{weave_module, TimeOfDay, WeaveOptions, WeaveReport},
    Result,
};

/// A compiled module handed to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledModule {
    /// Name used in diagnostics, usually the file name
    pub name: String,
    /// The module image
    pub code: Vec<u8>,
    /// The symbol image
    pub symbols: Vec<u8>,
    /// Referenced modules, in command line order; not used by the weaving rule
    pub references: Vec<String>,
    /// Preprocessor symbols of the build, not used by the weaving rule
    pub defines: Vec<String>,
}

impl CompiledModule {
    /// Create an input without references or defines
    #[must_use]
    pub fn new(name: impl Into<String>, code: Vec<u8>, symbols: Vec<u8>) -> Self {
        CompiledModule {
            name: name.into(),
            code,
            symbols,
            references: Vec::new(),
            defines: Vec::new(),
        }
    }
}

/// The result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WovenModule {
    /// The new module image
    pub code: Vec<u8>,
    /// The new symbol image, matching `code`
    pub symbols: Vec<u8>,
    /// What the weaver did
    pub report: WeaveReport,
}

/// Read `input`, weave its marker methods with `time` and emit the result.
///
/// An empty `symbols` image counts as missing.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid input,
/// [`crate::Error::UnresolvedReference`] if `resolver` can not locate a referenced type or
/// member, and [`crate::Error::EmissionFailure`] if the woven graph can not be written.
pub fn weave(
    input: &CompiledModule,
    time: TimeOfDay,
    resolver: &dyn ReferenceResolver,
    options: &WeaveOptions,
) -> Result<WovenModule> {
    let symbols = (!input.symbols.is_empty()).then_some(input.symbols.as_slice());
    let mut module = ModuleReader::new(resolver).read(&input.name, &input.code, symbols)?;
    debug!(
        "{}: {} reference(s), {} define(s) supplied",
        input.name,
        input.references.len(),
        input.defines.len()
    );

    let report = weave_module(&mut module, time, options)?;
    let emitted = emit(&module)?;

    Ok(WovenModule {
        code: emitted.code,
        symbols: emitted.symbols,
        report,
    })
}

/// Run [`weave`] over every input in parallel, with the same time and options.
///
/// Results are in input order; one failing module does not affect the others.
pub fn weave_all(
    inputs: &[CompiledModule],
    time: TimeOfDay,
    resolver: &dyn ReferenceResolver,
    options: &WeaveOptions,
) -> Vec<Result<WovenModule>> {
    inputs
        .par_iter()
        .map(|input| weave(input, time, resolver, options))
        .collect()
}
