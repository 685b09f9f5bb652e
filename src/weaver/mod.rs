//! The instruction stream editor.
//!
//! [`weave_module`] finds every method named [`MARKER_METHOD`] and makes it return the
//! time of day the pass ran, by prepending
//!
//! ```text
//! ldc.i4 <seconds since midnight>
//! ret
//! ```
//!
//! to its body. With [`DeadCodePolicy::Preserve`] the original instructions stay in place,
//! unreachable, with every branch, exception region and sequence point shifted along. A
//! method that has sequence points gets a hidden point on the injected prologue, so
//! debuggers step over it.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::Instruction;
//! use dotweave::metadata::signatures::{SignatureMethod, TypeSignature};
//! use dotweave::metadata::token::Token;
//! use dotweave::model::{MethodBody, ModuleBuilder};
//! use dotweave::weaver::{weave_module, TimeOfDay, WeaveOptions};
//!
//! let mut builder = ModuleBuilder::new("Game.dll");
//! builder.type_def("Game", "Clock", Token::new(0));
//! builder.method(
//!     "_Debug_Weaver",
//!     0x0016,
//!     &SignatureMethod::new_static(TypeSignature::I4, vec![]),
//!     Some(MethodBody::new(vec![Instruction::ldc_i4(0), Instruction::ret()])),
//! )?;
//! let mut module = builder.build();
//!
//! let time = TimeOfDay::from_hms(13, 7, 45)?;
//! let report = weave_module(&mut module, time, &WeaveOptions::default())?;
//! assert_eq!(report.methods.len(), 1);
//!
//! let (_, method) = module.find_method("Game.Clock", "_Debug_Weaver").unwrap();
//! let body = method.body.as_ref().unwrap();
//! assert_eq!(body.instructions[0], Instruction::ldc_i4(47265));
//! assert_eq!(body.len(), 4);
//! # Ok::<(), dotweave::Error>(())
//! ```

mod time;

pub use time::{TimeOfDay, SECONDS_PER_DAY};

use log::{debug, warn};
use strum::{Display, EnumString};

use crate::{
    assembly::Instruction,
    metadata::{tables::TableId, token::Token},
    model::{DebugSymbolMap, MethodBody, Module, SourcePoint},
    Result,
};

/// Name of the methods the weaver rewrites; matched exactly and case sensitively
pub const MARKER_METHOD: &str = "_Debug_Weaver";

/// What happens to the instructions of a woven method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DeadCodePolicy {
    /// Keep them after the prologue, unreachable
    #[default]
    Preserve,
    /// Replace the body with the prologue, dropping exception regions and sequence points
    Strip,
}

/// Options of a weaving pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeaveOptions {
    /// Treatment of the original instructions
    pub dead_code: DeadCodePolicy,
}

/// One method rewritten by the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WovenMethod {
    /// Full name of the declaring type
    pub type_name: String,
    /// Method name
    pub method: String,
    /// `MethodDef` token
    pub token: Token,
}

/// What a weaving pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaveReport {
    /// The time of day the constant was taken from
    pub time: TimeOfDay,
    /// The injected constant
    pub constant: i32,
    /// Rewritten methods, in `MethodDef` order
    pub methods: Vec<WovenMethod>,
    /// Marker methods without a body, which were left alone
    pub skipped: Vec<WovenMethod>,
}

impl WeaveReport {
    /// Returns true if the pass left the module untouched
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// The instructions injected at the start of every marker method
#[must_use]
pub fn prologue(time: TimeOfDay) -> Vec<Instruction> {
    vec![Instruction::ldc_i4(time.constant()), Instruction::ret()]
}

fn weave_body(body: &mut MethodBody, time: TimeOfDay, policy: DeadCodePolicy) -> Result<()> {
    let document = body
        .symbols
        .as_ref()
        .and_then(|symbols| symbols.points.first())
        .map(|point| point.document);

    match policy {
        DeadCodePolicy::Preserve => {
            body.prepend(prologue(time))?;
            if let (Some(symbols), Some(document)) = (&mut body.symbols, document) {
                symbols.points.insert(0, SourcePoint::hidden(0, document));
            }
        }
        DeadCodePolicy::Strip => {
            body.instructions = prologue(time);
            body.exception_regions.clear();
            body.symbols = match (body.symbols.take(), document) {
                (Some(symbols), Some(document)) => Some(DebugSymbolMap {
                    local_signature: symbols.local_signature,
                    points: vec![SourcePoint::hidden(0, document)],
                }),
                _ => None,
            };
        }
    }

    Ok(())
}

/// Rewrite every marker method of `module`.
///
/// The same constant is used for all methods of one pass. A module without marker methods is
/// not modified.
///
/// # Errors
/// The pass itself does not fail on a module produced by the reader or the builder; errors
/// only surface for bodies whose indices were corrupted by the caller.
pub fn weave_module(
    module: &mut Module,
    time: TimeOfDay,
    options: &WeaveOptions,
) -> Result<WeaveReport> {
    let mut report = WeaveReport {
        time,
        constant: time.constant(),
        methods: Vec::new(),
        skipped: Vec::new(),
    };

    let mut row = 0_u32;
    for ty in &mut module.types {
        let type_name = ty.full_name();
        for method in &mut ty.methods {
            row += 1;
            if method.name != MARKER_METHOD {
                continue;
            }

            let woven = WovenMethod {
                type_name: type_name.clone(),
                method: method.name.clone(),
                token: Token::from_parts(TableId::MethodDef, row),
            };
            let Some(body) = &mut method.body else {
                warn!(
                    "{}::{} ({}) has no body, skipped",
                    type_name, method.name, woven.token
                );
                report.skipped.push(woven);
                continue;
            };

            weave_body(body, time, options.dead_code)?;
            debug!(
                "wove {}::{} ({}): ldc.i4 {}, {} instruction(s)",
                type_name,
                method.name,
                woven.token,
                report.constant,
                body.len()
            );
            report.methods.push(woven);
        }
    }

    debug!(
        "{}: {} method(s) woven at {}",
        module.name,
        report.methods.len(),
        time
    );
    Ok(report)
}
