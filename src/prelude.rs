//! # dotweave Prelude
//!
//! The types needed to run the pipeline, author modules and inspect the result, for glob
//! import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotweave operations
pub use crate::Error;

/// The result type used throughout dotweave
pub use crate::Result;

/// Low-level file access
pub use crate::{
    file::{ModuleFile, SYMBOL_EXTENSION},
    File, Parser,
};

// ================================================================================================
// Pipeline
// ================================================================================================

/// Inputs, outputs and entry points of the pipeline
pub use crate::pipeline::{weave, weave_all, CompiledModule, WovenModule};

/// The individual stages
pub use crate::{
    emitter::{emit, EmittedModule},
    reader::{read_definitions, ModuleReader, ReaderOptions},
    weaver::{
        weave_module, DeadCodePolicy, TimeOfDay, WeaveOptions, WeaveReport, WovenMethod,
        MARKER_METHOD,
    },
};

// ================================================================================================
// Reference Resolution
// ================================================================================================

/// Policies and the descriptors they resolve
pub use crate::resolution::{
    ChainedResolver, Definition, MemberKind, ReferenceDescriptor, ReferenceResolver,
    RuntimeResolver, SearchPathResolver, CORE_LIBRARY,
};

// ================================================================================================
// Module Graph
// ================================================================================================

/// The graph and its builders
pub use crate::model::{
    DebugSymbolMap, ExceptionRegion, MethodBody, MethodBodyBuilder, MethodDef, Module,
    ModuleBuilder, RegionKind, SourcePoint, TypeDef, Version,
};

/// Instructions
pub use crate::assembly::{Instruction, OpCode, Operand};

/// Metadata tokens and signatures
pub use crate::metadata::{
    signatures::{SignatureLocalVariables, SignatureMethod, TypeSignature},
    token::Token,
};

// ================================================================================================
// Emulation
// ================================================================================================

/// Evaluation of woven methods
pub use crate::emulation::{EmValue, EmulationLimits, Emulator};
