// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # dotweave
//!
//! A post-compilation weaver for ECMA-335 (CIL) modules. `dotweave` loads an already compiled
//! module together with its debug symbols, rewrites the instruction stream of marker methods,
//! and writes both back so that a standard loader accepts them.
//!
//! The only rewrite is a diagnostic one: every method named `_Debug_Weaver` is made to return
//! the number of seconds since local midnight at the time the weaver ran, by prepending
//!
//! ```text
//! ldc.i4 <seconds>
//! ret
//! ```
//!
//! to its body.
//!
//! ## Architecture
//!
//! The pipeline is strictly linear:
//!
//! - [`reader`] - decodes the module image and the symbol image into a [`model::Module`] and
//!   resolves its external references through an injected [`resolution::ReferenceResolver`]
//! - [`weaver`] - mutates marker methods in place
//! - [`emitter`] - serializes the graph back into both images
//!
//! [`pipeline::weave`] runs the three stages for one module. Below them sit the byte level
//! [`file`] layer, the [`metadata`] formats and the [`assembly`] instruction codec. The
//! [`emulation`] module evaluates integer-only methods, which is how the effect of weaving is
//! observed without a runtime.
//!
//! Instructions refer to each other by index, never by byte offset. Branch targets, exception
//! regions and sequence points all move together when instructions are inserted, and the
//! emitter recomputes every offset.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotweave::prelude::*;
//!
//! let input = CompiledModule::new("Game.dll", std::fs::read("Game.dll")?, std::fs::read("Game.pdb")?);
//! let output = weave(&input, TimeOfDay::now(), &RuntimeResolver::new(), &WeaveOptions::default())?;
//! for method in &output.report.methods {
//!     println!("{}::{} returns {}", method.type_name, method.method, output.report.constant);
//! }
//! std::fs::write("Game.dll", &output.code)?;
//! std::fs::write("Game.pdb", &output.symbols)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[macro_use]
pub(crate) mod error;

/// Access to module and symbol files, and the byte level codec.
///
/// # Examples
///
/// ```rust
/// use dotweave::Parser;
///
/// let mut parser = Parser::new(&[0x81, 0x02]);
/// assert_eq!(parser.read_compressed_uint()?, 0x102);
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod file;

/// Convenient re-exports of the most commonly used types.
///
/// ```rust,no_run
/// use dotweave::prelude::*;
///
/// let input = CompiledModule::new("Game.dll", std::fs::read("Game.dll")?, std::fs::read("Game.pdb")?);
/// let woven = weave(&input, TimeOfDay::now(), &RuntimeResolver::new(), &WeaveOptions::default())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod prelude;

/// CIL instructions: the opcode table, decoder and encoder.
pub mod assembly;

/// The binary module emitter.
pub mod emitter;

/// Evaluation of integer-only method bodies.
pub mod emulation;

/// ECMA-335 and Portable PDB metadata formats.
///
/// These are the low level building blocks the reader and the emitter share: the metadata
/// root, the heaps and the table stream, signatures, method body headers and sequence point
/// blobs.
pub mod metadata;

/// The in-memory module graph.
pub mod model;

/// The read, weave, emit pipeline.
pub mod pipeline;

/// The binary module reader.
pub mod reader;

/// Reference resolution policies.
pub mod resolution;

/// The instruction stream editor.
pub mod weaver;

/// `dotweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotweave` Error type
///
/// The error type for all operations of this crate. See the variants for the failure
/// taxonomy of the pipeline.
pub use error::Error;

pub use file::{parser::Parser, File};
