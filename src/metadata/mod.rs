//! ECMA-335 metadata: the binary building blocks of module and symbol images.
//!
//! - [`root`] - the metadata root and stream directory shared by both images
//! - [`streams`] - heaps and the table stream, readers and builders
//! - [`tables`] - raw table rows and index sizing
//! - [`signatures`] - method, field and local variable signature blobs
//! - [`method`] - method body headers and exception sections
//! - [`sequencepoints`] - Portable PDB sequence point blobs
//! - [`pdb`] - the `#CV` and `#Pdb` records pairing a module with its symbols
//!
//! Everything in here is a pure byte-level codec. The object graph built from these pieces
//! lives in [`crate::model`].

pub mod method;
pub mod pdb;
pub mod root;
pub mod sequencepoints;
pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;
