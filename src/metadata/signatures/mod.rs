//! Signature blobs (ECMA-335 II.23.2).
//!
//! Method, field and local variable signatures are stored as compressed byte sequences in the
//! `#Blob` heap. This module decodes them into [`TypeSignature`] trees, encodes trees back
//! into blobs, and renders them as normalized text for reference resolution.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::metadata::signatures::{parse_method_signature, TypeSignature};
//!
//! // static int32 (string)
//! let signature = parse_method_signature(&[0x00, 0x01, 0x08, 0x0E])?;
//! assert!(!signature.has_this);
//! assert_eq!(signature.return_type, TypeSignature::I4);
//! assert_eq!(signature.params, vec![TypeSignature::String]);
//! # Ok::<(), dotweave::Error>(())
//! ```

mod display;
mod encoder;
mod parser;
mod types;

pub use display::{render_method, render_type};
pub use encoder::{
    encode_field_signature, encode_local_var_signature, encode_method_signature,
    encode_type_signature,
};
pub use parser::SignatureParser;
pub use types::*;

use crate::Result;

/// Parse a method signature blob
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    SignatureParser::new(data).parse_method_signature()
}

/// Parse a field signature blob
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    SignatureParser::new(data).parse_field_signature()
}

/// Parse a local variable signature blob
///
/// # Errors
/// Returns an error if the signature data is malformed
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    SignatureParser::new(data).parse_local_var_signature()
}

/// Returns true if `data` is a field signature rather than a method signature
#[must_use]
pub fn is_field_signature(data: &[u8]) -> bool {
    data.first() == Some(&SIGNATURE_HEADER::FIELD)
}
