//! Values on the evaluation stack.

use std::fmt;

use crate::{metadata::signatures::TypeSignature, Error, Result};

/// A value the emulator computes with.
///
/// Only the integer stack types exist; every smaller integer type is widened to 32 bits on
/// load, like the runtime does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmValue {
    /// No value, the result of a `void` method
    Void,
    /// `int32`, also used for `bool`, `char` and the small integer types
    I32(i32),
    /// `int64`
    I64(i64),
}

impl EmValue {
    /// The zero value of a local or return of type `signature`.
    ///
    /// # Errors
    /// Returns [`Error::EmulationFailure`] for types that are not integers.
    pub fn zero(signature: &TypeSignature) -> Result<Self> {
        match signature {
            TypeSignature::I8 | TypeSignature::U8 => Ok(EmValue::I64(0)),
            TypeSignature::Boolean
            | TypeSignature::Char
            | TypeSignature::I1
            | TypeSignature::U1
            | TypeSignature::I2
            | TypeSignature::U2
            | TypeSignature::I4
            | TypeSignature::U4 => Ok(EmValue::I32(0)),
            other => Err(Error::EmulationFailure(format!(
                "locals of type {other:?} are not supported"
            ))),
        }
    }

    /// The value as `int32`, if it is one
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            EmValue::I32(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as `int64`, widening `int32`
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EmValue::I32(value) => Some(i64::from(*value)),
            EmValue::I64(value) => Some(*value),
            EmValue::Void => None,
        }
    }

    /// Returns true for a non-zero integer, the condition of `brtrue`
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.as_i64().is_some_and(|value| value != 0)
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Void => f.write_str("void"),
            EmValue::I32(value) => write!(f, "{value}"),
            EmValue::I64(value) => write!(f, "{value}L"),
        }
    }
}

impl From<i32> for EmValue {
    fn from(value: i32) -> Self {
        EmValue::I32(value)
    }
}

impl From<i64> for EmValue {
    fn from(value: i64) -> Self {
        EmValue::I64(value)
    }
}

impl From<bool> for EmValue {
    fn from(value: bool) -> Self {
        EmValue::I32(i32::from(value))
    }
}
