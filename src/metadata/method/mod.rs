//! Method bodies as stored in the `#IL` stream.
//!
//! A body consists of a tiny or fat header, the IL code, and for fat bodies optional extra
//! data sections holding exception handling clauses. This module parses headers and
//! sections into [`MethodBodyRaw`] and writes complete bodies with [`write_method_body`];
//! the instructions themselves are handled by [`crate::assembly`].

mod body;
mod exceptions;
mod types;

pub use body::{write_method_body, MethodBodyRaw, TINY_CODE_MAX, TINY_MAX_STACK};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;
