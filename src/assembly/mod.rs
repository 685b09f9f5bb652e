//! CIL instructions: the opcode table, a decoder from IL bytes and an encoder back to them.
//!
//! # Key Components
//!
//! - [`OpCode`] / [`OpCodeInfo`] - every opcode of ECMA-335 Partition III with its operand
//!   encoding and control flow behavior
//! - [`Instruction`] / [`Operand`] - the in-graph representation, branch operands are
//!   instruction indices
//! - [`decode_body`] - IL bytes to instructions plus the byte offset of each
//! - [`encode_body`] - instructions to IL bytes, promoting short branches when needed
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::{decode_body, encode_body, Instruction};
//!
//! let code = [0x16, 0x2A]; // ldc.i4.0; ret
//! let body = decode_body(&code, &|_| Ok(String::new()))?;
//!
//! let mut instructions = vec![Instruction::ldc_i4(47265), Instruction::ret()];
//! instructions.extend(body.instructions);
//!
//! let woven = encode_body(&instructions, &mut |_| Ok(1), "Demo::_Debug_Weaver")?;
//! assert_eq!(woven.offsets, vec![0, 5, 6, 7, 8]);
//! # Ok::<(), dotweave::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod opcodes;

pub use decoder::{decode_body, decode_instruction, DecodedBody};
pub use encoder::{encode_body, EncodedBody};
pub use instruction::{Instruction, Operand};
pub use opcodes::{FlowType, OpCode, OpCodeInfo, OperandType};
