//! Decoding IL byte code into [`Instruction`]s.
//!
//! The decoder works in two passes. The first pass walks the code linearly, decoding one
//! instruction at a time and remembering the byte offset at which it started. The second pass
//! converts the relative branch displacements into instruction indices, rejecting any target
//! that does not land on the start of an instruction.

use log::trace;

use crate::{
    assembly::{Instruction, OpCode, Operand, OperandType},
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Token table of `#US` heap references in `ldstr`
const USER_STRING_TABLE: u8 = 0x70;

/// A decoded method body
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody {
    /// The instructions, branch operands hold instruction indices
    pub instructions: Vec<Instruction>,
    /// Byte offset of every instruction, followed by the code size
    pub offsets: Vec<u32>,
}

impl DecodedBody {
    /// Index of the instruction starting at `offset`, `None` if no instruction starts there
    #[must_use]
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        let starts = &self.offsets[..self.instructions.len()];
        starts.binary_search(&offset).ok()
    }

    /// Index for an offset that may also equal the code size, as used by region ends
    #[must_use]
    pub fn boundary_of(&self, offset: u32) -> Option<usize> {
        self.offsets.binary_search(&offset).ok()
    }
}

/// Branch operand as read from the stream, before it is mapped to an index
enum Pending {
    Ready(Operand),
    Target(i64),
    Switch(Vec<i64>),
}

/// Decode one instruction at the current position of `parser`.
///
/// Branch targets are returned as absolute byte offsets inside an [`Operand::Target`] or
/// [`Operand::Switch`]; [`decode_body`] converts them to indices.
///
/// # Arguments
/// * `parser`      - Positioned at the first byte of the opcode
/// * `user_string` - Lookup of `#US` heap entries for `ldstr`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for undefined opcodes, truncated operands, `ldstr`
/// tokens not pointing into the `#US` heap and targets outside of `0..=u32::MAX`.
pub fn decode_instruction(
    parser: &mut Parser,
    user_string: &dyn Fn(u32) -> Result<String>,
) -> Result<Instruction> {
    let start = parser.pos();
    let (opcode, pending) = decode_pending(parser, user_string)?;
    let operand = match pending {
        Pending::Ready(operand) => operand,
        Pending::Target(target) => Operand::Target(absolute(target, start)?),
        Pending::Switch(targets) => Operand::Switch(
            targets
                .into_iter()
                .map(|t| absolute(t, start))
                .collect::<Result<_>>()?,
        ),
    };

    Ok(Instruction::new(opcode, operand))
}

fn absolute(target: i64, start: usize) -> Result<usize> {
    usize::try_from(target)
        .map_err(|_| malformed_error!("Branch at offset {} targets {}", start, target))
}

fn decode_pending(
    parser: &mut Parser,
    user_string: &dyn Fn(u32) -> Result<String>,
) -> Result<(OpCode, Pending)> {
    let start = parser.pos();
    let first = parser.read_le::<u8>()?;
    let opcode = if first == 0xFE {
        OpCode(0xFE00 | u16::from(parser.read_le::<u8>()?))
    } else {
        OpCode(u16::from(first))
    };

    let Some(info) = opcode.info() else {
        return Err(malformed_error!(
            "Undefined opcode {:#x} at offset {}",
            opcode.0,
            start
        ));
    };

    let pending = match info.operand {
        OperandType::None => Pending::Ready(Operand::None),
        OperandType::Int8 => Pending::Ready(Operand::Int32(i32::from(parser.read_le::<i8>()?))),
        OperandType::UInt8 => Pending::Ready(Operand::Int32(i32::from(parser.read_le::<u8>()?))),
        OperandType::Int32 => Pending::Ready(Operand::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Pending::Ready(Operand::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Pending::Ready(Operand::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Pending::Ready(Operand::Float64(parser.read_le::<f64>()?)),
        OperandType::ShortVariable => {
            Pending::Ready(Operand::Variable(u16::from(parser.read_le::<u8>()?)))
        }
        OperandType::Variable => Pending::Ready(Operand::Variable(parser.read_le::<u16>()?)),
        OperandType::Token => Pending::Ready(Operand::Token(Token::new(parser.read_le::<u32>()?))),
        OperandType::String => {
            let token = Token::new(parser.read_le::<u32>()?);
            if token.table() != USER_STRING_TABLE {
                return Err(malformed_error!(
                    "ldstr at offset {} uses token {} outside of the #US heap",
                    start,
                    token
                ));
            }
            Pending::Ready(Operand::String(user_string(token.row())?))
        }
        OperandType::ShortTarget => {
            let displacement = i64::from(parser.read_le::<i8>()?);
            Pending::Target(parser.pos() as i64 + displacement)
        }
        OperandType::Target => {
            let displacement = i64::from(parser.read_le::<i32>()?);
            Pending::Target(parser.pos() as i64 + displacement)
        }
        OperandType::Switch => {
            let count = parser.read_le::<u32>()? as usize;
            if count > parser.len().saturating_sub(parser.pos()) / 4 {
                return Err(malformed_error!(
                    "switch at offset {} declares {} targets beyond the code",
                    start,
                    count
                ));
            }

            let mut displacements = Vec::with_capacity(count);
            for _ in 0..count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }

            let next = parser.pos() as i64;
            Pending::Switch(displacements.into_iter().map(|d| next + d).collect())
        }
    };

    Ok((opcode, pending))
}

/// Decode a complete method body and map every branch target to an instruction index.
///
/// # Arguments
/// * `code`        - The IL code of one method, without header or sections
/// * `user_string` - Lookup of `#US` heap entries for `ldstr`
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an instruction is truncated or undefined, or if a
/// branch or switch target is not the start of an instruction.
pub fn decode_body(
    code: &[u8],
    user_string: &dyn Fn(u32) -> Result<String>,
) -> Result<DecodedBody> {
    let mut parser = Parser::new(code);
    let mut decoded = Vec::new();
    let mut offsets = Vec::new();

    while parser.has_more_data() {
        let start = parser.pos();
        offsets.push(start as u32);
        let (opcode, pending) = decode_pending(&mut parser, user_string)
            .map_err(|e| match e {
                crate::Error::OutOfBounds { .. } => {
                    malformed_error!("Instruction at offset {} is truncated", start)
                }
                other => other,
            })?;
        decoded.push((opcode, pending));
    }
    offsets.push(code.len() as u32);

    let lookup = |target: i64, from: usize| -> Result<usize> {
        u32::try_from(target)
            .ok()
            .and_then(|t| offsets[..decoded.len()].binary_search(&t).ok())
            .ok_or_else(|| {
                malformed_error!(
                    "Branch at offset {} targets {} which is not an instruction start",
                    offsets[from],
                    target
                )
            })
    };

    let mut instructions = Vec::with_capacity(decoded.len());
    for (index, (opcode, pending)) in decoded.iter().enumerate() {
        let operand = match pending {
            Pending::Ready(operand) => operand.clone(),
            Pending::Target(target) => Operand::Target(lookup(*target, index)?),
            Pending::Switch(targets) => Operand::Switch(
                targets
                    .iter()
                    .map(|t| lookup(*t, index))
                    .collect::<Result<_>>()?,
            ),
        };
        instructions.push(Instruction::new(*opcode, operand));
    }

    trace!(
        "decoded {} instruction(s) from {} byte(s)",
        instructions.len(),
        code.len()
    );

    Ok(DecodedBody {
        instructions,
        offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_strings(_: u32) -> Result<String> {
        Err(malformed_error!("no strings"))
    }

    #[test]
    fn simple() {
        let code = [0x20, 0xA1, 0xB8, 0x00, 0x00, 0x2A];
        let body = decode_body(&code, &no_strings).unwrap();

        assert_eq!(
            body.instructions,
            vec![Instruction::ldc_i4(47265), Instruction::ret()]
        );
        assert_eq!(body.offsets, vec![0, 5, 6]);
        assert_eq!(body.index_of(5), Some(1));
        assert_eq!(body.index_of(6), None);
        assert_eq!(body.boundary_of(6), Some(2));
    }

    #[test]
    fn branches_become_indices() {
        // IL_0000: ldc.i4.0  IL_0001: brtrue.s IL_0005  IL_0003: ldc.i4.1  IL_0004: pop
        // IL_0005: ret
        let code = [0x16, 0x2D, 0x02, 0x17, 0x26, 0x2A];
        let body = decode_body(&code, &no_strings).unwrap();
        assert_eq!(body.instructions[1].operand, Operand::Target(4));

        // backwards long branch to IL_0000
        let code = [0x00, 0x38, 0xFA, 0xFF, 0xFF, 0xFF];
        let body = decode_body(&code, &no_strings).unwrap();
        assert_eq!(body.instructions[1].operand, Operand::Target(0));
    }

    #[test]
    fn switch() {
        // switch (IL_000E, IL_000D)  nop  ret
        let code = [
            0x45, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x2A,
        ];
        let body = decode_body(&code, &no_strings).unwrap();
        assert_eq!(body.instructions[0].operand, Operand::Switch(vec![2, 1]));
    }

    #[test]
    fn ldstr() {
        let code = [0x72, 0x01, 0x00, 0x00, 0x70, 0x2A];
        let body = decode_body(&code, &|index| Ok(format!("s{index}"))).unwrap();
        assert_eq!(body.instructions[0], Instruction::ldstr("s1"));

        let code = [0x72, 0x01, 0x00, 0x00, 0x0A, 0x2A];
        assert!(decode_body(&code, &no_strings).unwrap_err().is_malformed());
    }

    #[test]
    fn two_byte_and_prefix() {
        let code = [0xFE, 0x12, 0x04, 0xFE, 0x01, 0xFE, 0x0C, 0x00, 0x01];
        let body = decode_body(&code, &no_strings).unwrap();
        assert_eq!(body.instructions[0].opcode, OpCode::UNALIGNED);
        assert_eq!(body.instructions[0].operand, Operand::Int32(4));
        assert_eq!(body.instructions[1].opcode, OpCode::CEQ);
        assert_eq!(body.instructions[2].operand, Operand::Variable(0x100));
    }

    #[test]
    fn invalid() {
        // target into the middle of ldc.i4
        let code = [0x20, 0x00, 0x00, 0x00, 0x00, 0x2B, 0xFA];
        assert!(decode_body(&code, &no_strings).unwrap_err().is_malformed());

        // target past the end
        assert!(decode_body(&[0x2B, 0x05], &no_strings)
            .unwrap_err()
            .is_malformed());

        // truncated operand
        assert!(decode_body(&[0x20, 0x01], &no_strings)
            .unwrap_err()
            .is_malformed());

        // undefined opcode
        assert!(decode_body(&[0x24], &no_strings).unwrap_err().is_malformed());

        // switch count larger than the code
        assert!(decode_body(&[0x45, 0xFF, 0xFF, 0xFF, 0x00], &no_strings)
            .unwrap_err()
            .is_malformed());
    }
}
