//! Encoding [`Instruction`]s back into IL byte code.
//!
//! Branch operands are instruction indices, so the encoder first lays out the body to learn
//! the byte offset of every instruction, then writes the displacements. Short branches whose
//! displacement no longer fits into a signed byte are promoted to their long form; because a
//! promotion moves every following instruction, layout is repeated until it is stable. Branch
//! sizes only ever grow, so this terminates after at most one pass per short branch.

use log::trace;

use crate::{
    assembly::{Instruction, OpCode, Operand, OperandType},
    file::io::CilWrite,
    Result,
};

/// An encoded method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    /// The IL code
    pub code: Vec<u8>,
    /// Byte offset of every instruction, followed by the code size
    pub offsets: Vec<u32>,
    /// Number of short branches that were written in their long form
    pub promoted: usize,
}

fn operand_size(opcode: OpCode, operand: &Operand) -> usize {
    match (opcode.operand_type(), operand) {
        (OperandType::Switch, Operand::Switch(targets)) => 4 + 4 * targets.len(),
        (kind, _) => kind.size().unwrap_or(0),
    }
}

fn check_operand(index: usize, instr: &Instruction, count: usize, context: &str) -> Result<()> {
    let Some(info) = instr.opcode.info() else {
        return Err(emission_error!(
            context,
            "instruction {} uses the undefined opcode {:#x}",
            index,
            instr.opcode.0
        ));
    };

    let fits = match (info.operand, &instr.operand) {
        (OperandType::None, Operand::None)
        | (OperandType::Int32, Operand::Int32(_))
        | (OperandType::Int64, Operand::Int64(_))
        | (OperandType::Float32, Operand::Float32(_))
        | (OperandType::Float64, Operand::Float64(_))
        | (OperandType::Variable, Operand::Variable(_))
        | (OperandType::Token, Operand::Token(_))
        | (OperandType::String, Operand::String(_)) => true,
        (OperandType::Int8, Operand::Int32(v)) => i8::try_from(*v).is_ok(),
        (OperandType::UInt8, Operand::Int32(v)) => u8::try_from(*v).is_ok(),
        (OperandType::ShortVariable, Operand::Variable(v)) => *v <= 0xFF,
        (OperandType::ShortTarget | OperandType::Target, Operand::Target(target)) => {
            if *target >= count {
                return Err(emission_error!(
                    context,
                    "instruction {} ({}) branches to index {} of {}",
                    index,
                    info.mnemonic,
                    target,
                    count
                ));
            }
            true
        }
        (OperandType::Switch, Operand::Switch(targets)) => {
            if let Some(target) = targets.iter().find(|t| **t >= count) {
                return Err(emission_error!(
                    context,
                    "switch at {} targets index {} of {}",
                    index,
                    target,
                    count
                ));
            }
            true
        }
        _ => false,
    };

    if fits {
        Ok(())
    } else {
        Err(emission_error!(
            context,
            "operand {:?} of instruction {} does not fit {}",
            instr.operand,
            index,
            info.mnemonic
        ))
    }
}

fn layout(opcodes: &[OpCode], instructions: &[Instruction]) -> Vec<u32> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut offset = 0u32;
    for (opcode, instr) in opcodes.iter().zip(instructions) {
        offsets.push(offset);
        offset += (opcode.size() + operand_size(*opcode, &instr.operand)) as u32;
    }
    offsets.push(offset);
    offsets
}

/// Encode `instructions` into IL byte code.
///
/// # Arguments
/// * `instructions` - The body, branch operands hold instruction indices
/// * `user_string`  - Adds a string literal to the `#US` heap and returns its index
/// * `context`      - Name of the method, used in error messages
///
/// # Errors
/// Returns [`crate::Error::EmissionFailure`] if an opcode is undefined, an operand does not
/// match its opcode or does not fit its encoding, or a branch target is not a valid index.
pub fn encode_body(
    instructions: &[Instruction],
    user_string: &mut dyn FnMut(&str) -> Result<u32>,
    context: &str,
) -> Result<EncodedBody> {
    let count = instructions.len();
    for (index, instr) in instructions.iter().enumerate() {
        check_operand(index, instr, count, context)?;
    }

    let mut opcodes: Vec<OpCode> = instructions.iter().map(|i| i.opcode).collect();
    let mut promoted = 0;
    let offsets = loop {
        let offsets = layout(&opcodes, instructions);
        let mut changed = false;

        for (index, instr) in instructions.iter().enumerate() {
            let opcode = opcodes[index];
            if opcode.operand_type() != OperandType::ShortTarget {
                continue;
            }
            if let Operand::Target(target) = instr.operand {
                let next = i64::from(offsets[index + 1]);
                let displacement = i64::from(offsets[target]) - next;
                if i8::try_from(displacement).is_err() {
                    if let Some(long) = opcode.long_form() {
                        opcodes[index] = long;
                        promoted += 1;
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            break offsets;
        }
    };

    let total = offsets[count] as usize;
    let mut code = Vec::with_capacity(total);
    for (index, instr) in instructions.iter().enumerate() {
        let opcode = opcodes[index];
        opcode.write(&mut code);

        let next = i64::from(offsets[index + 1]);
        match (opcode.operand_type(), &instr.operand) {
            (OperandType::Int8, Operand::Int32(v)) => code.write_le(*v as i8),
            (OperandType::UInt8, Operand::Int32(v)) => code.write_le(*v as u8),
            (OperandType::Int32, Operand::Int32(v)) => code.write_le(*v),
            (_, Operand::Int64(v)) => code.write_le(*v),
            (_, Operand::Float32(v)) => code.write_le(*v),
            (_, Operand::Float64(v)) => code.write_le(*v),
            (OperandType::ShortVariable, Operand::Variable(v)) => code.write_le(*v as u8),
            (_, Operand::Variable(v)) => code.write_le(*v),
            (_, Operand::Token(t)) => code.write_le(t.value()),
            (_, Operand::String(s)) => {
                let index = user_string(s)?;
                if index > 0x00FF_FFFF {
                    return Err(emission_error!(
                        context,
                        "string literal index {:#x} exceeds the token range",
                        index
                    ));
                }
                code.write_le(0x7000_0000 | index);
            }
            (OperandType::ShortTarget, Operand::Target(target)) => {
                let displacement = i64::from(offsets[*target]) - next;
                code.write_le(displacement as i8);
            }
            (_, Operand::Target(target)) => {
                let displacement = i64::from(offsets[*target]) - next;
                code.write_le(displacement as i32);
            }
            (_, Operand::Switch(targets)) => {
                code.write_le(targets.len() as u32);
                for target in targets {
                    let displacement = i64::from(offsets[*target]) - next;
                    code.write_le(displacement as i32);
                }
            }
            _ => {}
        }
    }

    if promoted > 0 {
        trace!("{context}: promoted {promoted} short branch(es)");
    }

    Ok(EncodedBody {
        code,
        offsets,
        promoted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::decode_body;
    use crate::metadata::token::Token;

    fn no_strings(_: &str) -> Result<u32> {
        Ok(1)
    }

    #[test]
    fn simple() {
        let body = encode_body(
            &[Instruction::ldc_i4(47265), Instruction::ret()],
            &mut no_strings,
            "test",
        )
        .unwrap();
        assert_eq!(body.code, vec![0x20, 0xA1, 0xB8, 0x00, 0x00, 0x2A]);
        assert_eq!(body.offsets, vec![0, 5, 6]);
        assert_eq!(body.promoted, 0);
    }

    #[test]
    fn short_branch_promotion() {
        let mut instructions = vec![Instruction::branch(OpCode::BR_S, 201)];
        instructions.extend((0..200).map(|_| Instruction::simple(OpCode::NOP)));
        instructions.push(Instruction::ret());

        let body = encode_body(&instructions, &mut no_strings, "test").unwrap();
        assert_eq!(body.promoted, 1);
        assert_eq!(body.code[0], OpCode::BR.0 as u8);
        assert_eq!(&body.code[1..5], &200i32.to_le_bytes());

        let decoded = decode_body(&body.code, &|_| Ok(String::new())).unwrap();
        assert_eq!(decoded.instructions[0], Instruction::branch(OpCode::BR, 201));
    }

    #[test]
    fn backward_short_branch() {
        let instructions = vec![
            Instruction::simple(OpCode::NOP),
            Instruction::branch(OpCode::BR_S, 0),
        ];
        let body = encode_body(&instructions, &mut no_strings, "test").unwrap();
        assert_eq!(body.code, vec![0x00, 0x2B, 0xFD]);
    }

    #[test]
    fn operands() {
        let mut seen = Vec::new();
        let instructions = vec![
            Instruction::new(OpCode::LDC_I4_S, Operand::Int32(-2)),
            Instruction::ldstr("hello"),
            Instruction::new(OpCode::LDLOC_S, Operand::Variable(3)),
            Instruction::call(Token::new(0x0600_0002)),
            Instruction::new(OpCode::SWITCH, Operand::Switch(vec![0, 5])),
            Instruction::ret(),
        ];
        let body = encode_body(
            &instructions,
            &mut |s: &str| {
                seen.push(s.to_string());
                Ok(7)
            },
            "test",
        )
        .unwrap();

        assert_eq!(seen, vec!["hello".to_string()]);
        let decoded = decode_body(&body.code, &|i| Ok(format!("#{i}"))).unwrap();
        assert_eq!(decoded.instructions[1], Instruction::ldstr("#7"));
        assert_eq!(decoded.instructions[4], instructions[4]);
        assert_eq!(decoded.offsets, body.offsets);
    }

    #[test]
    fn rejects_bad_graphs() {
        let cases = vec![
            vec![Instruction::branch(OpCode::BR, 5)],
            vec![Instruction::new(OpCode::LDC_I4_S, Operand::Int32(300))],
            vec![Instruction::new(OpCode::LDC_I4, Operand::Int64(1))],
            vec![Instruction::new(OpCode::LDLOC_S, Operand::Variable(256))],
            vec![Instruction::simple(OpCode(0x24))],
            vec![Instruction::new(OpCode::SWITCH, Operand::Switch(vec![1]))],
        ];

        for case in cases {
            let err = encode_body(&case, &mut no_strings, "Foo::Bar").unwrap_err();
            match err {
                crate::Error::EmissionFailure { context, .. } => assert_eq!(context, "Foo::Bar"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
