//! Instructions and operands of a method body.
//!
//! Inside the object graph branch operands are **instruction indices**, never byte offsets.
//! Byte offsets only exist at the edges: the [`crate::assembly::decode_body`] function maps
//! them to indices while reading and [`crate::assembly::encode_body`] recomputes them while
//! writing. That keeps every branch valid across insertions as long as the indices are shifted
//! together with the instructions (see [`crate::model::MethodBody::insert`]).
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::{Instruction, OpCode, Operand};
//!
//! let push = Instruction::ldc_i4(47265);
//! assert_eq!(push.opcode, OpCode::LDC_I4);
//! assert_eq!(push.operand, Operand::Int32(47265));
//! assert_eq!(push.to_string(), "ldc.i4 47265");
//! ```

use std::fmt;

use crate::{assembly::OpCode, metadata::token::Token};

/// The operand of an [`Instruction`]
#[derive(Debug, Clone)]
pub enum Operand {
    /// No operand
    None,
    /// Integer literal of `ldc.i4`, `ldc.i4.s` and the one byte prefix arguments
    Int32(i32),
    /// Integer literal of `ldc.i8`
    Int64(i64),
    /// Literal of `ldc.r4`
    Float32(f32),
    /// Literal of `ldc.r8`
    Float64(f64),
    /// Local or argument index
    Variable(u16),
    /// String literal of `ldstr`
    String(String),
    /// Metadata token of a type, method, field or signature
    Token(Token),
    /// Index of the branch target instruction
    Target(usize),
    /// Indices of the switch target instructions
    Switch(Vec<usize>),
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::None, Operand::None) => true,
            (Operand::Int32(a), Operand::Int32(b)) => a == b,
            (Operand::Int64(a), Operand::Int64(b)) => a == b,
            // Bitwise, so NaN payloads compare like the bytes they came from
            (Operand::Float32(a), Operand::Float32(b)) => a.to_bits() == b.to_bits(),
            (Operand::Float64(a), Operand::Float64(b)) => a.to_bits() == b.to_bits(),
            (Operand::Variable(a), Operand::Variable(b)) => a == b,
            (Operand::String(a), Operand::String(b)) => a == b,
            (Operand::Token(a), Operand::Token(b)) => a == b,
            (Operand::Target(a), Operand::Target(b)) => a == b,
            (Operand::Switch(a), Operand::Switch(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl Operand {
    /// Calls `f` on every instruction index held by this operand
    pub fn targets_mut(&mut self, mut f: impl FnMut(&mut usize)) {
        match self {
            Operand::Target(target) => f(target),
            Operand::Switch(targets) => targets.iter_mut().for_each(f),
            _ => {}
        }
    }

    /// All instruction indices held by this operand
    #[must_use]
    pub fn targets(&self) -> &[usize] {
        match self {
            Operand::Target(target) => std::slice::from_ref(target),
            Operand::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// The metadata token, if this is a token operand
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self {
            Operand::Token(token) => Some(*token),
            _ => None,
        }
    }
}

/// One CIL instruction: an opcode and its operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, [`Operand::None`] for opcodes without one
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// Create an instruction without operand
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// `ldc.i4 value`, always in the long form
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        Instruction::new(OpCode::LDC_I4, Operand::Int32(value))
    }

    /// `ret`
    #[must_use]
    pub fn ret() -> Self {
        Instruction::simple(OpCode::RET)
    }

    /// A branch to the instruction at `target`
    #[must_use]
    pub fn branch(opcode: OpCode, target: usize) -> Self {
        Instruction::new(opcode, Operand::Target(target))
    }

    /// `call token`
    #[must_use]
    pub fn call(token: Token) -> Self {
        Instruction::new(OpCode::CALL, Operand::Token(token))
    }

    /// `ldstr value`
    #[must_use]
    pub fn ldstr(value: impl Into<String>) -> Self {
        Instruction::new(OpCode::LDSTR, Operand::String(value.into()))
    }

    /// Mnemonic of the opcode
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.mnemonic()
    }

    /// Returns true if execution never falls through to the next instruction
    #[must_use]
    pub fn ends_block(&self) -> bool {
        use crate::assembly::FlowType;
        matches!(
            self.opcode.flow(),
            FlowType::Return
                | FlowType::Throw
                | FlowType::UnconditionalBranch
                | FlowType::Leave
                | FlowType::EndFinally
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int32(v) => write!(f, " {v}"),
            Operand::Int64(v) => write!(f, " {v}"),
            Operand::Float32(v) => write!(f, " {v}"),
            Operand::Float64(v) => write!(f, " {v}"),
            Operand::Variable(v) => write!(f, " {v}"),
            Operand::String(s) => write!(f, " {s:?}"),
            Operand::Token(t) => write!(f, " 0x{:08X}", t.value()),
            Operand::Target(t) => write!(f, " IL_{t:04}"),
            Operand::Switch(targets) => {
                f.write_str(" (")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "IL_{t:04}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Instruction::ret().to_string(), "ret");
        assert_eq!(Instruction::branch(OpCode::BR_S, 3).to_string(), "br.s IL_0003");
        assert_eq!(
            Instruction::call(Token::new(0x0A000001)).to_string(),
            "call 0x0A000001"
        );
        assert_eq!(Instruction::ldstr("hi").to_string(), "ldstr \"hi\"");
        assert_eq!(
            Instruction::new(OpCode::SWITCH, Operand::Switch(vec![1, 2])).to_string(),
            "switch (IL_0001, IL_0002)"
        );
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Operand::Float64(f64::NAN), Operand::Float64(f64::NAN));
        assert_ne!(Operand::Float32(0.0), Operand::Float32(-0.0));
    }

    #[test]
    fn targets() {
        let mut op = Operand::Switch(vec![1, 4]);
        op.targets_mut(|t| *t += 2);
        assert_eq!(op.targets(), &[3, 6]);
        assert!(Operand::Int32(5).targets().is_empty());
        assert!(Instruction::ret().ends_block());
        assert!(!Instruction::ldc_i4(1).ends_block());
    }
}
