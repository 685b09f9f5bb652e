//! The instruction interpreter.

use std::cmp::Ordering;

use log::trace;

use crate::{
    assembly::{Instruction, OpCode, Operand},
    emulation::{EmValue, EmulationLimits},
    metadata::{
        signatures::{parse_method_signature, TypeSignature},
        tables::TableId,
        token::Token,
    },
    model::Module,
    Error, Result,
};

fn failure(context: &str, message: impl std::fmt::Display) -> Error {
    Error::EmulationFailure(format!("{context}: {message}"))
}

macro_rules! integer_ops {
    ($binary:ident, $shift:ident, $signed:ty, $unsigned:ty) => {
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
        fn $binary(opcode: OpCode, a: $signed, b: $signed) -> Option<$signed> {
            match opcode {
                OpCode::ADD => Some(a.wrapping_add(b)),
                OpCode::SUB => Some(a.wrapping_sub(b)),
                OpCode::MUL => Some(a.wrapping_mul(b)),
                OpCode::DIV => a.checked_div(b),
                OpCode::DIV_UN => (a as $unsigned).checked_div(b as $unsigned).map(|v| v as $signed),
                OpCode::REM => a.checked_rem(b),
                OpCode::REM_UN => (a as $unsigned).checked_rem(b as $unsigned).map(|v| v as $signed),
                OpCode::AND => Some(a & b),
                OpCode::OR => Some(a | b),
                OpCode::XOR => Some(a ^ b),
                _ => None,
            }
        }

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
        fn $shift(opcode: OpCode, value: $signed, amount: u32) -> Option<$signed> {
            match opcode {
                OpCode::SHL => Some(value.wrapping_shl(amount)),
                OpCode::SHR => Some(value.wrapping_shr(amount)),
                OpCode::SHR_UN => Some((value as $unsigned).wrapping_shr(amount) as $signed),
                _ => None,
            }
        }
    };
}

integer_ops!(binary_i32, shift_i32, i32, u32);
integer_ops!(binary_i64, shift_i64, i64, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl Condition {
    /// The condition of a comparing branch and whether it compares unsigned
    fn of_branch(opcode: OpCode) -> Option<(Condition, bool)> {
        let condition = match opcode {
            OpCode::BEQ | OpCode::BEQ_S => (Condition::Equal, false),
            OpCode::BNE_UN | OpCode::BNE_UN_S => (Condition::NotEqual, true),
            OpCode::BGT | OpCode::BGT_S => (Condition::Greater, false),
            OpCode::BGT_UN | OpCode::BGT_UN_S => (Condition::Greater, true),
            OpCode::BGE | OpCode::BGE_S => (Condition::GreaterOrEqual, false),
            OpCode::BGE_UN | OpCode::BGE_UN_S => (Condition::GreaterOrEqual, true),
            OpCode::BLT | OpCode::BLT_S => (Condition::Less, false),
            OpCode::BLT_UN | OpCode::BLT_UN_S => (Condition::Less, true),
            OpCode::BLE | OpCode::BLE_S => (Condition::LessOrEqual, false),
            OpCode::BLE_UN | OpCode::BLE_UN_S => (Condition::LessOrEqual, true),
            _ => return None,
        };
        Some(condition)
    }

    /// The condition of a `ceq`/`cgt`/`clt` family instruction
    fn of_compare(opcode: OpCode) -> Option<(Condition, bool)> {
        let condition = match opcode {
            OpCode::CEQ => (Condition::Equal, false),
            OpCode::CGT => (Condition::Greater, false),
            OpCode::CGT_UN => (Condition::Greater, true),
            OpCode::CLT => (Condition::Less, false),
            OpCode::CLT_UN => (Condition::Less, true),
            _ => return None,
        };
        Some(condition)
    }

    #[allow(clippy::cast_sign_loss)]
    fn holds(self, unsigned: bool, a: EmValue, b: EmValue, context: &str) -> Result<bool> {
        let ordering = match (a, b) {
            (EmValue::I32(a), EmValue::I32(b)) if unsigned => (a as u32).cmp(&(b as u32)),
            (EmValue::I32(a), EmValue::I32(b)) => a.cmp(&b),
            (EmValue::I64(a), EmValue::I64(b)) if unsigned => (a as u64).cmp(&(b as u64)),
            (EmValue::I64(a), EmValue::I64(b)) => a.cmp(&b),
            (a, b) => return Err(failure(context, format!("can not compare {a} with {b}"))),
        };

        Ok(match self {
            Condition::Equal => ordering == Ordering::Equal,
            Condition::NotEqual => ordering != Ordering::Equal,
            Condition::Greater => ordering == Ordering::Greater,
            Condition::GreaterOrEqual => ordering != Ordering::Less,
            Condition::Less => ordering == Ordering::Less,
            Condition::LessOrEqual => ordering != Ordering::Greater,
        })
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn convert(opcode: OpCode, value: EmValue, context: &str) -> Result<EmValue> {
    let Some(wide) = value.as_i64() else {
        return Err(failure(context, "conversion of void"));
    };

    Ok(match opcode {
        OpCode::CONV_I1 => EmValue::I32(i32::from(wide as i8)),
        OpCode::CONV_U1 => EmValue::I32(i32::from(wide as u8)),
        OpCode::CONV_I2 => EmValue::I32(i32::from(wide as i16)),
        OpCode::CONV_U2 => EmValue::I32(i32::from(wide as u16)),
        OpCode::CONV_I4 | OpCode::CONV_U4 => EmValue::I32(wide as i32),
        OpCode::CONV_I8 => EmValue::I64(wide),
        OpCode::CONV_U8 => match value {
            EmValue::I32(narrow) => EmValue::I64(i64::from(narrow as u32)),
            _ => EmValue::I64(wide),
        },
        other => return Err(failure(context, format!("{other} is not a conversion"))),
    })
}

fn target(instruction: &Instruction, context: &str) -> Result<usize> {
    match instruction.operand {
        Operand::Target(target) => Ok(target),
        _ => Err(failure(context, format!("{} without target", instruction.mnemonic()))),
    }
}

fn variable(instruction: &Instruction, context: &str) -> Result<usize> {
    match instruction.operand {
        Operand::Variable(index) => Ok(usize::from(index)),
        _ => Err(failure(context, format!("{} without index", instruction.mnemonic()))),
    }
}

fn pop(stack: &mut Vec<EmValue>, context: &str) -> Result<EmValue> {
    stack
        .pop()
        .ok_or_else(|| failure(context, "evaluation stack underflow"))
}

fn slot<'a>(slots: &'a mut [EmValue], index: usize, context: &str) -> Result<&'a mut EmValue> {
    let count = slots.len();
    slots
        .get_mut(index)
        .ok_or_else(|| failure(context, format!("slot {index} of {count}")))
}

/// Evaluates static methods of one module that compute with integers.
///
/// The supported subset covers constants, arguments, locals, integer arithmetic, comparisons,
/// conversions, branches, `switch` and calls to other methods of the same module. Anything
/// else stops the evaluation with [`Error::EmulationFailure`].
pub struct Emulator<'m> {
    module: &'m Module,
    limits: EmulationLimits,
    executed: u64,
}

impl<'m> Emulator<'m> {
    /// Create an emulator over `module` with the default limits
    #[must_use]
    pub fn new(module: &'m Module) -> Self {
        Self::with_limits(module, EmulationLimits::default())
    }

    /// Create an emulator over `module`
    #[must_use]
    pub fn with_limits(module: &'m Module, limits: EmulationLimits) -> Self {
        Emulator {
            module,
            limits,
            executed: 0,
        }
    }

    /// Instructions executed so far, across all invocations
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Invoke the method `token` with `args` and return its result, [`EmValue::Void`] for
    /// `void` methods.
    ///
    /// # Errors
    /// Returns [`Error::EmulationFailure`] for unsupported instructions, invalid stack use or
    /// an exhausted instruction budget, and [`Error::RecursionLimit`] if calls nest deeper
    /// than the limit allows.
    pub fn invoke(&mut self, token: Token, args: &[EmValue]) -> Result<EmValue> {
        self.run(token, args.to_vec(), 0)
    }

    /// Invoke the method `method_name` of the type `type_name`.
    ///
    /// # Errors
    /// Returns [`Error::EmulationFailure`] if there is no such method; see
    /// [`Emulator::invoke`] for the rest.
    pub fn invoke_named(
        &mut self,
        type_name: &str,
        method_name: &str,
        args: &[EmValue],
    ) -> Result<EmValue> {
        let (token, _) = self
            .module
            .find_method(type_name, method_name)
            .ok_or_else(|| {
                Error::EmulationFailure(format!("{type_name}::{method_name} does not exist"))
            })?;
        self.invoke(token, args)
    }

    fn run(&mut self, token: Token, mut args: Vec<EmValue>, depth: usize) -> Result<EmValue> {
        if depth >= self.limits.max_call_depth {
            return Err(Error::RecursionLimit(self.limits.max_call_depth));
        }

        let module = self.module;
        let method = module
            .method(token)
            .ok_or_else(|| failure(&token.to_string(), "not a method of this module"))?;
        let context = format!("{}({})", method.name, token);
        let signature = parse_method_signature(&method.signature)?;
        if signature.has_this {
            return Err(failure(&context, "instance methods are not supported"));
        }
        if args.len() != signature.params.len() {
            return Err(failure(
                &context,
                format!(
                    "expects {} argument(s), got {}",
                    signature.params.len(),
                    args.len()
                ),
            ));
        }
        let body = method
            .body
            .as_ref()
            .ok_or_else(|| failure(&context, "has no body"))?;

        let mut locals = body
            .locals
            .iter()
            .map(EmValue::zero)
            .collect::<Result<Vec<_>>>()?;
        let mut stack: Vec<EmValue> = Vec::new();
        let mut pc = 0;

        trace!("emulating {} at depth {}", context, depth);
        loop {
            let instruction = body
                .instructions
                .get(pc)
                .ok_or_else(|| failure(&context, format!("execution ran off the body at {pc}")))?;
            self.executed += 1;
            if self.limits.max_instructions > 0 && self.executed > self.limits.max_instructions {
                return Err(failure(
                    &context,
                    format!(
                        "instruction budget of {} exhausted",
                        self.limits.max_instructions
                    ),
                ));
            }

            let mut next = pc + 1;
            let opcode = instruction.opcode;
            match opcode {
                OpCode::NOP => {}
                OpCode::LDARG_0 | OpCode::LDARG_1 | OpCode::LDARG_2 | OpCode::LDARG_3 => {
                    let index = usize::from(opcode.0 - OpCode::LDARG_0.0);
                    stack.push(*slot(&mut args, index, &context)?);
                }
                OpCode::LDARG_S | OpCode::LDARG => {
                    let index = variable(instruction, &context)?;
                    stack.push(*slot(&mut args, index, &context)?);
                }
                OpCode::STARG_S | OpCode::STARG => {
                    let index = variable(instruction, &context)?;
                    let value = pop(&mut stack, &context)?;
                    *slot(&mut args, index, &context)? = value;
                }
                OpCode::LDLOC_0 | OpCode::LDLOC_1 | OpCode::LDLOC_2 | OpCode::LDLOC_3 => {
                    let index = usize::from(opcode.0 - OpCode::LDLOC_0.0);
                    stack.push(*slot(&mut locals, index, &context)?);
                }
                OpCode::LDLOC_S | OpCode::LDLOC => {
                    let index = variable(instruction, &context)?;
                    stack.push(*slot(&mut locals, index, &context)?);
                }
                OpCode::STLOC_0 | OpCode::STLOC_1 | OpCode::STLOC_2 | OpCode::STLOC_3 => {
                    let index = usize::from(opcode.0 - OpCode::STLOC_0.0);
                    let value = pop(&mut stack, &context)?;
                    *slot(&mut locals, index, &context)? = value;
                }
                OpCode::STLOC_S | OpCode::STLOC => {
                    let index = variable(instruction, &context)?;
                    let value = pop(&mut stack, &context)?;
                    *slot(&mut locals, index, &context)? = value;
                }
                OpCode::LDC_I4_M1
                | OpCode::LDC_I4_0
                | OpCode::LDC_I4_1
                | OpCode::LDC_I4_2
                | OpCode::LDC_I4_3
                | OpCode::LDC_I4_4
                | OpCode::LDC_I4_5
                | OpCode::LDC_I4_6
                | OpCode::LDC_I4_7
                | OpCode::LDC_I4_8 => {
                    stack.push(EmValue::I32(
                        i32::from(opcode.0) - i32::from(OpCode::LDC_I4_0.0),
                    ));
                }
                OpCode::LDC_I4_S | OpCode::LDC_I4 | OpCode::LDC_I8 => {
                    match instruction.operand {
                        Operand::Int32(value) => stack.push(EmValue::I32(value)),
                        Operand::Int64(value) => stack.push(EmValue::I64(value)),
                        _ => return Err(failure(&context, format!("{opcode} without literal"))),
                    }
                }
                OpCode::DUP => {
                    let value = pop(&mut stack, &context)?;
                    stack.push(value);
                    stack.push(value);
                }
                OpCode::POP => {
                    pop(&mut stack, &context)?;
                }
                OpCode::ADD
                | OpCode::SUB
                | OpCode::MUL
                | OpCode::DIV
                | OpCode::DIV_UN
                | OpCode::REM
                | OpCode::REM_UN
                | OpCode::AND
                | OpCode::OR
                | OpCode::XOR => {
                    let b = pop(&mut stack, &context)?;
                    let a = pop(&mut stack, &context)?;
                    let result = match (a, b) {
                        (EmValue::I32(a), EmValue::I32(b)) => {
                            binary_i32(opcode, a, b).map(EmValue::I32)
                        }
                        (EmValue::I64(a), EmValue::I64(b)) => {
                            binary_i64(opcode, a, b).map(EmValue::I64)
                        }
                        _ => {
                            return Err(failure(
                                &context,
                                format!("{opcode} on mismatched operands {a} and {b}"),
                            ))
                        }
                    };
                    stack.push(result.ok_or_else(|| {
                        failure(&context, format!("{opcode} of {a} and {b} traps"))
                    })?);
                }
                OpCode::SHL | OpCode::SHR | OpCode::SHR_UN => {
                    let amount = pop(&mut stack, &context)?;
                    let value = pop(&mut stack, &context)?;
                    #[allow(clippy::cast_sign_loss)]
                    let amount = amount
                        .as_i32()
                        .ok_or_else(|| failure(&context, format!("shift by {amount}")))?
                        as u32;
                    let result = match value {
                        EmValue::I32(value) => shift_i32(opcode, value, amount).map(EmValue::I32),
                        EmValue::I64(value) => shift_i64(opcode, value, amount).map(EmValue::I64),
                        EmValue::Void => None,
                    };
                    stack.push(
                        result.ok_or_else(|| failure(&context, format!("{opcode} of {value}")))?,
                    );
                }
                OpCode::NEG | OpCode::NOT => {
                    let value = pop(&mut stack, &context)?;
                    let result = match (opcode, value) {
                        (OpCode::NEG, EmValue::I32(v)) => EmValue::I32(v.wrapping_neg()),
                        (OpCode::NEG, EmValue::I64(v)) => EmValue::I64(v.wrapping_neg()),
                        (_, EmValue::I32(v)) => EmValue::I32(!v),
                        (_, EmValue::I64(v)) => EmValue::I64(!v),
                        _ => return Err(failure(&context, format!("{opcode} of void"))),
                    };
                    stack.push(result);
                }
                OpCode::CONV_I1
                | OpCode::CONV_U1
                | OpCode::CONV_I2
                | OpCode::CONV_U2
                | OpCode::CONV_I4
                | OpCode::CONV_U4
                | OpCode::CONV_I8
                | OpCode::CONV_U8 => {
                    let value = pop(&mut stack, &context)?;
                    stack.push(convert(opcode, value, &context)?);
                }
                OpCode::CEQ | OpCode::CGT | OpCode::CGT_UN | OpCode::CLT | OpCode::CLT_UN => {
                    let b = pop(&mut stack, &context)?;
                    let a = pop(&mut stack, &context)?;
                    if let Some((condition, unsigned)) = Condition::of_compare(opcode) {
                        stack.push(EmValue::from(condition.holds(unsigned, a, b, &context)?));
                    }
                }
                OpCode::BR | OpCode::BR_S => next = target(instruction, &context)?,
                OpCode::BRTRUE | OpCode::BRTRUE_S | OpCode::BRFALSE | OpCode::BRFALSE_S => {
                    let value = pop(&mut stack, &context)?;
                    let on_true = opcode == OpCode::BRTRUE || opcode == OpCode::BRTRUE_S;
                    if value.is_true() == on_true {
                        next = target(instruction, &context)?;
                    }
                }
                OpCode::SWITCH => {
                    let Operand::Switch(targets) = &instruction.operand else {
                        return Err(failure(&context, "switch without targets"));
                    };
                    let value = pop(&mut stack, &context)?;
                    let selected = value
                        .as_i32()
                        .and_then(|value| u32::try_from(value).ok())
                        .and_then(|value| targets.get(value as usize));
                    if let Some(selected) = selected {
                        next = *selected;
                    }
                }
                OpCode::CALL => {
                    let Operand::Token(callee) = instruction.operand else {
                        return Err(failure(&context, "call without token"));
                    };
                    if !callee.is_table(TableId::MethodDef) {
                        return Err(failure(
                            &context,
                            format!("call to {callee} leaves the module"),
                        ));
                    }
                    let callee_method = module
                        .method(callee)
                        .ok_or_else(|| failure(&context, format!("call to missing {callee}")))?;
                    let count = parse_method_signature(&callee_method.signature)?
                        .params
                        .len();
                    if stack.len() < count {
                        return Err(failure(&context, "evaluation stack underflow"));
                    }
                    let call_args = stack.split_off(stack.len() - count);
                    let result = self.run(callee, call_args, depth + 1)?;
                    if result != EmValue::Void {
                        stack.push(result);
                    }
                }
                OpCode::RET => {
                    return if matches!(signature.return_type, TypeSignature::Void) {
                        Ok(EmValue::Void)
                    } else {
                        pop(&mut stack, &context)
                    };
                }
                other => {
                    if let Some((condition, unsigned)) = Condition::of_branch(other) {
                        let b = pop(&mut stack, &context)?;
                        let a = pop(&mut stack, &context)?;
                        if condition.holds(unsigned, a, b, &context)? {
                            next = target(instruction, &context)?;
                        }
                    } else {
                        return Err(failure(&context, format!("{other} is not supported")));
                    }
                }
            }

            pc = next;
        }
    }
}
