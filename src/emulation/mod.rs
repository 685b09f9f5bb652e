//! A small evaluator for integer-only method bodies.
//!
//! The emulator runs the instructions of a [`crate::model::Module`] directly, without loading
//! it into a runtime. It is how the behavior of a woven method is observed: after weaving and
//! re-reading a module, invoking a marker method returns the injected time of day.
//!
//! Only static methods computing with `int32` and `int64` values are supported. Execution is
//! bounded by [`EmulationLimits`].
//!
//! # Examples
//!
//! ```rust
//! use dotweave::assembly::Instruction;
//! use dotweave::emulation::{EmValue, Emulator};
//! use dotweave::metadata::signatures::{SignatureMethod, TypeSignature};
//! use dotweave::metadata::token::Token;
//! use dotweave::model::{MethodBody, ModuleBuilder};
//!
//! let mut builder = ModuleBuilder::new("Answer.dll");
//! builder.type_def("", "Answer", Token::new(0));
//! let token = builder.method(
//!     "Get",
//!     0x0016,
//!     &SignatureMethod::new_static(TypeSignature::I4, vec![]),
//!     Some(MethodBody::new(vec![Instruction::ldc_i4(42), Instruction::ret()])),
//! )?;
//! let module = builder.build();
//!
//! assert_eq!(Emulator::new(&module).invoke(token, &[])?, EmValue::I32(42));
//! # Ok::<(), dotweave::Error>(())
//! ```

mod interpreter;
mod value;

pub use interpreter::Emulator;
pub use value::EmValue;

/// Resource limits of an [`Emulator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulationLimits {
    /// Maximum instructions to execute, 0 for no limit
    pub max_instructions: u64,
    /// Maximum nesting of calls
    pub max_call_depth: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_instructions: 1_000_000,
            max_call_depth: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode, Operand},
        metadata::{
            signatures::{SignatureLocalVariables, SignatureMethod, TypeSignature},
            token::Token,
        },
        model::{MethodBody, MethodBodyBuilder, ModuleBuilder},
        weaver::{weave_module, TimeOfDay, WeaveOptions, MARKER_METHOD},
        Error,
    };

    fn static_method(params: usize) -> SignatureMethod {
        SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4; params])
    }

    #[test]
    fn woven_marker() {
        let mut builder = ModuleBuilder::new("Clock.dll");
        builder.type_def("Game", "Clock", Token::new(0));
        let token = builder
            .method(
                MARKER_METHOD,
                0x0016,
                &static_method(0),
                Some(MethodBody::new(vec![Instruction::ldc_i4(0), Instruction::ret()])),
            )
            .unwrap();
        let mut module = builder.build();
        assert_eq!(
            Emulator::new(&module).invoke(token, &[]).unwrap(),
            EmValue::I32(0)
        );

        let time = TimeOfDay::from_hms(13, 7, 45).unwrap();
        weave_module(&mut module, time, &WeaveOptions::default()).unwrap();
        let mut emulator = Emulator::new(&module);
        assert_eq!(emulator.invoke(token, &[]).unwrap(), EmValue::I32(47265));
        assert_eq!(emulator.executed(), 2);
    }

    #[test]
    fn loop_with_locals() {
        let mut builder = ModuleBuilder::new("Math.dll");
        let locals = SignatureLocalVariables {
            locals: vec![TypeSignature::I4],
        };
        let signature = builder.local_signature(&locals).unwrap();
        builder.type_def("Game", "Math", Token::new(0));

        let body = MethodBodyBuilder::new()
            .locals(signature, locals.locals.clone())
            .instructions([
                Instruction::simple(OpCode::LDC_I4_0),
                Instruction::simple(OpCode::STLOC_0),
                Instruction::branch(OpCode::BR_S, 11),
                Instruction::simple(OpCode::LDLOC_0),
                Instruction::simple(OpCode::LDARG_0),
                Instruction::simple(OpCode::ADD),
                Instruction::simple(OpCode::STLOC_0),
                Instruction::simple(OpCode::LDARG_0),
                Instruction::simple(OpCode::LDC_I4_1),
                Instruction::simple(OpCode::SUB),
                Instruction::new(OpCode::STARG_S, Operand::Variable(0)),
                Instruction::simple(OpCode::LDARG_0),
                Instruction::simple(OpCode::LDC_I4_0),
                Instruction::branch(OpCode::BGT_S, 3),
                Instruction::simple(OpCode::LDLOC_0),
                Instruction::ret(),
            ])
            .build();
        builder
            .method("Sum", 0x0016, &static_method(1), Some(body))
            .unwrap();
        let module = builder.build();

        let mut emulator = Emulator::new(&module);
        assert_eq!(
            emulator
                .invoke_named("Game.Math", "Sum", &[EmValue::I32(10)])
                .unwrap(),
            EmValue::I32(55)
        );
        assert_eq!(
            emulator
                .invoke_named("Game.Math", "Sum", &[EmValue::I32(0)])
                .unwrap(),
            EmValue::I32(0)
        );
    }

    #[test]
    fn limits() {
        let mut builder = ModuleBuilder::new("Limits.dll");
        builder.type_def("Game", "Limits", Token::new(0));
        let spin = builder
            .method(
                "Spin",
                0x0016,
                &static_method(0),
                Some(MethodBody::new(vec![Instruction::branch(OpCode::BR_S, 0)])),
            )
            .unwrap();
        let recurse = builder
            .method(
                "Recurse",
                0x0016,
                &static_method(0),
                Some(MethodBody::new(vec![
                    Instruction::call(Token::new(0x0600_0002)),
                    Instruction::ret(),
                ])),
            )
            .unwrap();
        let module = builder.build();

        let limits = EmulationLimits {
            max_instructions: 100,
            max_call_depth: 16,
        };
        assert!(matches!(
            Emulator::with_limits(&module, limits).invoke(spin, &[]),
            Err(Error::EmulationFailure(_))
        ));
        assert!(matches!(
            Emulator::with_limits(&module, limits).invoke(recurse, &[]),
            Err(Error::RecursionLimit(16))
        ));
    }

    #[test]
    fn unsupported() {
        let mut builder = ModuleBuilder::new("Text.dll");
        builder.type_def("Game", "Text", Token::new(0));
        let token = builder
            .method(
                "Greet",
                0x0016,
                &static_method(0),
                Some(MethodBody::new(vec![
                    Instruction::ldstr("hello"),
                    Instruction::ret(),
                ])),
            )
            .unwrap();
        let module = builder.build();

        assert!(matches!(
            Emulator::new(&module).invoke(token, &[]),
            Err(Error::EmulationFailure(_))
        ));
        assert!(Emulator::new(&module)
            .invoke(token, &[EmValue::I32(1)])
            .is_err());
    }
}
