//! Structural round trips through the reader and the emitter.

use dotweave::metadata::signatures::SignatureField;
use dotweave::prelude::*;

/// A module exercising every part of the graph the images can carry
fn rich_module() -> Module {
    let mut builder = ModuleBuilder::new("Rich.dll");
    builder.assembly("Rich", Version::new(2, 0, 1, 0));
    builder.symbols("Rich.pdb");
    let runtime = builder.assembly_ref("System.Runtime", Version::new(8, 0, 0, 0));
    let object = builder.type_ref(runtime, "System", "Object");
    let exception = builder.type_ref(runtime, "System", "Exception");
    let console = builder.type_ref(runtime, "System", "Console");
    let write_line = builder
        .method_ref(
            console,
            "WriteLine",
            &SignatureMethod::new_static(TypeSignature::Void, vec![TypeSignature::String]),
        )
        .unwrap();
    let locals = SignatureLocalVariables {
        locals: vec![TypeSignature::I4, TypeSignature::I8],
    };
    let local_signature = builder.local_signature(&locals).unwrap();
    let main_doc = builder.document("/src/Rich/Program.cs");
    let util_doc = builder.document("/src/Rich/Util.cs");

    builder.type_def("Rich", "Program", object);
    builder
        .field(
            "counter",
            0x0011,
            &SignatureField {
                base: TypeSignature::I4,
            },
        )
        .unwrap();

    // switch over the argument, with a catch around the console call
    let dispatch = MethodBodyBuilder::new()
        .max_stack(4)
        .init_locals(true)
        .locals(local_signature, locals.locals.clone())
        .line(main_doc, 10, 9, 30)
        .instruction(Instruction::simple(OpCode::LDARG_0))
        .instruction(Instruction::new(OpCode::SWITCH, Operand::Switch(vec![3, 5])))
        .instruction(Instruction::branch(OpCode::BR_S, 10))
        .line(main_doc, 12, 13, 40)
        .instruction(Instruction::ldstr("zero"))
        .instruction(Instruction::branch(OpCode::BR_S, 6))
        .instruction(Instruction::ldstr("one"))
        .instruction(Instruction::call(write_line))
        .line(main_doc, 16, 9, 20)
        .instruction(Instruction::branch(OpCode::LEAVE_S, 10))
        .instruction(Instruction::simple(OpCode::POP))
        .instruction(Instruction::branch(OpCode::LEAVE_S, 10))
        .hidden(main_doc)
        .instruction(Instruction::simple(OpCode::LDLOC_0))
        .instruction(Instruction::ret())
        .region(ExceptionRegion {
            kind: RegionKind::Catch(exception),
            try_start: 3,
            try_end: 8,
            handler_start: 8,
            handler_end: 10,
        })
        .build();
    builder
        .method(
            "Dispatch",
            0x0016,
            &SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]),
            Some(dispatch),
        )
        .unwrap();
    builder
        .method(
            "Extern",
            0x2016,
            &SignatureMethod::new_static(TypeSignature::Void, vec![]),
            None,
        )
        .unwrap();

    builder.type_def("Rich", "Util", object);
    let twice = MethodBodyBuilder::new()
        .line(util_doc, 3, 5, 30)
        .instructions([
            Instruction::simple(OpCode::LDARG_0),
            Instruction::simple(OpCode::LDC_I4_2),
            Instruction::simple(OpCode::MUL),
            Instruction::ret(),
        ])
        .build();
    let twice = builder
        .method(
            "Twice",
            0x0016,
            &SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]),
            Some(twice),
        )
        .unwrap();
    builder.entry_point(twice);
    builder.build()
}

fn read(code: &[u8], symbols: &[u8]) -> Module {
    ModuleReader::new(&RuntimeResolver::new())
        .read("Rich.dll", code, Some(symbols))
        .unwrap()
}

#[test]
fn reread_is_stable() {
    let first = emit(&rich_module()).unwrap();
    let module = read(&first.code, &first.symbols);

    let second = emit(&module).unwrap();
    let again = read(&second.code, &second.symbols);

    assert_eq!(module, again);
    assert_eq!(first, second);
}

#[test]
fn graph_survives() {
    let original = rich_module();
    let emitted = emit(&original).unwrap();
    let module = read(&emitted.code, &emitted.symbols);

    assert_eq!(module.assembly.as_ref().unwrap().name, "Rich");
    assert_eq!(module.documents.len(), 2);
    assert_eq!(module.entry_point, Token::new(0x0600_0003));
    assert_eq!(module.types[1].fields[0].name, "counter");
    assert!(module.type_refs.iter().all(|r| r.definition.is_some()));
    assert!(module.member_refs.iter().all(|r| r.definition.is_some()));

    for ((_, ty, before), (_, _, after)) in original.methods().zip(module.methods()) {
        assert_eq!(before.name, after.name, "in {}", ty.full_name());
        assert_eq!(before.body, after.body, "{}::{}", ty.full_name(), before.name);
    }
}

#[test]
fn weaving_keeps_indices_consistent() {
    let emitted = emit(&rich_module()).unwrap();
    let input = CompiledModule::new("Rich.dll", emitted.code, emitted.symbols);

    // Rename Dispatch into a marker so its branches, switch, region and points all move
    let mut module = read(&input.code, &input.symbols);
    module.types[1].methods[0].name = MARKER_METHOD.to_string();
    let renamed = emit(&module).unwrap();
    let input = CompiledModule::new("Rich.dll", renamed.code, renamed.symbols);

    let output = weave(
        &input,
        TimeOfDay::new(100).unwrap(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    )
    .unwrap();
    let woven = read(&output.code, &output.symbols);

    let before = module.types[1].methods[0].body.as_ref().unwrap();
    let after = woven.types[1].methods[0].body.as_ref().unwrap();
    assert_eq!(after.len(), before.len() + 2);
    assert_eq!(after.instructions[3].operand, Operand::Switch(vec![5, 7]));
    assert_eq!(after.instructions[4].operand, Operand::Target(12));
    assert_eq!(after.instructions[9].operand, Operand::Target(12));

    let region = &after.exception_regions[0];
    assert_eq!(
        (region.try_start, region.try_end, region.handler_start, region.handler_end),
        (5, 10, 10, 12)
    );

    let shifted: Vec<usize> = after.symbols.as_ref().unwrap().points[1..]
        .iter()
        .map(|point| point.instruction)
        .collect();
    let original: Vec<usize> = before
        .symbols
        .as_ref()
        .unwrap()
        .points
        .iter()
        .map(|point| point.instruction + 2)
        .collect();
    assert_eq!(shifted, original);
    assert_eq!(after.max_stack, before.max_stack);
    assert_eq!(after.local_var_sig, before.local_var_sig);
}
