//! End-to-end weaving: author a module, emit it, run the pipeline, read the result back.

use dotweave::prelude::*;

const CLOCK: &str = "Game.Clock";

/// A module calling into the core library, with a marker, a look-alike and a plain method
fn game_module() -> Module {
    let mut builder = ModuleBuilder::new("Game.dll");
    builder.assembly("Game", Version::new(1, 2, 0, 0));
    builder.symbols("Game.pdb");
    let runtime = builder.assembly_ref("System.Runtime", Version::new(8, 0, 0, 0));
    let object = builder.type_ref(runtime, "System", "Object");
    let console = builder.type_ref(runtime, "System", "Console");
    let write_line = builder
        .method_ref(
            console,
            "WriteLine",
            &SignatureMethod::new_static(TypeSignature::Void, vec![TypeSignature::I4]),
        )
        .unwrap();
    let document = builder.document("/src/Game/Clock.cs");
    let returns_int = SignatureMethod::new_static(TypeSignature::I4, vec![]);

    builder.type_def("Game", "Clock", object);
    builder
        .method(
            MARKER_METHOD,
            0x0016,
            &returns_int,
            Some(
                MethodBodyBuilder::new()
                    .line(document, 12, 9, 18)
                    .instruction(Instruction::ldc_i4(0))
                    .instruction(Instruction::ret())
                    .build(),
            ),
        )
        .unwrap();
    builder
        .method(
            "_Debug_Weaver_Helper",
            0x0016,
            &returns_int,
            Some(
                MethodBodyBuilder::new()
                    .line(document, 17, 9, 19)
                    .instruction(Instruction::ldc_i4(7))
                    .instruction(Instruction::ret())
                    .build(),
            ),
        )
        .unwrap();
    builder
        .method(
            "Print",
            0x0016,
            &SignatureMethod::new_static(TypeSignature::Void, vec![]),
            Some(
                MethodBodyBuilder::new()
                    .line(document, 22, 9, 40)
                    .instruction(Instruction::ldc_i4(3))
                    .instruction(Instruction::call(write_line))
                    .line(document, 23, 5, 6)
                    .instruction(Instruction::ret())
                    .build(),
            ),
        )
        .unwrap();
    builder.build()
}

fn compiled(module: &Module) -> CompiledModule {
    let emitted = emit(module).unwrap();
    CompiledModule::new(module.name.clone(), emitted.code, emitted.symbols)
}

fn reload(output: &WovenModule) -> Module {
    ModuleReader::new(&RuntimeResolver::new())
        .read("Game.dll", &output.code, Some(output.symbols.as_slice()))
        .unwrap()
}

fn afternoon() -> TimeOfDay {
    TimeOfDay::from_hms(13, 7, 45).unwrap()
}

#[test]
fn marker_returns_time_of_day() {
    let input = compiled(&game_module());
    let output = weave(
        &input,
        afternoon(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    )
    .unwrap();

    assert_eq!(output.report.constant, 47265);
    assert_eq!(output.report.methods.len(), 1);
    assert_eq!(output.report.methods[0].type_name, CLOCK);
    assert_eq!(output.report.methods[0].token, Token::new(0x0600_0001));

    let module = reload(&output);
    let (token, marker) = module.find_method(CLOCK, MARKER_METHOD).unwrap();
    let body = marker.body.as_ref().unwrap();
    assert_eq!(
        body.instructions,
        vec![
            Instruction::ldc_i4(47265),
            Instruction::ret(),
            Instruction::ldc_i4(0),
            Instruction::ret(),
        ]
    );

    let points = &body.symbols.as_ref().unwrap().points;
    assert_eq!(points.len(), 2);
    assert!(points[0].is_hidden());
    assert_eq!(points[0].instruction, 0);
    assert_eq!(points[1].instruction, 2);
    assert_eq!(points[1].start_line, 12);

    assert_eq!(
        Emulator::new(&module).invoke(token, &[]).unwrap(),
        EmValue::I32(47265)
    );
}

#[test]
fn look_alike_is_untouched() {
    let original = game_module();
    let input = compiled(&original);
    let output = weave(
        &input,
        afternoon(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    )
    .unwrap();
    let module = reload(&output);

    for name in ["_Debug_Weaver_Helper", "Print"] {
        let (_, before) = original.find_method(CLOCK, name).unwrap();
        let (_, after) = module.find_method(CLOCK, name).unwrap();
        assert_eq!(before.signature, after.signature);
        assert_eq!(before.body, after.body, "{name} changed");
    }

    let (helper, _) = module.find_method(CLOCK, "_Debug_Weaver_Helper").unwrap();
    assert_eq!(
        Emulator::new(&module).invoke(helper, &[]).unwrap(),
        EmValue::I32(7)
    );
}

#[test]
fn no_marker_is_identity() {
    let mut original = game_module();
    for ty in &mut original.types {
        ty.methods.retain(|method| method.name != MARKER_METHOD);
    }
    let input = compiled(&original);

    let output = weave(
        &input,
        afternoon(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    )
    .unwrap();

    assert!(output.report.is_empty());
    assert_eq!(output.code, input.code);
    assert_eq!(output.symbols, input.symbols);
}

#[test]
fn strip_original() {
    let input = compiled(&game_module());
    let options = WeaveOptions {
        dead_code: DeadCodePolicy::Strip,
    };
    let output = weave(&input, TimeOfDay::MIDNIGHT, &RuntimeResolver::new(), &options).unwrap();

    let module = reload(&output);
    let (_, marker) = module.find_method(CLOCK, MARKER_METHOD).unwrap();
    let body = marker.body.as_ref().unwrap();
    assert_eq!(
        body.instructions,
        vec![Instruction::ldc_i4(0), Instruction::ret()]
    );
    assert_eq!(
        body.symbols.as_ref().unwrap().points,
        vec![SourcePoint::hidden(0, 1)]
    );
}

#[test]
fn every_woven_body_starts_with_prologue() {
    let mut builder = ModuleBuilder::new("Many.dll");
    builder.symbols("Many.pdb");
    let returns_int = SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]);
    for ty in 0..5 {
        builder.type_def("Many", &format!("T{ty}"), Token::new(0));
        builder
            .method(
                MARKER_METHOD,
                0x0016,
                &returns_int,
                Some(MethodBody::new(vec![
                    Instruction::simple(OpCode::LDARG_0),
                    Instruction::ret(),
                ])),
            )
            .unwrap();
    }
    let input = compiled(&builder.build());

    let time = TimeOfDay::now();
    let output = weave(&input, time, &RuntimeResolver::new(), &WeaveOptions::default()).unwrap();
    assert_eq!(output.report.methods.len(), 5);
    assert!((0..86_400).contains(&output.report.constant));

    let module = reload(&output);
    let mut emulator = Emulator::new(&module);
    for (token, _, method) in module.methods() {
        let body = method.body.as_ref().unwrap();
        assert_eq!(body.instructions[0], Instruction::ldc_i4(time.constant()));
        assert_eq!(body.instructions[1], Instruction::ret());
        assert_eq!(body.instructions[2].opcode, OpCode::LDARG_0);
        assert_eq!(
            emulator.invoke(token, &[EmValue::I32(99)]).unwrap(),
            EmValue::I32(time.constant())
        );
    }
}
