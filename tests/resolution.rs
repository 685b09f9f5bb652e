//! Reference resolution seen through the weaving pipeline.

use dotweave::prelude::*;

const LIBRARY: &str = "Game.Core";

/// A library defining `Game.Core.Dice::Roll(int32) : int32`
fn library_image() -> Vec<u8> {
    let mut builder = ModuleBuilder::new("Game.Core.dll");
    builder.assembly(LIBRARY, Version::new(1, 0, 0, 0));
    builder.type_def("Game.Core", "Dice", Token::new(0));
    builder
        .method(
            "Roll",
            0x0016,
            &SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]),
            Some(MethodBody::new(vec![
                Instruction::simple(OpCode::LDARG_0),
                Instruction::ret(),
            ])),
        )
        .unwrap();
    emit(&builder.build()).unwrap().code
}

/// A module whose marker calls into the library and the core library
fn game(core_alias: &str) -> CompiledModule {
    game_referencing(core_alias, LIBRARY)
}

fn game_referencing(core_alias: &str, library: &str) -> CompiledModule {
    let mut builder = ModuleBuilder::new("Game.dll");
    builder.assembly("Game", Version::new(1, 0, 0, 0));
    builder.symbols("Game.pdb");
    let runtime = builder.assembly_ref(core_alias, Version::new(4, 0, 0, 0));
    let object = builder.type_ref(runtime, "System", "Object");
    let core = builder.assembly_ref(library, Version::new(1, 0, 0, 0));
    let dice = builder.type_ref(core, "Game.Core", "Dice");
    let roll = builder
        .method_ref(
            dice,
            "Roll",
            &SignatureMethod::new_static(TypeSignature::I4, vec![TypeSignature::I4]),
        )
        .unwrap();

    builder.type_def("Game", "Table", object);
    builder
        .method(
            MARKER_METHOD,
            0x0016,
            &SignatureMethod::new_static(TypeSignature::I4, vec![]),
            Some(MethodBody::new(vec![
                Instruction::ldc_i4(6),
                Instruction::call(roll),
                Instruction::ret(),
            ])),
        )
        .unwrap();

    let emitted = emit(&builder.build()).unwrap();
    CompiledModule::new("Game.dll", emitted.code, emitted.symbols)
}

fn noon() -> TimeOfDay {
    TimeOfDay::from_hms(12, 0, 0).unwrap()
}

fn library_resolver() -> ChainedResolver {
    ChainedResolver::new()
        .with(
            SearchPathResolver::new()
                .with_image("Game.Core.dll", library_image())
                .unwrap(),
        )
        .with(RuntimeResolver::new())
}

#[test]
fn unresolved_reference_fails_the_module() {
    let result = weave(
        &game("System.Runtime"),
        noon(),
        &RuntimeResolver::empty(),
        &WeaveOptions::default(),
    );

    match result {
        Err(Error::UnresolvedReference { symbol, .. }) => {
            assert_eq!(symbol, "[System.Runtime]System.Object");
        }
        other => panic!("expected an unresolved reference, got {other:?}"),
    }
}

#[test]
fn missing_library_is_reported() {
    let result = weave(
        &game("System.Runtime"),
        noon(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    );

    match result {
        Err(Error::UnresolvedReference { symbol, .. }) => {
            assert!(symbol.starts_with("[Game.Core]Game.Core.Dice"), "{symbol}");
        }
        other => panic!("expected an unresolved reference, got {other:?}"),
    }
}

#[test]
fn chain_falls_back_per_reference() {
    let resolver = library_resolver();
    let output = weave(&game("System.Runtime"), noon(), &resolver, &WeaveOptions::default())
        .unwrap();
    assert_eq!(output.report.constant, 43_200);

    let module = ModuleReader::new(&resolver)
        .read("Game.dll", &output.code, Some(output.symbols.as_slice()))
        .unwrap();
    let roll = module.member_refs[0].definition.as_ref().unwrap();
    let member = roll.as_member().unwrap();
    assert_eq!(member.declaring.assembly, LIBRARY);
    assert_eq!(member.declaring.full_name(), "Game.Core.Dice");
    assert_eq!(member.name, "Roll");

    let object = module.type_refs[0].definition.as_ref().unwrap();
    assert_eq!(object.as_type().unwrap().assembly, CORE_LIBRARY);
}

#[test]
fn core_library_aliases_resolve_alike() {
    let resolver = library_resolver();
    for alias in ["mscorlib", "netstandard", "System.Runtime", "System.Private.CoreLib"] {
        let output = weave(&game(alias), noon(), &resolver, &WeaveOptions::default())
            .unwrap_or_else(|e| panic!("{alias}: {e}"));
        assert_eq!(output.report.methods.len(), 1, "{alias}");
    }
}

#[test]
fn resolution_failure_does_not_affect_other_modules() {
    let unrelated = {
        let mut builder = ModuleBuilder::new("Plain.dll");
        builder.symbols("Plain.pdb");
        builder.type_def("Plain", "Widget", Token::new(0));
        builder
            .method(
                MARKER_METHOD,
                0x0016,
                &SignatureMethod::new_static(TypeSignature::I4, vec![]),
                Some(MethodBody::new(vec![Instruction::ldc_i4(1), Instruction::ret()])),
            )
            .unwrap();
        let emitted = emit(&builder.build()).unwrap();
        CompiledModule::new("Plain.dll", emitted.code, emitted.symbols)
    };

    let results = weave_all(
        &[game("System.Runtime"), unrelated],
        noon(),
        &RuntimeResolver::new(),
        &WeaveOptions::default(),
    );
    assert!(matches!(results[0], Err(Error::UnresolvedReference { .. })));
    assert_eq!(results[1].as_ref().unwrap().report.methods.len(), 1);
}

#[test]
fn library_names_ignore_case() {
    let output = weave(
        &game_referencing("system.runtime", "game.core"),
        noon(),
        &library_resolver(),
        &WeaveOptions::default(),
    )
    .unwrap();
    assert_eq!(output.report.methods.len(), 1);
}
