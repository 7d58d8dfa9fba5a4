//! End-to-end launcher runs over serialized models on disk: filtering,
//! skipping on resource bounds, and output fidelity.

mod common;

use std::fs;

use dex_simplifier::{
    launcher::{Launcher, Options},
    smali::{
        instruction::{ConstLiteral, Instruction, InvokeKind, MathOperator, MoveKind},
        method::MethodSignature,
        DexModel,
    },
    vm::Config,
};
use regex::Regex;

use common::{class, model, static_method};

fn narrow_const(dest: u16, value: i32) -> Instruction {
    Instruction::Const {
        dest,
        literal: ConstLiteral::Narrow(value),
    }
}

fn return_narrow(src: u16) -> Instruction {
    Instruction::Return {
        src,
        kind: MoveKind::Narrow,
    }
}

/// A method whose body folds to a single constant.
fn foldable_method(class_name: &str, name: &str) -> dex_simplifier::smali::method::DexMethod {
    static_method(
        class_name,
        name,
        vec![],
        "I",
        2,
        vec![
            narrow_const(0, 2),
            narrow_const(1, 3),
            Instruction::Binary {
                dest: 0,
                lhs: 0,
                rhs: 1,
                operator: MathOperator::Add,
                operand: dex_simplifier::smali::instruction::OperandType::Int,
            },
            return_narrow(0),
        ],
    )
}

fn write_model(model: &DexModel) -> anyhow::Result<(tempfile::TempDir, std::path::PathBuf)> {
    let directory = tempfile::tempdir()?;
    let input = directory.path().join("app.json");
    fs::write(&input, serde_json_string(model)?)?;
    Ok((directory, input))
}

fn serde_json_string(model: &DexModel) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(model)?)
}

fn read_model(path: &std::path::Path) -> anyhow::Result<DexModel> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn include_filter_limits_optimization_to_matching_classes() -> anyhow::Result<()> {
    let input_model = model(vec![
        class("Lcom/app/A;", vec![foldable_method("Lcom/app/A;", "m")]),
        class("Lorg/other/B;", vec![foldable_method("Lorg/other/B;", "n")]),
    ]);
    let (directory, input) = write_model(&input_model)?;
    let output = directory.path().join("out.json");

    let mut options = Options::new(&input);
    options.output = Some(output.clone());
    options.include_filter = Some(Regex::new("Lcom/app/.*")?);
    let summary = Launcher::new(options).run()?;

    assert_eq!(summary.method_count, 1);

    let rewritten = read_model(&output)?;
    let a = rewritten.classes.iter().find(|c| c.name == "Lcom/app/A;").unwrap();
    let b = rewritten.classes.iter().find(|c| c.name == "Lorg/other/B;").unwrap();

    // The matching class was folded; the other is byte-identical.
    assert_eq!(
        a.methods[0].instructions,
        vec![narrow_const(0, 5), return_narrow(0)]
    );
    assert_eq!(b.methods[0], input_model.classes[1].methods[0]);

    Ok(())
}

#[test]
fn mutual_recursion_is_skipped_and_left_unchanged() -> anyhow::Result<()> {
    let f = MethodSignature::new("Lcom/app/R;", "f", vec![], "V");
    let g = MethodSignature::new("Lcom/app/R;", "g", vec![], "V");
    let call = |target: &MethodSignature| Instruction::Invoke {
        kind: InvokeKind::Static,
        method: target.clone(),
        arguments: vec![],
        range: false,
    };
    let input_model = model(vec![class(
        "Lcom/app/R;",
        vec![
            static_method(
                "Lcom/app/R;",
                "f",
                vec![],
                "V",
                0,
                vec![call(&g), Instruction::ReturnVoid],
            ),
            static_method(
                "Lcom/app/R;",
                "g",
                vec![],
                "V",
                0,
                vec![call(&f), Instruction::ReturnVoid],
            ),
        ],
    )]);
    let (directory, input) = write_model(&input_model)?;
    let output = directory.path().join("out.json");

    let mut options = Options::new(&input);
    options.output = Some(output.clone());
    options.vm_config = Config::default().with_max_call_depth(3);
    let summary = Launcher::new(options).run()?;

    assert_eq!(summary.skipped.len(), 2);
    assert!(summary.skipped[0].1.contains("Call depth limit"));

    // Both methods survive untouched in the output.
    let rewritten = read_model(&output)?;
    assert_eq!(rewritten.classes, input_model.classes);

    Ok(())
}

#[test]
fn support_library_classes_are_skipped_by_default() -> anyhow::Result<()> {
    let input_model = model(vec![class(
        "Landroid/support/v4/Util;",
        vec![foldable_method("Landroid/support/v4/Util;", "m")],
    )]);
    let (directory, input) = write_model(&input_model)?;
    let output = directory.path().join("out.json");

    let mut options = Options::new(&input);
    options.output = Some(output.clone());
    let summary = Launcher::new(options).run()?;
    assert_eq!(summary.method_count, 0);

    let mut options = Options::new(&input);
    options.output = Some(output.clone());
    options.include_support_library = true;
    let summary = Launcher::new(options).run()?;
    assert_eq!(summary.method_count, 1);

    Ok(())
}

#[test]
fn output_api_level_overrides_the_input() -> anyhow::Result<()> {
    let input_model = model(vec![class(
        "Lcom/app/A;",
        vec![foldable_method("Lcom/app/A;", "m")],
    )]);
    let (directory, input) = write_model(&input_model)?;
    let output = directory.path().join("out.json");

    let mut options = Options::new(&input);
    options.output = Some(output.clone());
    options.output_api_level = Some(26);
    Launcher::new(options).run()?;

    assert_eq!(read_model(&output)?.api_level, 26);

    Ok(())
}
