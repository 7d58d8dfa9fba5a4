//! End-to-end simplification scenarios: each builds a small method, drives
//! the full execute → optimize → re-execute loop, and checks the rewritten
//! code.

mod common;

use dex_simplifier::smali::instruction::{
    ConstLiteral,
    IfComparison,
    Instruction,
    InvokeKind,
    MathOperator,
    MoveKind,
    OperandType,
    ARITHMETIC_EXCEPTION,
};
use dex_simplifier::smali::method::MethodSignature;

use common::{class, instructions_of, machine, model, simplify_method, static_method};

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

#[test]
fn constant_addition_folds_to_a_single_const() {
    // int f() { return 2 + 3; }
    let method = static_method(
        "Lcom/app/A;",
        "f",
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
                operand: OperandType::Int,
            },
            return_narrow(0),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let counts = simplify_method(&mut vm, &signature);

    assert_eq!(
        instructions_of(&vm, &signature),
        vec![narrow_const(0, 5), return_narrow(0)]
    );
    assert_eq!(counts.of("constant-propagation"), 1);
}

#[test]
fn constant_true_branch_collapses_and_dead_code_vanishes() {
    // int g(int x) { if (1 == 1) { return 7; } else { return x; } }
    let method = static_method(
        "Lcom/app/A;",
        "g",
        vec!["I".into()],
        "I",
        2,
        vec![
            narrow_const(0, 1),
            Instruction::IfTestZ {
                value: 0,
                comparison: IfComparison::Equal,
                target: 4,
            },
            narrow_const(0, 7),
            return_narrow(0),
            Instruction::Move {
                dest: 0,
                src: 1,
                kind: MoveKind::Narrow,
            },
            return_narrow(0),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let counts = simplify_method(&mut vm, &signature);

    assert_eq!(
        instructions_of(&vm, &signature),
        vec![narrow_const(0, 7), return_narrow(0)]
    );
    assert!(counts.of("unreachable-branch") >= 1);
    assert!(counts.of("dead-assignment") >= 1);
}

#[test]
fn division_by_zero_keeps_its_code_and_terminal_exception() -> anyhow::Result<()> {
    // int h() { return 10 / 0; }
    let original = vec![
        narrow_const(0, 10),
        Instruction::BinaryLiteral {
            dest: 0,
            lhs: 0,
            literal: 0,
            operator: MathOperator::Div,
        },
        return_narrow(0),
    ];
    let method = static_method("Lcom/app/A;", "h", vec![], "I", 1, original.clone());
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let _ = simplify_method(&mut vm, &signature);

    // The raising instruction cannot be folded away, and the graph's
    // terminal node carries the virtual exception.
    assert_eq!(instructions_of(&vm, &signature), original);

    let graph = vm.execute(&signature)?;
    let terminals = graph.terminal_nodes();
    assert_eq!(terminals.len(), 1);
    assert_eq!(
        graph.node(terminals[0]).exception().unwrap().kind,
        ARITHMETIC_EXCEPTION
    );
    assert_eq!(graph.node(terminals[0]).exception().unwrap().message, "/ by zero");

    Ok(())
}

#[test]
fn safe_string_length_collapses_to_a_const() {
    // int k() { return "abc".length(); }
    let method = static_method(
        "Lcom/app/A;",
        "k",
        vec![],
        "I",
        2,
        vec![
            Instruction::Const {
                dest: 0,
                literal: ConstLiteral::String("abc".into()),
            },
            Instruction::Invoke {
                kind: InvokeKind::Virtual,
                method: MethodSignature::parse("Ljava/lang/String;->length()I").unwrap(),
                arguments: vec![0],
                range: false,
            },
            Instruction::MoveResult {
                dest: 1,
                kind: MoveKind::Narrow,
            },
            return_narrow(1),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let counts = simplify_method(&mut vm, &signature);

    assert_eq!(
        instructions_of(&vm, &signature),
        vec![narrow_const(1, 3), return_narrow(1)]
    );
    assert!(counts.of("predictable-call") >= 1);
}

#[test]
fn local_helper_calls_fold_through_the_callee() {
    // int callee() { return 21; }  int caller() { return callee() * 2; }
    let callee = static_method(
        "Lcom/app/A;",
        "callee",
        vec![],
        "I",
        1,
        vec![narrow_const(0, 21), return_narrow(0)],
    );
    let caller = static_method(
        "Lcom/app/A;",
        "caller",
        vec![],
        "I",
        1,
        vec![
            Instruction::Invoke {
                kind: InvokeKind::Static,
                method: callee.signature.clone(),
                arguments: vec![],
                range: false,
            },
            Instruction::MoveResult {
                dest: 0,
                kind: MoveKind::Narrow,
            },
            Instruction::BinaryLiteral {
                dest: 0,
                lhs: 0,
                literal: 2,
                operator: MathOperator::Mul,
            },
            return_narrow(0),
        ],
    );
    let signature = caller.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![caller, callee])]));

    let _ = simplify_method(&mut vm, &signature);

    assert_eq!(
        instructions_of(&vm, &signature),
        vec![narrow_const(0, 42), return_narrow(0)]
    );
}

#[test]
fn fill_array_data_lookups_fold_to_constants() {
    // A common string-decryption shape: read one element of a data table.
    let method = static_method(
        "Lcom/app/A;",
        "table",
        vec![],
        "I",
        3,
        vec![
            narrow_const(0, 3),
            Instruction::NewArray {
                dest: 0,
                size: 0,
                descriptor: "[I".into(),
            },
            Instruction::FillArrayData {
                array: 0,
                values: vec![11, 22, 33],
            },
            narrow_const(1, 2),
            Instruction::ArrayGet {
                dest: 2,
                array: 0,
                index: 1,
                kind: dex_simplifier::smali::instruction::AccessKind::Narrow,
            },
            return_narrow(2),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let _ = simplify_method(&mut vm, &signature);

    let rewritten = instructions_of(&vm, &signature);
    // The final load folds to 33; the array construction itself survives
    // because the write carries a weak side effect.
    assert_eq!(rewritten.last(), Some(&return_narrow(2)));
    assert!(rewritten.contains(&narrow_const(2, 33)));
}

#[test]
fn static_reads_fold_through_lazy_class_initialization() {
    // class C { static int X; static { X = 40 + 2; } }
    // int read() { return C.X; }
    let field = dex_simplifier::smali::instruction::FieldRef {
        class: "Lcom/app/C;".into(),
        name: "X".into(),
        descriptor: "I".into(),
    };
    let initializer = static_method(
        "Lcom/app/C;",
        "<clinit>",
        vec![],
        "V",
        1,
        vec![
            narrow_const(0, 40),
            Instruction::BinaryLiteral {
                dest: 0,
                lhs: 0,
                literal: 2,
                operator: MathOperator::Add,
            },
            Instruction::StaticPut {
                src: 0,
                field: field.clone(),
                kind: dex_simplifier::smali::instruction::AccessKind::Narrow,
            },
            Instruction::ReturnVoid,
        ],
    );
    let reader = static_method(
        "Lcom/app/C;",
        "read",
        vec![],
        "I",
        1,
        vec![
            Instruction::StaticGet {
                dest: 0,
                field,
                kind: dex_simplifier::smali::instruction::AccessKind::Narrow,
            },
            return_narrow(0),
        ],
    );
    let signature = reader.signature.clone();
    let mut class_c = class("Lcom/app/C;", vec![initializer, reader]);
    class_c.fields.push(dex_simplifier::smali::class::DexField {
        name: "X".into(),
        descriptor: "I".into(),
        is_static: true,
    });
    let mut vm = machine(model(vec![class_c]));

    let _ = simplify_method(&mut vm, &signature);

    assert_eq!(
        instructions_of(&vm, &signature),
        vec![narrow_const(0, 42), return_narrow(0)]
    );
}

#[test]
fn empty_method_is_left_alone() {
    let method = static_method(
        "Lcom/app/A;",
        "noop",
        vec![],
        "V",
        0,
        vec![Instruction::ReturnVoid],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let counts = simplify_method(&mut vm, &signature);

    assert_eq!(instructions_of(&vm, &signature), vec![Instruction::ReturnVoid]);
    assert_eq!(counts.total(), 0);
}

#[test]
fn unchanged_methods_do_not_request_reexecution() -> anyhow::Result<()> {
    // A method the optimizer can do nothing with: everything depends on the
    // unknown parameter.
    let method = static_method(
        "Lcom/app/A;",
        "opaque",
        vec!["I".into()],
        "I",
        2,
        vec![
            Instruction::BinaryLiteral {
                dest: 0,
                lhs: 1,
                literal: 1,
                operator: MathOperator::Add,
            },
            return_narrow(0),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let graph = vm.execute(&signature)?;
    let mut optimizer = dex_simplifier::optimizer::Optimizer::new();
    let max_passes = vm.config().max_optimization_passes;
    let mut builder = vm.class_manager_mut().method_mut(&signature).unwrap();

    let summary = optimizer.simplify(&graph, &mut builder, max_passes);

    assert!(!summary.made_changes());
    assert!(!summary.should_reexecute);
    assert!(summary.sweeps <= max_passes);

    Ok(())
}

#[test]
fn optimization_preserves_the_concrete_return_value() -> anyhow::Result<()> {
    // The engine itself is the sampling oracle: for a parameter-free method
    // the abstract execution is exact, so the agreed return value must
    // survive optimization byte-for-byte.
    let method = static_method(
        "Lcom/app/A;",
        "mix",
        vec![],
        "I",
        3,
        vec![
            narrow_const(0, 0x1234),
            narrow_const(1, 8),
            Instruction::Binary {
                dest: 2,
                lhs: 0,
                rhs: 1,
                operator: MathOperator::Shl,
                operand: OperandType::Int,
            },
            Instruction::Binary {
                dest: 2,
                lhs: 2,
                rhs: 0,
                operator: MathOperator::Xor,
                operand: OperandType::Int,
            },
            return_narrow(2),
        ],
    );
    let signature = method.signature.clone();
    let mut vm = machine(model(vec![class("Lcom/app/A;", vec![method])]));

    let before = return_consensus(&mut vm, &signature)?;
    let _ = simplify_method(&mut vm, &signature);
    let after = return_consensus(&mut vm, &signature)?;

    assert_eq!(before, after);

    Ok(())
}

/// Gets the agreed concrete return value of the method, through the result
/// pseudo-register of the graph's returning terminals.
fn return_consensus(
    vm: &mut dex_simplifier::VirtualMachine,
    signature: &MethodSignature,
) -> anyhow::Result<dex_simplifier::vm::value::Value> {
    let graph = vm.execute(signature)?;
    let terminals = graph.terminal_nodes();
    let mut agreed = None;
    for id in terminals {
        let node = graph.node(id);
        let Some(item) = node.context().method_state().result_snapshot() else {
            continue;
        };
        match &agreed {
            None => agreed = Some(item.value),
            Some(existing) => anyhow::ensure!(existing.identical(&item.value)),
        }
    }
    agreed.ok_or_else(|| anyhow::anyhow!("The method never returns a value"))
}
