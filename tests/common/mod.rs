//! This module contains common testing utilities for testing this library.
#![cfg(test)]
#![allow(unused)] // Not every helper is used by every test binary.

use dex_simplifier::{
    configuration::Configuration,
    optimizer::{OptimizationCounts, Optimizer},
    smali::{
        class::DexClass,
        instruction::Instruction,
        method::{DexMethod, MethodSignature},
        ClassManager,
        DexModel,
    },
    vm::{Config, VirtualMachine},
};

/// Builds a model containing the provided classes.
pub fn model(classes: Vec<DexClass>) -> DexModel {
    DexModel {
        api_level: 15,
        classes,
    }
}

/// Builds a class with no fields and the provided methods.
pub fn class(name: &str, methods: Vec<DexMethod>) -> DexClass {
    DexClass {
        name: name.into(),
        super_class: "Ljava/lang/Object;".into(),
        fields: vec![],
        methods,
    }
}

/// Builds a static method on `class_name` with the provided shape.
pub fn static_method(
    class_name: &str,
    name: &str,
    parameters: Vec<String>,
    return_type: &str,
    registers: usize,
    instructions: Vec<Instruction>,
) -> DexMethod {
    DexMethod {
        signature: MethodSignature::new(class_name, name, parameters, return_type),
        registers,
        is_static: true,
        instructions,
        try_blocks: vec![],
    }
}

/// Builds a virtual machine over `model` with the default configuration.
pub fn machine(model: DexModel) -> VirtualMachine {
    machine_with_config(model, Config::default())
}

/// Builds a virtual machine over `model` with the provided bounds.
pub fn machine_with_config(model: DexModel, config: Config) -> VirtualMachine {
    let manager = ClassManager::new(model).expect("The test model must be valid");
    VirtualMachine::new(manager, Configuration::default(), config)
}

/// Drives the method through the execute → optimize → re-execute loop the
/// way the launcher does, returning the aggregated counters.
pub fn simplify_method(vm: &mut VirtualMachine, signature: &MethodSignature) -> OptimizationCounts {
    let mut optimizer = Optimizer::new();
    let max_passes = vm.config().max_optimization_passes;
    let mut counts = OptimizationCounts::default();
    let mut rounds = 0usize;

    loop {
        rounds += 1;
        if rounds > max_passes {
            break;
        }

        let Ok(graph) = vm.execute(signature) else {
            break;
        };
        let mut builder = vm
            .class_manager_mut()
            .method_mut(signature)
            .expect("The method under test exists");
        let summary = optimizer.simplify(&graph, &mut builder, max_passes);
        counts.absorb(&summary.counts);

        if summary.made_changes() {
            vm.update_instruction_graph(signature);
        }
        if !summary.should_reexecute {
            break;
        }
    }

    counts
}

/// Gets the current instructions of the method with the provided signature.
pub fn instructions_of(vm: &VirtualMachine, signature: &MethodSignature) -> Vec<Instruction> {
    vm.class_manager()
        .method(signature)
        .expect("The method under test exists")
        .instructions
        .clone()
}
