//! The constant-propagation pass: instructions whose result is the same
//! concrete value on every path are rewritten into the `const*` that
//! materializes that value directly.

use crate::{
    optimizer::{OptimizationPass, PassResult},
    smali::{
        builder::MethodBuilder,
        instruction::{ConstLiteral, Instruction},
    },
    vm::{
        graph::ExecutionGraph,
        side_effect::Level,
        value::{ConcreteValue, HeapItem},
    },
};

/// Rewrites agreement-on-concrete results into constants.
pub struct ConstantPropagator;

impl OptimizationPass for ConstantPropagator {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult {
        let mut changes = 0usize;

        for location in graph.reachable_locations() {
            let Some(instruction) = builder.instruction(location) else {
                continue;
            };
            if !is_foldable(instruction) {
                continue;
            }
            let Some((dest, _)) = instruction.register_written() else {
                continue;
            };

            // A location that raises on any path, or whose effects escape
            // the model, must keep its instruction. Weak effects (class
            // initialization triggers, modeled writes) may be folded over,
            // as every other access re-derives them.
            if graph.location_side_effect_level(location) > Level::Weak {
                continue;
            }
            if graph
                .nodes_at(location)
                .iter()
                .any(|id| graph.node(*id).exception().is_some())
            {
                continue;
            }

            let Some(consensus) = graph.register_consensus(location, dest) else {
                continue;
            };
            let Some(replacement) = materialize(dest, &consensus) else {
                continue;
            };
            if *instruction == replacement {
                continue;
            }

            builder.replace(location, replacement);
            changes += 1;
        }

        PassResult {
            changes,
            should_reexecute: changes > 0,
            invalidates_graph: false,
        }
    }
}

/// Checks whether the instruction's entire effect is the assignment of its
/// destination register, making it a candidate for constant rewriting.
fn is_foldable(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::Move { .. }
            | Instruction::MoveResult { .. }
            | Instruction::Compare { .. }
            | Instruction::ArrayLength { .. }
            | Instruction::InstanceOf { .. }
            | Instruction::ArrayGet { .. }
            | Instruction::InstanceGet { .. }
            | Instruction::StaticGet { .. }
            | Instruction::Unary { .. }
            | Instruction::Binary { .. }
            | Instruction::BinaryLiteral { .. }
    )
}

/// Builds the `const*` instruction that materializes `item` into `dest`, when
/// one exists.
pub(crate) fn materialize(dest: u16, item: &HeapItem) -> Option<Instruction> {
    let literal = match item.value.concrete()? {
        ConcreteValue::Int(value) => ConstLiteral::Narrow(*value),
        ConcreteValue::Long(value) => ConstLiteral::Wide(*value),
        // Floating constants materialize as their bit patterns, which is all
        // a Dalvik register holds.
        ConcreteValue::Float(value) => ConstLiteral::Narrow(value.to_bits() as i32),
        ConcreteValue::Double(value) => ConstLiteral::Wide(value.to_bits() as i64),
        ConcreteValue::String(value) => ConstLiteral::String(value.clone()),
        ConcreteValue::Class(value) => ConstLiteral::Class(value.clone()),
        ConcreteValue::Null => ConstLiteral::Narrow(0),
        ConcreteValue::Array(_) => return None,
    };

    Some(Instruction::Const { dest, literal })
}
