//! The dead-assignment elimination pass: assignments to registers that no
//! forward path ever reads again are removed.
//!
//! The read information comes from the execution graph's per-node dataflow
//! marks rather than from a static analysis, so only reads that can actually
//! happen under the abstract semantics keep an assignment alive.

use crate::{
    optimizer::{OptimizationPass, PassResult},
    smali::{builder::MethodBuilder, instruction::Instruction},
    vm::{graph::ExecutionGraph, side_effect::Level},
};

/// Removes assignments whose value is never observed.
pub struct DeadAssignmentEliminator;

impl OptimizationPass for DeadAssignmentEliminator {
    fn name(&self) -> &'static str {
        "dead-assignment"
    }

    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult {
        let mut changes = 0usize;

        for location in graph.reachable_locations() {
            let Some(instruction) = builder.instruction(location) else {
                continue;
            };
            if !is_removable(instruction) {
                continue;
            }
            let Some((dest, wide)) = instruction.register_written() else {
                continue;
            };
            if graph.location_side_effect_level(location) > Level::None {
                continue;
            }

            let read_anywhere = graph.nodes_at(location).iter().any(|id| {
                graph.register_read_after(*id, dest)
                    || (wide && graph.register_read_after(*id, dest + 1))
            });
            if read_anywhere {
                continue;
            }

            builder.nop(location);
            changes += 1;
        }

        PassResult {
            changes,
            should_reexecute: changes > 0,
            invalidates_graph: false,
        }
    }
}

/// Checks whether removing the instruction cannot change observable
/// behavior: it must assign a register, carry no side effects beyond the
/// assignment, and be incapable of raising at runtime.
fn is_removable(instruction: &Instruction) -> bool {
    if !instruction.possible_exceptions().is_empty() {
        return false;
    }

    matches!(
        instruction,
        Instruction::Const { .. }
            | Instruction::Move { .. }
            | Instruction::MoveResult { .. }
            | Instruction::Compare { .. }
            | Instruction::InstanceOf { .. }
            | Instruction::Unary { .. }
            | Instruction::Binary { .. }
            | Instruction::BinaryLiteral { .. }
    )
}
