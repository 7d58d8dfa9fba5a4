//! The unreachable-branch removal pass: conditional branches and switches
//! that take the same side on every path become unconditional.
//!
//! The instructions this orphans are not touched here; they simply have no
//! node in the next graph, and the compaction pass sweeps them away.

use crate::{
    optimizer::{OptimizationPass, PassResult},
    smali::{builder::MethodBuilder, instruction::Instruction},
    vm::graph::ExecutionGraph,
};

/// Collapses decided branches into `goto` (or nothing at all).
pub struct UnreachableBranchRemover;

impl OptimizationPass for UnreachableBranchRemover {
    fn name(&self) -> &'static str {
        "unreachable-branch"
    }

    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult {
        let mut changes = 0usize;

        for location in graph.reachable_locations() {
            let Some(instruction) = builder.instruction(location) else {
                continue;
            };
            if !matches!(
                instruction,
                Instruction::IfTest { .. }
                    | Instruction::IfTestZ { .. }
                    | Instruction::PackedSwitch { .. }
                    | Instruction::SparseSwitch { .. }
            ) {
                continue;
            }

            let Some(taken) = decided_target(graph, location) else {
                continue;
            };

            let replacement = if taken == location + 1 {
                Instruction::Nop
            } else {
                Instruction::Goto { target: taken }
            };
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

/// Gets the single successor every node at `location` proceeds to, if they
/// all agree on exactly one.
fn decided_target(graph: &ExecutionGraph, location: usize) -> Option<usize> {
    let mut taken: Option<usize> = None;
    for id in graph.nodes_at(location) {
        let node = graph.node(*id);
        match node.child_locations() {
            [only] => match taken {
                Some(previous) if previous != *only => return None,
                _ => taken = Some(*only),
            },
            _ => return None,
        }
    }

    taken
}
