//! The predictable-call collapsing pass: an invoke whose outcome the graph
//! fully predicted is removed, and its `move-result*` companion becomes the
//! predicted constant.
//!
//! Collapsing requires a side-effect level of weak or below: strong effects
//! escape the model and the call must stay. Weak effects are class-state
//! writes the engine tracks, which every remaining access re-derives.

use crate::{
    optimizer::{constant_propagation::materialize, OptimizationPass, PassResult},
    smali::{builder::MethodBuilder, instruction::Instruction},
    vm::{graph::ExecutionGraph, side_effect::Level},
};

/// Collapses fully-predicted invokes.
pub struct PredictableCallCollapser;

impl OptimizationPass for PredictableCallCollapser {
    fn name(&self) -> &'static str {
        "predictable-call"
    }

    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult {
        let mut changes = 0usize;

        for location in graph.reachable_locations() {
            let Some(Instruction::Invoke { method, .. }) = builder.instruction(location) else {
                continue;
            };
            let method = method.clone();

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

            let consumer = builder.instruction(location + 1).cloned();
            if method.return_type == "V" {
                builder.nop(location);
                changes += 1;
                continue;
            }

            // A value-returning call collapses only when the predicted
            // result can be materialized for its consumer.
            let Some(consensus) = graph.result_consensus(location) else {
                continue;
            };
            match consumer {
                Some(Instruction::MoveResult { dest, .. }) => {
                    let Some(replacement) = materialize(dest, &consensus) else {
                        continue;
                    };
                    builder.nop(location);
                    builder.replace(location + 1, replacement);
                    changes += 1;
                }
                _ => {
                    if consensus.value.concrete().is_none() {
                        continue;
                    }
                    // The result is discarded; the call alone disappears.
                    builder.nop(location);
                    changes += 1;
                }
            }
        }

        PassResult {
            changes,
            should_reexecute: changes > 0,
            invalidates_graph: false,
        }
    }
}
