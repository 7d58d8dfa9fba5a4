//! The nop-removal pass: the late cleanup that strips `nop`s and
//! instructions no node of the graph ever visited, compacting the method and
//! remapping every address.
//!
//! This is the only pass that renumbers addresses, so it invalidates the
//! graph and always requests re-execution when it changes anything.

use std::collections::BTreeSet;

use crate::{
    optimizer::{OptimizationPass, PassResult},
    smali::builder::MethodBuilder,
    vm::graph::ExecutionGraph,
};

/// Strips `nop`s and unreachable instructions.
pub struct NopRemover;

impl OptimizationPass for NopRemover {
    fn name(&self) -> &'static str {
        "nop-removal"
    }

    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult {
        let dead: BTreeSet<usize> = (0..builder.len())
            .filter(|location| !graph.is_reachable(*location))
            .collect();

        let changed = builder.compact(&dead);
        let changes = usize::from(changed);

        PassResult {
            changes,
            should_reexecute: changed,
            invalidates_graph: changed,
        }
    }
}
