//! This module contains the optimizer: the fixed pipeline of rewriting passes
//! driven over a method and its execution graph.
//!
//! # The Pass Contract
//!
//! A pass receives the (read-only) execution graph and a mutable builder view
//! of the method, and reports how many rewrites it made and whether the
//! method should be re-executed before further work. Passes that rewrite in
//! place leave every instruction address valid, so one sweep can chain them
//! over a single graph; the compaction pass renumbers addresses and therefore
//! ends the sweep.

pub mod call_collapse;
pub mod constant_propagation;
pub mod dead_assignment;
pub mod nop_remover;
pub mod unreachable_branch;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use log::debug;

use crate::{
    smali::builder::MethodBuilder,
    vm::graph::ExecutionGraph,
};

/// What one pass did to the method.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PassResult {
    /// The number of rewrites the pass performed.
    pub changes: usize,

    /// Whether the rewrites warrant re-executing the method so downstream
    /// consumers see a fresh graph.
    pub should_reexecute: bool,

    /// Whether the rewrites renumbered instruction addresses, invalidating
    /// the current graph for every later pass.
    pub invalidates_graph: bool,
}

/// The interface every optimization pass implements.
pub trait OptimizationPass {
    /// Gets the stable name of the pass, used as its counter key.
    fn name(&self) -> &'static str;

    /// Runs the pass over `graph` and `builder`.
    fn optimize(&mut self, graph: &ExecutionGraph, builder: &mut MethodBuilder) -> PassResult;
}

/// Per-pass rewrite counters, aggregated per method and per run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OptimizationCounts {
    counts: BTreeMap<&'static str, usize>,
}

impl OptimizationCounts {
    /// Records `changes` rewrites for the pass named `name`.
    pub fn record(&mut self, name: &'static str, changes: usize) {
        if changes > 0 {
            *self.counts.entry(name).or_insert(0) += changes;
        }
    }

    /// Folds another set of counters into this one.
    pub fn absorb(&mut self, other: &Self) {
        for (name, changes) in &other.counts {
            *self.counts.entry(name).or_insert(0) += changes;
        }
    }

    /// Gets the count recorded for the pass named `name`.
    #[must_use]
    pub fn of(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Gets the total number of rewrites across all passes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

impl Display for OptimizationCounts {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.counts.is_empty() {
            return write!(f, "no optimizations applied");
        }
        let rendered = self
            .counts
            .iter()
            .map(|(name, changes)| format!("{name}: {changes}"))
            .join(", ");
        write!(f, "{rendered}")
    }
}

/// The summary of one `simplify` invocation over a method.
#[derive(Clone, Debug, Default)]
pub struct OptimizationSummary {
    /// The per-pass rewrite counters.
    pub counts: OptimizationCounts,

    /// The number of sweeps of the pipeline that ran.
    pub sweeps: usize,

    /// Whether the method should be re-executed and optimized again.
    pub should_reexecute: bool,
}

impl OptimizationSummary {
    /// Checks whether any pass rewrote anything.
    #[must_use]
    pub fn made_changes(&self) -> bool {
        self.counts.total() > 0
    }
}

/// The optimizer: the fixed, ordered pipeline of passes.
pub struct Optimizer {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl Optimizer {
    /// Constructs the standard pipeline: constant propagation, dead
    /// assignment elimination, unreachable branch removal, predictable call
    /// collapsing, and nop removal, in that order.
    #[must_use]
    pub fn new() -> Self {
        let passes: Vec<Box<dyn OptimizationPass>> = vec![
            Box::new(constant_propagation::ConstantPropagator),
            Box::new(dead_assignment::DeadAssignmentEliminator),
            Box::new(unreachable_branch::UnreachableBranchRemover),
            Box::new(call_collapse::PredictableCallCollapser),
            Box::new(nop_remover::NopRemover),
        ];
        Self { passes }
    }

    /// Sweeps the pipeline over the method until a full sweep changes
    /// nothing, the graph is invalidated by compaction, or `max_passes`
    /// sweeps have run.
    pub fn simplify(
        &mut self,
        graph: &ExecutionGraph,
        builder: &mut MethodBuilder,
        max_passes: usize,
    ) -> OptimizationSummary {
        let mut summary = OptimizationSummary::default();

        'sweeps: while summary.sweeps < max_passes {
            summary.sweeps += 1;
            let mut sweep_changes = 0usize;

            for pass in &mut self.passes {
                let result = pass.optimize(graph, builder);
                if result.changes > 0 {
                    debug!("{}: {} changes to {}", pass.name(), result.changes, graph.signature());
                }
                summary.counts.record(pass.name(), result.changes);
                sweep_changes += result.changes;
                summary.should_reexecute |= result.should_reexecute;

                if result.invalidates_graph && result.changes > 0 {
                    break 'sweeps;
                }
            }

            if sweep_changes == 0 {
                break;
            }
        }

        summary
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}
