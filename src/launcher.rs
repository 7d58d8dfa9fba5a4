//! This module contains the launcher: the orchestrator that walks every
//! non-framework class of the input, drives the execute → optimize →
//! re-execute loop per method, and writes the rewritten model out.

use std::{
    path::PathBuf,
    time::Instant,
};

use log::{info, warn};
use regex::Regex;

use crate::{
    configuration::Configuration,
    error,
    error::execution,
    optimizer::{OptimizationCounts, Optimizer},
    smali::{method::MethodSignature, ClassManager},
    vm,
    vm::VirtualMachine,
};

/// The pattern matching Android support-library signatures, which are skipped
/// by default: optimizing them is wasted effort since they ship unobfuscated.
const SUPPORT_LIBRARY_PATTERN: &str = r"Landroid/support/(annotation|v\d{1,2})/";

/// The options controlling one launcher run.
#[derive(Clone, Debug)]
pub struct Options {
    /// The path of the input class model.
    pub input: PathBuf,

    /// The path of the output, or [`None`] to derive it from the input.
    pub output: Option<PathBuf>,

    /// Only methods whose rendered signature matches are optimized.
    pub include_filter: Option<Regex>,

    /// Methods whose rendered signature matches are skipped.
    pub exclude_filter: Option<Regex>,

    /// Whether to optimize support-library classes as well.
    pub include_support_library: bool,

    /// The API level recorded in the output, or [`None`] to keep the
    /// input's.
    pub output_api_level: Option<u32>,

    /// The resource bounds for execution and optimization.
    pub vm_config: vm::Config,
}

impl Options {
    /// Constructs options with defaults for everything but the input path.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: None,
            include_filter: None,
            exclude_filter: None,
            include_support_library: false,
            output_api_level: None,
            vm_config: vm::Config::default(),
        }
    }

    /// Gets the output path, deriving `<input>.simplified.json` next to the
    /// input when none was given.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let mut derived = self.input.clone();
            derived.set_extension("simplified.json");
            derived
        })
    }
}

/// What one launcher run accomplished.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// The number of classes in which at least one method was optimized.
    pub class_count: usize,

    /// The number of methods driven through the optimizer.
    pub method_count: usize,

    /// The methods skipped because their graph could not be built, with the
    /// rendered reason.
    pub skipped: Vec<(String, String)>,

    /// The aggregated per-pass rewrite counters for the whole run.
    pub counts: OptimizationCounts,

    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u128,
}

/// The launcher itself.
#[derive(Debug)]
pub struct Launcher {
    options: Options,
}

impl Launcher {
    /// Constructs a launcher with the provided `options`.
    #[must_use]
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Runs the whole pipeline: load, execute and optimize every selected
    /// method, report, and write the output.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the input cannot be loaded, the output cannot be
    /// written, or the engine fails in a way that is not recoverable by
    /// skipping a method.
    pub fn run(&self) -> error::Result<RunSummary> {
        let started = Instant::now();
        let manager = ClassManager::from_path(&self.options.input)?;
        let configuration = Configuration::default();
        let mut vm = VirtualMachine::new(manager, configuration, self.options.vm_config.clone());
        let mut optimizer = Optimizer::new();
        let mut summary = RunSummary::default();

        let support_library =
            Regex::new(SUPPORT_LIBRARY_PATTERN).expect("The support-library pattern is valid");

        let class_names: Vec<String> = vm
            .class_manager()
            .class_names()
            .into_iter()
            .filter(|name| !vm.configuration().is_framework_class(name))
            .collect();

        for class_name in class_names {
            let signatures = self.selected_signatures(&vm, &class_name, &support_library);
            let mut optimized_in_class = 0usize;

            for signature in signatures {
                summary.method_count += 1;
                if self.drive_method(&mut vm, &mut optimizer, &signature, &mut summary)? {
                    optimized_in_class += 1;
                }
            }

            if optimized_in_class > 0 {
                summary.class_count += 1;
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        println!(
            "Simplified {} methods from {} classes in {} ms.",
            summary.method_count, summary.class_count, summary.elapsed_ms
        );
        println!("{}", summary.counts);

        let output = self.options.output_path();
        println!("Writing output to {}", output.display());
        vm.class_manager()
            .write_to(&output, self.options.output_api_level)?;

        Ok(summary)
    }

    /// Gets the signatures of the methods of `class_name` selected by the
    /// filters, in declaration order.
    fn selected_signatures(
        &self,
        vm: &VirtualMachine,
        class_name: &str,
        support_library: &Regex,
    ) -> Vec<MethodSignature> {
        let Some(class) = vm.class_manager().class(class_name) else {
            return vec![];
        };

        class
            .methods
            .iter()
            .filter(|method| !method.instructions.is_empty())
            .map(|method| method.signature.clone())
            .filter(|signature| {
                let rendered = signature.to_string();
                if let Some(include) = &self.options.include_filter {
                    if !include.is_match(&rendered) {
                        return false;
                    }
                }
                if let Some(exclude) = &self.options.exclude_filter {
                    if exclude.is_match(&rendered) {
                        return false;
                    }
                }
                if !self.options.include_support_library && support_library.is_match(&rendered) {
                    return false;
                }
                true
            })
            .collect()
    }

    /// Drives one method through the execute → optimize → re-execute loop.
    ///
    /// Returns whether the method was changed.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] only for failures that cannot be recovered by skipping
    /// the method.
    fn drive_method(
        &self,
        vm: &mut VirtualMachine,
        optimizer: &mut Optimizer,
        signature: &MethodSignature,
        summary: &mut RunSummary,
    ) -> error::Result<bool> {
        let max_passes = self.options.vm_config.max_optimization_passes;
        let mut changed = false;
        let mut rounds = 0usize;

        loop {
            rounds += 1;
            if rounds > max_passes {
                break;
            }

            println!("Executing: {signature}");
            let graph = match vm.execute(signature) {
                Ok(graph) => graph,
                Err(error) => {
                    self.handle_execution_failure(signature, error, summary)?;
                    break;
                }
            };

            let Some(mut builder) = vm.class_manager_mut().method_mut(signature) else {
                break;
            };
            let result = optimizer.simplify(&graph, &mut builder, max_passes);
            info!("{signature}: {}", result.counts);
            summary.counts.absorb(&result.counts);

            if result.made_changes() {
                changed = true;
                // The code changed under the graph's feet; downstream caches
                // derived from the old code are stale.
                vm.update_instruction_graph(signature);
            }

            if !result.should_reexecute {
                break;
            }
        }

        Ok(changed)
    }

    /// Handles a failed graph build: bounded and malformed-method failures
    /// skip the method, anything else aborts the run.
    fn handle_execution_failure(
        &self,
        signature: &MethodSignature,
        error: execution::LocatedError,
        summary: &mut RunSummary,
    ) -> error::Result<()> {
        match &error.payload {
            execution::Error::UnhandledVirtualException { .. } => {
                Err(error::Error::Execution(error))
            }
            payload => {
                if payload.is_resource_bound() {
                    println!("Skipping {signature}: {error}");
                } else {
                    warn!("Malformed method {signature}: {error}");
                    println!("Skipping {signature}: {error}");
                }
                summary.skipped.push((signature.to_string(), error.to_string()));
                Ok(())
            }
        }
    }
}
