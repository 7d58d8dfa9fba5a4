//! This module contains the symbolic virtual machine: the driver that builds
//! an execution graph for a method by abstract interpretation of its code.

pub mod class_state;
pub mod context;
pub mod graph;
pub mod method_state;
pub mod node;
pub mod side_effect;
pub mod value;

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use log::debug;

use crate::{
    configuration::Configuration,
    constant::{
        DEFAULT_MAX_ADDRESS_VISITS,
        DEFAULT_MAX_CALL_DEPTH,
        DEFAULT_MAX_EXECUTION_TIME_SECONDS,
        DEFAULT_MAX_METHOD_VISITS,
        DEFAULT_MAX_OPTIMIZATION_PASSES,
    },
    error::{container::Locatable, execution, execution::Error},
    opcode,
    smali::{
        method::{descriptor_width, DexMethod, MethodSignature},
        ClassManager,
    },
    vm::{
        class_state::{ClassState, InitializationState},
        context::ExecutionContext,
        graph::ExecutionGraph,
        method_state::MethodState,
        node::ExecutionNode,
        side_effect::Level,
        value::{default_value, HeapItem, Value, VirtualException},
    },
    watchdog::{DeadlineWatchdog, DynWatchdog, LazyWatchdog},
};

/// The virtual machine that symbolically executes Dalvik methods.
///
/// One instance owns the class manager and the class-initialization cache for
/// the lifetime of a run (a class initializes at most once per instance). The
/// machine is single-threaded; outer parallelism requires one instance per
/// worker.
#[derive(Debug)]
pub struct VirtualMachine {
    /// The model of the executable under analysis.
    class_manager: ClassManager,

    /// The safety predicates for framework interaction.
    configuration: Configuration,

    /// The resource bounds for execution.
    config: Config,

    /// The once-per-class initialization cache: the class state template
    /// produced by running each `<clinit>`, or the in-progress state while
    /// one is running.
    initialized_classes: HashMap<String, ClassState>,

    /// Instruction visits during the current top-level execution, across
    /// every method entered on its behalf.
    total_visits: usize,

    /// The watchdog for the current top-level execution.
    watchdog: DynWatchdog,
}

/// The outcome of executing a callee on behalf of an invoke or a class
/// initialization.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    /// The merged return value across the callee's returning paths, if any.
    pub return_item: Option<HeapItem>,

    /// The merged terminal context of the callee's returning paths, carrying
    /// its class-state mutations back to the caller.
    pub context: Option<ExecutionContext>,

    /// The exception the call raises, when every path raises.
    pub exception: Option<VirtualException>,

    /// The join of the side-effect levels of everything the callee executed.
    pub side_effect_level: Level,
}

impl VirtualMachine {
    /// Constructs a new virtual machine over `class_manager` with the
    /// provided safety `configuration` and resource `config`.
    #[must_use]
    pub fn new(class_manager: ClassManager, configuration: Configuration, config: Config) -> Self {
        Self {
            class_manager,
            configuration,
            config,
            initialized_classes: HashMap::new(),
            total_visits: 0,
            watchdog: LazyWatchdog.in_rc(),
        }
    }

    /// Gets the class manager owned by this machine.
    #[must_use]
    pub fn class_manager(&self) -> &ClassManager {
        &self.class_manager
    }

    /// Gets the class manager owned by this machine.
    #[must_use]
    pub fn class_manager_mut(&mut self) -> &mut ClassManager {
        &mut self.class_manager
    }

    /// Gets the safety configuration.
    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Gets the resource-bound configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks whether the class named `name` is present in the executable.
    #[must_use]
    pub fn is_local_class(&self, name: &str) -> bool {
        self.class_manager.is_local_class(name)
    }

    /// Checks whether the method with the provided `signature` is present in
    /// the executable with a body the machine can execute.
    #[must_use]
    pub fn is_local_method(&self, signature: &MethodSignature) -> bool {
        self.class_manager
            .method(signature)
            .is_some_and(|method| !method.instructions.is_empty())
    }

    /// Gets the frame shape of a local method: its register count and the
    /// first register holding an input.
    #[must_use]
    pub fn local_method_frame(&self, signature: &MethodSignature) -> Option<(usize, usize)> {
        self.class_manager
            .method(signature)
            .map(|method| (method.registers, method.first_input_register()))
    }

    /// Symbolically executes the method with the provided `signature` from a
    /// top-level entry state (every input unknown) and returns its execution
    /// graph.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] when a resource bound is exceeded or the method's code
    /// is malformed. The caller is expected to skip the method and continue.
    pub fn execute(&mut self, signature: &MethodSignature) -> execution::Result<ExecutionGraph> {
        let method = self
            .class_manager
            .method(signature)
            .cloned()
            .ok_or(Error::NoSuchMethod {
                signature: signature.to_string(),
            })
            .locate(0)?;

        self.total_visits = 0;
        self.watchdog = if self.config.max_execution_time_seconds == 0 {
            LazyWatchdog.in_rc()
        } else {
            DeadlineWatchdog::expiring_in(Duration::from_secs(
                self.config.max_execution_time_seconds,
            ))
            .in_rc()
        };

        let entry = ExecutionContext::new(entry_state(&method));
        self.execute_with_context(signature, entry, 0)
    }

    /// Executes a callee in the provided entry context, merging its outcome
    /// for the caller. This is the recursion path used by the invoke handler
    /// and by class initialization.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] when a resource bound is exceeded; the breach aborts
    /// the whole build of the calling method's graph.
    pub fn execute_call(
        &mut self,
        signature: &MethodSignature,
        entry: ExecutionContext,
        depth: usize,
    ) -> execution::Result<CallOutcome> {
        let graph = self.execute_with_context(signature, entry, depth)?;
        let method = self
            .class_manager
            .method(signature)
            .cloned()
            .ok_or(Error::NoSuchMethod {
                signature: signature.to_string(),
            })
            .locate(0)?;

        let mut return_item: Option<HeapItem> = None;
        let mut merged_context: Option<ExecutionContext> = None;
        let mut raised: Vec<VirtualException> = Vec::new();
        let mut returning_paths = 0usize;

        for id in graph.terminal_nodes() {
            let terminal = graph.node(id);
            if let Some(exception) = terminal.exception() {
                raised.push(exception.clone());
                continue;
            }
            let is_return = method
                .instructions
                .get(terminal.location())
                .is_some_and(crate::smali::instruction::Instruction::is_terminal);
            if !is_return {
                // A path cut off by loop convergence, not a real exit.
                continue;
            }

            returning_paths += 1;
            match &mut merged_context {
                Some(context) => context.merge_with(terminal.context()),
                None => merged_context = Some(terminal.context().branch()),
            }
            if let Some(item) = terminal.context().method_state().result_snapshot() {
                return_item = Some(match return_item {
                    Some(existing) => existing.merge(&item),
                    None => item,
                });
            }
        }

        // The call raises only when no path returns normally.
        let exception = if returning_paths == 0 {
            raised.into_iter().next()
        } else {
            None
        };

        Ok(CallOutcome {
            return_item,
            context: merged_context,
            exception,
            side_effect_level: graph.side_effect_level(),
        })
    }

    /// Ensures the class named `class` is initialized in `context`, running
    /// its `<clinit>` if this machine has not done so yet.
    ///
    /// Re-entry while the class is `InProgress` is short-circuited: the
    /// re-entrant reader observes the partially initialized state.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] when a resource bound is exceeded while running the
    /// initializer.
    pub fn ensure_class_initialized(
        &mut self,
        context: &mut ExecutionContext,
        class: &str,
        depth: usize,
    ) -> execution::Result<()> {
        if let Some(state) = context.class_state(class) {
            if state.initialization() != InitializationState::NotStarted {
                return Ok(());
            }
        }
        if let Some(template) = self.initialized_classes.get(class) {
            context.install_class_state(class, template.branch());
            return Ok(());
        }

        debug!("Initializing class {class}");
        let mut state = ClassState::new();
        state.set_initialization(InitializationState::InProgress);
        if let Some(dex_class) = self.class_manager.class(class) {
            for field in dex_class.fields.iter().filter(|field| field.is_static) {
                state.set_field(
                    &field.name,
                    HeapItem::new(default_value(&field.descriptor), field.descriptor.clone()),
                );
            }
        }
        self.initialized_classes.insert(class.to_string(), state.branch());
        context.install_class_state(class, state.branch());

        let initializer = MethodSignature::new(class, "<clinit>", vec![], "V");
        let mut final_state = state;
        if self.is_local_method(&initializer) {
            let Some((registers, _)) = self.local_method_frame(&initializer) else {
                unreachable!("A local method always has a frame");
            };
            let entry = ExecutionContext::for_call(MethodState::new(registers), context);
            let outcome = match self.execute_call(&initializer, entry, depth + 1) {
                Ok(outcome) => outcome,
                Err(error) => {
                    // The initializer could not be explored; anything cached
                    // about the class must be treated as fully opaque.
                    if let Some(cached) = self.initialized_classes.get_mut(class) {
                        cached.raise_side_effect_level(Level::Strong);
                    }
                    return Err(error);
                }
            };

            if let Some(callee_context) = outcome.context {
                if let Some(result) = callee_context.class_state(class) {
                    final_state = result.branch();
                }
            }
            final_state.raise_side_effect_level(outcome.side_effect_level);
            if outcome.exception.is_some() {
                // An initializer that raises leaves the class in an
                // unpredictable published state.
                final_state.raise_side_effect_level(Level::Strong);
            }
        }

        final_state.set_initialization(InitializationState::Done);
        self.initialized_classes.insert(class.to_string(), final_state.branch());
        context.install_class_state(class, final_state);

        Ok(())
    }

    /// Notifies the machine that the optimizer rewrote the method with the
    /// provided `signature`, invalidating anything cached from its previous
    /// code.
    pub fn update_instruction_graph(&mut self, signature: &MethodSignature) {
        if signature.is_class_initializer() {
            self.initialized_classes.remove(&signature.class);
        }
    }

    /// Builds the execution graph for one method from the provided entry
    /// context.
    fn execute_with_context(
        &mut self,
        signature: &MethodSignature,
        entry: ExecutionContext,
        depth: usize,
    ) -> execution::Result<ExecutionGraph> {
        if depth > self.config.max_call_depth {
            return Err(Error::MaxCallDepthExceeded {
                limit: self.config.max_call_depth,
                signature: signature.to_string(),
            })
            .locate(0);
        }

        let method = self
            .class_manager
            .method(signature)
            .cloned()
            .ok_or(Error::NoSuchMethod {
                signature: signature.to_string(),
            })
            .locate(0)?;

        let mut graph = ExecutionGraph::new(signature.clone(), method.instructions.len());
        if method.instructions.is_empty() {
            return Ok(graph);
        }

        let root = graph.add_node(ExecutionNode::new(0, entry));
        let mut queue: VecDeque<usize> = VecDeque::from([root]);
        let mut address_visits: HashMap<usize, usize> = HashMap::new();
        // The merged entry state seen so far at each backward-jump target,
        // used to collapse loop re-arrivals into one continuation.
        let mut merge_points: HashMap<usize, ExecutionContext> = HashMap::new();

        let poll_every = self.watchdog.poll_every().max(1);
        let mut dequeued = 0usize;

        while let Some(id) = queue.pop_front() {
            let location = graph.node(id).location();

            dequeued += 1;
            if dequeued % poll_every == 0 && self.watchdog.should_stop() {
                return Err(Error::MaxExecutionTimeExceeded {
                    seconds: self.config.max_execution_time_seconds,
                })
                .locate(location as u32);
            }

            let visits = address_visits.entry(location).or_insert(0);
            *visits += 1;
            if *visits > self.config.max_address_visits {
                return Err(Error::MaxAddressVisitsExceeded {
                    limit: self.config.max_address_visits,
                })
                .locate(location as u32);
            }

            self.total_visits += 1;
            if self.total_visits > self.config.max_method_visits {
                return Err(Error::MaxMethodVisitsExceeded {
                    limit: self.config.max_method_visits,
                })
                .locate(location as u32);
            }

            opcode::execute(self, &method, graph.node_mut(id), depth)?;

            // Exception paths terminate here unless a handler covers the
            // address, in which case the unique child is the catch head with
            // the exception bound for `move-exception`.
            if graph.node(id).child_locations().is_empty() {
                if let Some(exception) = graph.node(id).exception().cloned() {
                    if let Some(target) = method.catch_target(location, &exception.kind) {
                        let mut child_context = graph.node(id).context().branch();
                        child_context.method_state_mut().set_exception_item(HeapItem::new(
                            Value::Exception(exception.clone()),
                            exception.kind.clone(),
                        ));
                        let child = graph.add_node(ExecutionNode::new(target, child_context));
                        graph.node_mut(id).add_child(child);
                        queue.push_back(child);
                    }
                }
                continue;
            }

            // An instruction that could raise at runtime keeps its covering
            // handlers alive with a speculative edge, even when the abstract
            // state never observed the exception. An unresolvable invoke can
            // raise anything, so it feeds every covering handler.
            let instruction = &method.instructions[location];
            let may_raise = !instruction.possible_exceptions().is_empty()
                || matches!(instruction, crate::smali::instruction::Instruction::Invoke { .. });
            if may_raise && graph.node(id).exception().is_none() {
                let mut speculative: Vec<(Option<String>, usize)> = Vec::new();
                for (kind, target) in method.covering_handlers(location) {
                    if speculative.iter().all(|(_, seen)| *seen != target) {
                        speculative.push((kind.map(str::to_string), target));
                    }
                }
                for (kind, target) in speculative {
                    let mut child_context = graph.node(id).context().branch();
                    let descriptor = kind.unwrap_or_else(|| "Ljava/lang/Throwable;".to_string());
                    child_context
                        .method_state_mut()
                        .set_exception_item(HeapItem::unknown(&descriptor));
                    let child = graph.add_node(ExecutionNode::new(target, child_context));
                    graph.node_mut(id).add_child(child);
                    queue.push_back(child);
                }
            }

            for child_location in graph.node(id).child_locations().to_vec() {
                if child_location >= method.instructions.len() {
                    return Err(Error::AddressOutOfBounds {
                        requested: child_location,
                        available: method.instructions.len(),
                    })
                    .locate(location as u32);
                }

                let child_context = graph.node(id).context().branch();
                let is_back_edge = child_location <= location;

                let spawn_context = if is_back_edge {
                    match merge_points.get_mut(&child_location) {
                        Some(previous) => {
                            let mut merged = previous.clone();
                            merged.merge_with(&child_context);
                            if &merged == previous {
                                // The loop state converged; no continuation.
                                continue;
                            }
                            *previous = merged.clone();
                            merged
                        }
                        None => {
                            merge_points.insert(child_location, child_context.clone());
                            child_context
                        }
                    }
                } else {
                    child_context
                };

                let child = graph.add_node(ExecutionNode::new(child_location, spawn_context));
                graph.node_mut(id).add_child(child);
                queue.push_back(child);
            }
        }

        debug!(
            "Executed {} to {} nodes over {} addresses",
            signature,
            graph.node_count(),
            graph.reachable_locations().len()
        );

        Ok(graph)
    }
}

/// Builds the top-level entry state for `method`: inputs unknown but typed,
/// everything else an untyped unknown.
fn entry_state(method: &DexMethod) -> MethodState {
    let mut state = MethodState::new(method.registers);
    let mut register = method.first_input_register() as u16;

    if !method.is_static {
        let _ = state.assign_register(register, HeapItem::unknown(&method.signature.class));
        register += 1;
    }
    for parameter in &method.signature.parameters {
        let item = HeapItem::unknown(parameter);
        if descriptor_width(parameter) == 2 {
            let _ = state.assign_register_wide(register, item);
            register += 2;
        } else {
            let _ = state.assign_register(register, item);
            register += 1;
        }
    }

    // A fresh copy drops the seeding marks so the root node starts clean.
    state.branch()
}

/// The configuration for the virtual machine instance: the resource bounds
/// that cancel a runaway method execution, and the optimizer's pass budget.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The maximum number of times any single instruction address may be
    /// visited during the execution of one method.
    ///
    /// Defaults to [`DEFAULT_MAX_ADDRESS_VISITS`].
    pub max_address_visits: usize,

    /// The maximum call depth reachable through recursive invokes.
    ///
    /// Defaults to [`DEFAULT_MAX_CALL_DEPTH`].
    pub max_call_depth: usize,

    /// The maximum number of instruction visits, totalled over the target
    /// method and every method entered on its behalf.
    ///
    /// Defaults to [`DEFAULT_MAX_METHOD_VISITS`].
    pub max_method_visits: usize,

    /// The wall-clock budget for one method's execution, in seconds. Zero
    /// disables the deadline.
    ///
    /// Defaults to [`DEFAULT_MAX_EXECUTION_TIME_SECONDS`].
    pub max_execution_time_seconds: u64,

    /// The maximum number of optimizer sweeps over one method.
    ///
    /// Defaults to [`DEFAULT_MAX_OPTIMIZATION_PASSES`].
    pub max_optimization_passes: usize,
}

impl Config {
    /// Sets the `max_address_visits` config parameter to `value`.
    #[must_use]
    pub fn with_max_address_visits(mut self, value: usize) -> Self {
        self.max_address_visits = value;
        self
    }

    /// Sets the `max_call_depth` config parameter to `value`.
    #[must_use]
    pub fn with_max_call_depth(mut self, value: usize) -> Self {
        self.max_call_depth = value;
        self
    }

    /// Sets the `max_method_visits` config parameter to `value`.
    #[must_use]
    pub fn with_max_method_visits(mut self, value: usize) -> Self {
        self.max_method_visits = value;
        self
    }

    /// Sets the `max_execution_time_seconds` config parameter to `value`.
    #[must_use]
    pub fn with_max_execution_time_seconds(mut self, value: u64) -> Self {
        self.max_execution_time_seconds = value;
        self
    }

    /// Sets the `max_optimization_passes` config parameter to `value`.
    #[must_use]
    pub fn with_max_optimization_passes(mut self, value: usize) -> Self {
        self.max_optimization_passes = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_address_visits: DEFAULT_MAX_ADDRESS_VISITS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_method_visits: DEFAULT_MAX_METHOD_VISITS,
            max_execution_time_seconds: DEFAULT_MAX_EXECUTION_TIME_SECONDS,
            max_optimization_passes: DEFAULT_MAX_OPTIMIZATION_PASSES,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        configuration::Configuration,
        error::execution::Error,
        smali::{
            class::DexClass,
            instruction::{ConstLiteral, IfComparison, Instruction, MathOperator, OperandType},
            method::{DexMethod, MethodSignature},
            ClassManager,
            DexModel,
        },
        vm::{value::{ConcreteValue, Value}, Config, VirtualMachine},
    };

    fn machine_with_method(method: DexMethod) -> (VirtualMachine, MethodSignature) {
        let signature = method.signature.clone();
        let manager = ClassManager::new(DexModel {
            api_level: 15,
            classes: vec![DexClass {
                name: signature.class.clone(),
                super_class: "Ljava/lang/Object;".into(),
                fields: vec![],
                methods: vec![method],
            }],
        })
        .unwrap();
        (
            VirtualMachine::new(manager, Configuration::default(), Config::default()),
            signature,
        )
    }

    fn static_method(instructions: Vec<Instruction>, registers: usize) -> DexMethod {
        DexMethod {
            signature: MethodSignature::new("Lcom/app/A;", "f", vec![], "I"),
            registers,
            is_static: true,
            instructions,
            try_blocks: vec![],
        }
    }

    #[test]
    fn single_return_builds_a_single_node() -> anyhow::Result<()> {
        let method = DexMethod {
            signature: MethodSignature::new("Lcom/app/A;", "f", vec![], "V"),
            registers: 0,
            is_static: true,
            instructions: vec![Instruction::ReturnVoid],
            try_blocks: vec![],
        };
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.terminal_nodes().len(), 1);

        Ok(())
    }

    #[test]
    fn straight_line_arithmetic_reaches_a_concrete_return() -> anyhow::Result<()> {
        let method = static_method(
            vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(2),
                },
                Instruction::Const {
                    dest: 1,
                    literal: ConstLiteral::Narrow(3),
                },
                Instruction::Binary {
                    dest: 0,
                    lhs: 0,
                    rhs: 1,
                    operator: MathOperator::Add,
                    operand: OperandType::Int,
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
            ],
            2,
        );
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        let consensus = graph.register_consensus(2, 0).unwrap();
        assert_eq!(consensus.value, Value::Concrete(ConcreteValue::Int(5)));
        assert!((0..4).all(|location| graph.is_reachable(location)));

        Ok(())
    }

    #[test]
    fn decided_branches_leave_the_untaken_side_unreachable() -> anyhow::Result<()> {
        let method = static_method(
            vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(1),
                },
                Instruction::IfTestZ {
                    value: 0,
                    comparison: IfComparison::Equal,
                    target: 4,
                },
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(7),
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(9),
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
            ],
            1,
        );
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert!(graph.is_reachable(2));
        assert!(!graph.is_reachable(4));
        assert!(!graph.is_reachable(5));

        Ok(())
    }

    #[test]
    fn unknown_loop_terminates_through_merging() -> anyhow::Result<()> {
        // v0 starts unknown (it is the parameter); loop decrements until the
        // branch cannot be decided, which is immediately.
        let method = DexMethod {
            signature: MethodSignature::new("Lcom/app/A;", "f", vec!["I".into()], "I"),
            registers: 2,
            is_static: true,
            instructions: vec![
                Instruction::IfTestZ {
                    value: 1,
                    comparison: IfComparison::LessOrEqual,
                    target: 3,
                },
                Instruction::BinaryLiteral {
                    dest: 1,
                    lhs: 1,
                    literal: -1,
                    operator: MathOperator::Add,
                },
                Instruction::Goto { target: 0 },
                Instruction::Return {
                    src: 1,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
            ],
            try_blocks: vec![],
        };
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert!(graph.is_reachable(3));

        Ok(())
    }

    #[test]
    fn tight_address_visit_bound_aborts_a_loop() {
        // The counting loop needs three visits of the loop head before its
        // state stabilises; a bound of two must abort the build first.
        let method = static_method(
            vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(1),
                },
                Instruction::BinaryLiteral {
                    dest: 0,
                    lhs: 0,
                    literal: 1,
                    operator: MathOperator::Add,
                },
                Instruction::Goto { target: 1 },
            ],
            1,
        );
        let signature = method.signature.clone();
        let manager = ClassManager::new(DexModel {
            api_level: 15,
            classes: vec![DexClass {
                name: signature.class.clone(),
                super_class: "Ljava/lang/Object;".into(),
                fields: vec![],
                methods: vec![method],
            }],
        })
        .unwrap();
        let mut vm = VirtualMachine::new(
            manager,
            Configuration::default(),
            Config::default().with_max_address_visits(2),
        );

        let result = vm.execute(&signature);

        match result {
            Err(located) => {
                assert!(matches!(located.payload, Error::MaxAddressVisitsExceeded { .. }));
                assert!(located.payload.is_resource_bound());
            }
            Ok(_) => panic!("The loop must breach the address-visit bound"),
        }
    }

    #[test]
    fn infinite_loop_with_stable_state_converges() -> anyhow::Result<()> {
        // A loop whose body leaves the state untouched stabilises after the
        // first back-edge merge; the build completes with no returning path.
        let method = static_method(
            vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(1),
                },
                Instruction::Nop,
                Instruction::Goto { target: 1 },
            ],
            1,
        );
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert!(graph.is_reachable(2));

        Ok(())
    }

    #[test]
    fn division_by_zero_yields_a_terminal_exception_node() -> anyhow::Result<()> {
        let method = static_method(
            vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(10),
                },
                Instruction::BinaryLiteral {
                    dest: 0,
                    lhs: 0,
                    literal: 0,
                    operator: MathOperator::Div,
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
            ],
            1,
        );
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert!(!graph.is_reachable(2));
        let terminals = graph.terminal_nodes();
        assert_eq!(terminals.len(), 1);
        let node = graph.node(terminals[0]);
        assert_eq!(
            node.exception().unwrap().kind,
            crate::smali::instruction::ARITHMETIC_EXCEPTION
        );
        assert!(node.children().is_empty());

        Ok(())
    }

    #[test]
    fn caught_exceptions_continue_at_the_handler() -> anyhow::Result<()> {
        let method = DexMethod {
            signature: MethodSignature::new("Lcom/app/A;", "f", vec![], "I"),
            registers: 2,
            is_static: true,
            instructions: vec![
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(10),
                },
                Instruction::BinaryLiteral {
                    dest: 0,
                    lhs: 0,
                    literal: 0,
                    operator: MathOperator::Div,
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
                Instruction::MoveException { dest: 1 },
                Instruction::Const {
                    dest: 0,
                    literal: ConstLiteral::Narrow(-1),
                },
                Instruction::Return {
                    src: 0,
                    kind: crate::smali::instruction::MoveKind::Narrow,
                },
            ],
            try_blocks: vec![crate::smali::method::TryBlock {
                start: 0,
                end: 3,
                handlers: vec![crate::smali::method::CatchHandler {
                    exception: Some(crate::smali::instruction::ARITHMETIC_EXCEPTION.into()),
                    target: 3,
                }],
            }],
        };
        let (mut vm, signature) = machine_with_method(method);

        let graph = vm.execute(&signature)?;

        assert!(graph.is_reachable(3));
        assert!(graph.is_reachable(5));
        let consensus = graph.register_consensus(4, 0).unwrap();
        assert_eq!(consensus.value, Value::Concrete(ConcreteValue::Int(-1)));

        Ok(())
    }

    #[test]
    fn call_depth_is_bounded_for_mutual_recursion() {
        let f = MethodSignature::new("Lcom/app/A;", "f", vec![], "V");
        let g = MethodSignature::new("Lcom/app/A;", "g", vec![], "V");
        let call = |target: &MethodSignature| Instruction::Invoke {
            kind: crate::smali::instruction::InvokeKind::Static,
            method: target.clone(),
            arguments: vec![],
            range: false,
        };
        let manager = ClassManager::new(DexModel {
            api_level: 15,
            classes: vec![DexClass {
                name: "Lcom/app/A;".into(),
                super_class: "Ljava/lang/Object;".into(),
                fields: vec![],
                methods: vec![
                    DexMethod {
                        signature: f.clone(),
                        registers: 0,
                        is_static: true,
                        instructions: vec![call(&g), Instruction::ReturnVoid],
                        try_blocks: vec![],
                    },
                    DexMethod {
                        signature: g.clone(),
                        registers: 0,
                        is_static: true,
                        instructions: vec![call(&f), Instruction::ReturnVoid],
                        try_blocks: vec![],
                    },
                ],
            }],
        })
        .unwrap();
        let mut vm = VirtualMachine::new(
            manager,
            Configuration::default(),
            Config::default().with_max_call_depth(3),
        );

        let result = vm.execute(&f);

        match result {
            Err(located) => {
                assert!(matches!(located.payload, Error::MaxCallDepthExceeded { .. }));
            }
            Ok(_) => panic!("Mutual recursion must breach the call-depth bound"),
        }
    }
}
