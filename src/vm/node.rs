//! This module contains the definition of a single node in the execution
//! graph: one visit to one instruction address with one incoming state.

use crate::vm::{context::ExecutionContext, side_effect::Level, value::VirtualException};

/// The index of a node within its graph's arena.
///
/// Nodes refer to one another exclusively through these indices; the graph
/// owns the arena and no node owns another.
pub type NodeId = usize;

/// One node of the execution graph.
///
/// An instruction address can be represented by several nodes, one per
/// distinct state under which the driver reached it. The node's context is
/// the state _after_ its instruction executed; its declared child locations
/// are where execution proceeds from there.
#[derive(Clone, Debug)]
pub struct ExecutionNode {
    /// The instruction address this node represents a visit to.
    location: usize,

    /// The abstract state, post-execution of this node's instruction.
    context: ExecutionContext,

    /// The addresses execution proceeds to from this node, as declared by the
    /// opcode handler.
    child_locations: Vec<usize>,

    /// The nodes created for each declared child location, filled in by the
    /// driver.
    children: Vec<NodeId>,

    /// The exception attached to this node, if its instruction raised one.
    exception: Option<VirtualException>,

    /// The side-effect level the opcode handler reported for this execution.
    side_effect_level: Level,
}

impl ExecutionNode {
    /// Constructs a node for a visit to `location` with the incoming
    /// `context`.
    ///
    /// The child locations start empty; the opcode handler declares them
    /// during execution.
    #[must_use]
    pub fn new(location: usize, context: ExecutionContext) -> Self {
        Self {
            location,
            context,
            child_locations: Vec::new(),
            children: Vec::new(),
            exception: None,
            side_effect_level: Level::None,
        }
    }

    /// Gets the instruction address this node visits.
    #[must_use]
    pub fn location(&self) -> usize {
        self.location
    }

    /// Gets the node's context.
    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Gets the node's context.
    #[must_use]
    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.context
    }

    /// Gets the addresses execution proceeds to from this node.
    #[must_use]
    pub fn child_locations(&self) -> &[usize] {
        &self.child_locations
    }

    /// Declares the addresses execution proceeds to from this node.
    pub fn set_child_locations(&mut self, locations: Vec<usize>) {
        self.child_locations = locations;
    }

    /// Removes every declared child, making the node terminal. Handlers call
    /// this when the instruction's only outcome is an exception.
    pub fn clear_children(&mut self) {
        self.child_locations.clear();
    }

    /// Gets the nodes created for this node's declared children.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Records `child` as a realised child of this node.
    pub fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Attaches `exception` to this node.
    pub fn set_exception(&mut self, exception: VirtualException) {
        self.exception = Some(exception);
    }

    /// Removes any attached exception. Handlers call this when execution
    /// completed without raising.
    pub fn clear_exception(&mut self) {
        self.exception = None;
    }

    /// Gets the exception attached to this node, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&VirtualException> {
        self.exception.as_ref()
    }

    /// Gets the side-effect level reported for this node's execution.
    #[must_use]
    pub fn side_effect_level(&self) -> Level {
        self.side_effect_level
    }

    /// Sets the side-effect level for this node's execution.
    pub fn set_side_effect_level(&mut self, level: Level) {
        self.side_effect_level = level;
    }
}
