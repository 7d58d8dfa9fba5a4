//! This module contains the execution graph: the per-method record of every
//! state under which every reachable instruction executed.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    smali::method::MethodSignature,
    vm::{
        node::{ExecutionNode, NodeId},
        side_effect::Level,
        value::HeapItem,
    },
};

/// The execution graph of one method.
///
/// The graph mirrors the method's control-flow graph, except that an
/// instruction address is represented by one node _per distinct incoming
/// state_, so loops and multi-predecessor joins contribute several nodes at
/// the same address. Nodes live in an arena owned by the graph and refer to
/// one another by index.
///
/// The optimizer consumes the graph through its consensus queries: an
/// instruction's effect is foldable exactly when every node at its address
/// agrees on the produced value.
#[derive(Clone, Debug)]
pub struct ExecutionGraph {
    /// The signature of the executed method.
    signature: MethodSignature,

    /// The number of instructions in the executed method.
    instruction_count: usize,

    /// The node arena.
    nodes: Vec<ExecutionNode>,

    /// The nodes representing each instruction address, in creation order.
    location_nodes: BTreeMap<usize, Vec<NodeId>>,
}

impl ExecutionGraph {
    /// Constructs an empty graph for the method with the provided
    /// `signature` and `instruction_count`.
    #[must_use]
    pub fn new(signature: MethodSignature, instruction_count: usize) -> Self {
        Self {
            signature,
            instruction_count,
            nodes: Vec::new(),
            location_nodes: BTreeMap::new(),
        }
    }

    /// Gets the signature of the executed method.
    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Gets the number of instructions in the executed method.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instruction_count
    }

    /// Adds `node` to the arena, indexing it under its address, and returns
    /// its id.
    pub fn add_node(&mut self, node: ExecutionNode) -> NodeId {
        let id = self.nodes.len();
        self.location_nodes.entry(node.location()).or_default().push(id);
        self.nodes.push(node);
        id
    }

    /// Gets the node with the provided `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid id in this graph, which is a programmer
    /// bug: ids are only ever obtained from this same graph.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &ExecutionNode {
        &self.nodes[id]
    }

    /// Gets the node with the provided `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a valid id in this graph, which is a programmer
    /// bug.
    #[must_use]
    pub fn node_mut(&mut self, id: NodeId) -> &mut ExecutionNode {
        &mut self.nodes[id]
    }

    /// Gets the ids of the nodes at `location`, in creation order.
    #[must_use]
    pub fn nodes_at(&self, location: usize) -> &[NodeId] {
        self.location_nodes.get(&location).map_or(&[], Vec::as_slice)
    }

    /// Checks whether any node exists at `location`, i.e. whether the
    /// instruction there is reachable under the abstract semantics.
    #[must_use]
    pub fn is_reachable(&self, location: usize) -> bool {
        !self.nodes_at(location).is_empty()
    }

    /// Gets every address with at least one node.
    #[must_use]
    pub fn reachable_locations(&self) -> BTreeSet<usize> {
        self.location_nodes
            .iter()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(location, _)| *location)
            .collect()
    }

    /// Gets the ids of the graph's terminal nodes: those from which execution
    /// does not continue.
    #[must_use]
    pub fn terminal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.children().is_empty())
            .map(|(id, _)| id)
            .collect()
    }

    /// Gets the total number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Queries whether every node at `location` agrees on the post-execution
    /// value of `register`, returning the agreed item if so.
    ///
    /// Returns [`None`] when the address is unreachable or any pair of nodes
    /// disagrees. The agreed value may itself be unknown; callers interested
    /// in folding should additionally check concreteness.
    #[must_use]
    pub fn register_consensus(&self, location: usize, register: u16) -> Option<HeapItem> {
        let nodes = self.nodes_at(location);
        let first = nodes.first()?;
        let agreed = self.node(*first).context().method_state().peek_register(register).ok()?;
        for id in &nodes[1..] {
            let item = self.node(*id).context().method_state().peek_register(register).ok()?;
            if !agreed.value.identical(&item.value) {
                return None;
            }
        }

        Some(agreed)
    }

    /// Queries whether every node at `location` agrees on the value of the
    /// invoke-result pseudo-register, returning the agreed item if so.
    #[must_use]
    pub fn result_consensus(&self, location: usize) -> Option<HeapItem> {
        let nodes = self.nodes_at(location);
        let first = nodes.first()?;
        let agreed = self.node(*first).context().method_state().result_snapshot()?;
        for id in &nodes[1..] {
            let item = self.node(*id).context().method_state().result_snapshot()?;
            if !agreed.value.identical(&item.value) {
                return None;
            }
        }

        Some(agreed)
    }

    /// Joins the side-effect levels reported by every node at `location`.
    ///
    /// An unreachable address reports [`Level::None`], as nothing it could do
    /// was ever observed.
    #[must_use]
    pub fn location_side_effect_level(&self, location: usize) -> Level {
        self.nodes_at(location)
            .iter()
            .map(|id| self.node(*id).side_effect_level())
            .fold(Level::None, Level::join)
    }

    /// Joins the side-effect levels of every node in the graph.
    #[must_use]
    pub fn side_effect_level(&self) -> Level {
        self.nodes
            .iter()
            .map(ExecutionNode::side_effect_level)
            .fold(Level::None, Level::join)
    }

    /// Checks whether `register` may be read after the node `from` executes,
    /// before being reassigned, on any path through the graph.
    ///
    /// Handlers read their operands before assigning their destination, so a
    /// node that both reads and reassigns the register counts as a read.
    #[must_use]
    pub fn register_read_after(&self, from: NodeId, register: u16) -> bool {
        let mut queue: VecDeque<NodeId> = self.node(from).children().iter().copied().collect();
        let mut seen: BTreeSet<NodeId> = queue.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            let state = self.node(id).context().method_state();
            if state.read_registers().contains(&register) {
                return true;
            }
            if state.assigned_registers().contains(&register) {
                // Reassigned without a read; this path is done.
                continue;
            }
            for child in self.node(id).children() {
                if seen.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }

        false
    }
}
