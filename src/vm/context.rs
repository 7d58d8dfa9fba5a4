//! This module contains the full abstract state carried along each execution
//! edge: the method's register file together with the class states visible to
//! it.

use std::collections::BTreeMap;

use crate::vm::{class_state::ClassState, method_state::MethodState};

/// The complete abstract state at one point of execution.
///
/// Contexts are the unit of copy-on-branch: every child node receives a
/// [`ExecutionContext::branch`] of its parent's context, so that state
/// mutations on one path are invisible to its siblings. Class states live in
/// the context (not globally) for the same reason; the virtual machine seeds
/// them lazily from its once-per-class initialization cache.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionContext {
    /// The register file of the executing method.
    method_state: MethodState,

    /// The class states visible on this path, by class name.
    class_states: BTreeMap<String, ClassState>,
}

impl ExecutionContext {
    /// Constructs a context around the provided `method_state`, with no class
    /// states loaded yet.
    #[must_use]
    pub fn new(method_state: MethodState) -> Self {
        Self {
            method_state,
            class_states: BTreeMap::new(),
        }
    }

    /// Constructs the entry context of a callee: the provided fresh
    /// `method_state` together with deep copies of the `parent` context's
    /// class states, so the callee observes the caller's static world.
    #[must_use]
    pub fn for_call(method_state: MethodState, parent: &Self) -> Self {
        let class_states = parent
            .class_states
            .iter()
            .map(|(name, state)| (name.clone(), state.branch()))
            .collect();
        Self {
            method_state,
            class_states,
        }
    }

    /// Gets the method state of the context.
    #[must_use]
    pub fn method_state(&self) -> &MethodState {
        &self.method_state
    }

    /// Gets the method state of the context.
    #[must_use]
    pub fn method_state_mut(&mut self) -> &mut MethodState {
        &mut self.method_state
    }

    /// Gets the state of the class named `name`, if loaded on this path.
    #[must_use]
    pub fn class_state(&self, name: &str) -> Option<&ClassState> {
        self.class_states.get(name)
    }

    /// Gets the state of the class named `name`, if loaded on this path.
    #[must_use]
    pub fn class_state_mut(&mut self, name: &str) -> Option<&mut ClassState> {
        self.class_states.get_mut(name)
    }

    /// Installs `state` as the state of the class named `name` on this path.
    pub fn install_class_state(&mut self, name: impl Into<String>, state: ClassState) {
        self.class_states.insert(name.into(), state);
    }

    /// Replaces this context's class states with `other`'s, for propagating
    /// the effects of a completed callee back to its caller.
    pub fn adopt_class_states_from(&mut self, other: Self) {
        self.class_states = other.class_states;
    }

    /// Creates the context for a child node: register values and class states
    /// are deep-copied so that divergent paths cannot see one another's
    /// writes.
    #[must_use]
    pub fn branch(&self) -> Self {
        let method_state = self.method_state.branch();
        let class_states = self
            .class_states
            .iter()
            .map(|(name, state)| (name.clone(), state.branch()))
            .collect();
        Self {
            method_state,
            class_states,
        }
    }

    /// Joins another context into this one: registers merge register-wise and
    /// class states merge field-wise in the value lattice.
    pub fn merge_with(&mut self, other: &Self) {
        self.method_state.merge_with(&other.method_state);
        for (name, incoming) in &other.class_states {
            match self.class_states.get_mut(name) {
                Some(existing) => existing.merge_with(incoming),
                None => {
                    self.class_states.insert(name.clone(), incoming.branch());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::vm::{
        class_state::ClassState,
        context::ExecutionContext,
        method_state::MethodState,
        value::{ConcreteValue, HeapItem, Value},
    };

    #[test]
    fn branched_contexts_are_independent() -> anyhow::Result<()> {
        let mut context = ExecutionContext::new(MethodState::new(1));
        let mut state = ClassState::new();
        state.set_field("x", HeapItem::new(Value::Concrete(ConcreteValue::Int(1)), "I"));
        context.install_class_state("Lcom/app/A;", state);

        let child = context.branch();
        context
            .class_state_mut("Lcom/app/A;")
            .unwrap()
            .set_field("x", HeapItem::new(Value::Concrete(ConcreteValue::Int(2)), "I"));

        let child_field = child.class_state("Lcom/app/A;").unwrap().field("x").unwrap();
        assert_eq!(
            child_field.value,
            Value::Concrete(ConcreteValue::Int(1))
        );

        Ok(())
    }
}
