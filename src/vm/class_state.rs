//! This module contains the per-class static state tracked during execution.

use std::collections::BTreeMap;

use crate::vm::{side_effect::Level, value::HeapItem};

/// The initialization status of a class, advanced strictly
/// `NotStarted → InProgress → Done`.
///
/// The `InProgress` state exists so that re-entry into a class's own
/// `<clinit>` (directly or through a cycle of initializers) can be detected
/// and short-circuited: the re-entrant reader observes whatever has been
/// assigned so far, and unknowns otherwise, which is how the runtime behaves
/// for a thread re-entering its own initializer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitializationState {
    NotStarted,
    InProgress,
    Done,
}

/// The static-field store of one class, with its initialization status and
/// the aggregated side-effect level of its initializer.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassState {
    /// The values of the class's static fields, by field name.
    fields: BTreeMap<String, HeapItem>,

    /// How far class initialization has progressed.
    initialization: InitializationState,

    /// The join of the side-effect levels of every instruction the class's
    /// initializer executed.
    side_effect_level: Level,
}

impl ClassState {
    /// Constructs a state for a class whose initializer has not started.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            initialization: InitializationState::NotStarted,
            side_effect_level: Level::None,
        }
    }

    /// Gets the value of the static field `name`, if one has been recorded.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&HeapItem> {
        self.fields.get(name)
    }

    /// Sets the value of the static field `name`.
    pub fn set_field(&mut self, name: impl Into<String>, item: HeapItem) {
        self.fields.insert(name.into(), item);
    }

    /// Gets the initialization status of the class.
    #[must_use]
    pub fn initialization(&self) -> InitializationState {
        self.initialization
    }

    /// Advances the initialization status of the class.
    pub fn set_initialization(&mut self, state: InitializationState) {
        self.initialization = state;
    }

    /// Gets the aggregated side-effect level of the class's initializer.
    #[must_use]
    pub fn side_effect_level(&self) -> Level {
        self.side_effect_level
    }

    /// Raises the aggregated side-effect level of the class's initializer.
    pub fn raise_side_effect_level(&mut self, level: Level) {
        self.side_effect_level = self.side_effect_level.join(level);
    }

    /// Creates a copy of the state for a branched context, deep-copying field
    /// values so divergent paths cannot see one another's writes.
    #[must_use]
    pub fn branch(&self) -> Self {
        let fields = self
            .fields
            .iter()
            .map(|(name, item)| (name.clone(), item.deep_clone()))
            .collect();
        Self {
            fields,
            initialization: self.initialization,
            side_effect_level: self.side_effect_level,
        }
    }

    /// Joins another state into this one field-wise in the value lattice.
    ///
    /// A field recorded on only one side joins with the unknown value, since
    /// the other path may have left it at any value.
    pub fn merge_with(&mut self, other: &Self) {
        for (name, incoming) in &other.fields {
            match self.fields.get_mut(name) {
                Some(existing) => *existing = existing.merge(incoming),
                None => {
                    self.fields.insert(name.clone(), HeapItem::unknown(&incoming.declared_type));
                }
            }
        }
        for (name, existing) in &mut self.fields {
            if !other.fields.contains_key(name) {
                *existing = HeapItem::unknown(&existing.declared_type);
            }
        }
        self.side_effect_level = self.side_effect_level.join(other.side_effect_level);
    }
}

impl Default for ClassState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use crate::vm::{
        class_state::{ClassState, InitializationState},
        side_effect::Level,
        value::{ConcreteValue, HeapItem, Value},
    };

    fn int_item(value: i32) -> HeapItem {
        HeapItem::new(Value::Concrete(ConcreteValue::Int(value)), "I")
    }

    #[test]
    fn initialization_starts_not_started() {
        let state = ClassState::new();
        assert_eq!(state.initialization(), InitializationState::NotStarted);
        assert_eq!(state.side_effect_level(), Level::None);
    }

    #[test]
    fn side_effect_level_only_rises() {
        let mut state = ClassState::new();
        state.raise_side_effect_level(Level::Strong);
        state.raise_side_effect_level(Level::Weak);

        assert_eq!(state.side_effect_level(), Level::Strong);
    }

    #[test]
    fn merging_one_sided_fields_yields_unknown() {
        let mut a = ClassState::new();
        let b = {
            let mut b = ClassState::new();
            b.set_field("x", int_item(1));
            b
        };
        a.set_field("y", int_item(2));

        a.merge_with(&b);

        assert!(a.field("x").unwrap().is_unknown());
        assert!(a.field("y").unwrap().is_unknown());
    }

    #[test]
    fn merging_agreeing_fields_preserves_them() {
        let mut a = ClassState::new();
        let mut b = ClassState::new();
        a.set_field("x", int_item(3));
        b.set_field("x", int_item(3));

        a.merge_with(&b);

        assert_eq!(a.field("x"), Some(&int_item(3)));
    }
}
