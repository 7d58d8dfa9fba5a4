//! Handlers for the control-transfer families: returns, `goto`, the
//! conditional branches, the switches, `throw`, and the monitor pair.
//!
//! Conditional branches are where branch pruning originates: when the
//! abstract state decides the condition, the handler declares only the taken
//! successor, and the optimizer later rewrites the branch to match.

use crate::{
    error::execution,
    smali::instruction::{IfComparison, Instruction, NULL_POINTER_EXCEPTION},
    vm::{
        node::ExecutionNode,
        side_effect::Level,
        value::{ConcreteValue, HeapItem, Value, VirtualException},
    },
};

/// Executes one of the control-transfer families on `node`.
///
/// # Errors
///
/// Returns [`Err`] if a named register is out of range for the frame.
pub fn execute(instruction: &Instruction, node: &mut ExecutionNode) -> execution::Result<()> {
    match instruction {
        Instruction::ReturnVoid => Ok(()),
        Instruction::Return { src, kind: _ } => {
            let item = node.context_mut().method_state_mut().read_register(*src)?;
            // The returned item is parked in the result pseudo-register so
            // the driver can hand it to a recursive caller.
            node.context_mut().method_state_mut().set_result(item);
            Ok(())
        }
        Instruction::Goto { .. } => Ok(()),
        Instruction::IfTest {
            lhs,
            rhs,
            comparison,
            target,
        } => {
            let lhs_item = node.context_mut().method_state_mut().read_register(*lhs)?;
            let rhs_item = node.context_mut().method_state_mut().read_register(*rhs)?;
            prune_branch(node, &lhs_item, &rhs_item, *comparison, *target);
            Ok(())
        }
        Instruction::IfTestZ {
            value,
            comparison,
            target,
        } => {
            let item = node.context_mut().method_state_mut().read_register(*value)?;
            let zero = HeapItem::new(Value::Concrete(ConcreteValue::Int(0)), "I");
            prune_branch(node, &item, &zero, *comparison, *target);
            Ok(())
        }
        Instruction::PackedSwitch {
            value,
            first_key,
            targets,
        } => {
            let item = node.context_mut().method_state_mut().read_register(*value)?;
            if let Some(selector) = item.value.concrete().and_then(ConcreteValue::as_int) {
                let index = selector.wrapping_sub(*first_key);
                let taken = usize::try_from(index)
                    .ok()
                    .and_then(|index| targets.get(index).copied())
                    .unwrap_or(node.location() + 1);
                node.set_child_locations(vec![taken]);
            }
            Ok(())
        }
        Instruction::SparseSwitch {
            value,
            keys,
            targets,
        } => {
            let item = node.context_mut().method_state_mut().read_register(*value)?;
            if let Some(selector) = item.value.concrete().and_then(ConcreteValue::as_int) {
                let taken = keys
                    .iter()
                    .position(|key| *key == selector)
                    .and_then(|index| targets.get(index).copied())
                    .unwrap_or(node.location() + 1);
                node.set_child_locations(vec![taken]);
            }
            Ok(())
        }
        Instruction::Throw { exception } => {
            let item = node.context_mut().method_state_mut().read_register(*exception)?;
            let raised = match &item.value {
                Value::Exception(exception) => exception.clone(),
                Value::Concrete(value) if value.is_null() => {
                    VirtualException::new(NULL_POINTER_EXCEPTION, "throw on a null reference")
                }
                // The thrown object itself is usually opaque; its declared
                // type is what the catch routing needs.
                _ => VirtualException::new(item.declared_type.clone(), ""),
            };
            node.set_exception(raised);
            node.clear_children();
            Ok(())
        }
        Instruction::MonitorEnter { object } | Instruction::MonitorExit { object } => {
            let item = node.context_mut().method_state_mut().read_register(*object)?;
            if item.value.concrete().is_some_and(ConcreteValue::is_null) {
                node.set_exception(VirtualException::new(
                    NULL_POINTER_EXCEPTION,
                    "monitor operation on a null reference",
                ));
                node.clear_children();
                return Ok(());
            }
            // Synchronization is observable beyond the model.
            node.set_side_effect_level(Level::Strong);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Declares only the taken successor when the branch condition is decided by
/// the abstract state, and leaves both otherwise.
fn prune_branch(
    node: &mut ExecutionNode,
    lhs: &HeapItem,
    rhs: &HeapItem,
    comparison: IfComparison,
    target: usize,
) {
    let Some(ordering) = branch_ordering(lhs, rhs, comparison) else {
        return;
    };

    let taken = if comparison.applies_to(ordering) {
        target
    } else {
        node.location() + 1
    };
    node.set_child_locations(vec![taken]);
}

/// Computes the three-way ordering a conditional branch tests, if the
/// abstract state decides it.
///
/// Integral values compare numerically. References participate only in
/// equality tests: null compares equal to the zero register, and an allocated
/// instance is never null. Everything else is undecided.
fn branch_ordering(lhs: &HeapItem, rhs: &HeapItem, comparison: IfComparison) -> Option<i32> {
    let equality_only = matches!(comparison, IfComparison::Equal | IfComparison::NotEqual);

    match (&lhs.value, &rhs.value) {
        (Value::Concrete(a), Value::Concrete(b)) => {
            if let (Some(a), Some(b)) = (a.as_int(), b.as_int()) {
                return Some(match a.cmp(&b) {
                    std::cmp::Ordering::Less => -1,
                    std::cmp::Ordering::Equal => 0,
                    std::cmp::Ordering::Greater => 1,
                });
            }
            if equality_only {
                if a.is_null() && b.is_null() {
                    return Some(0);
                }
                if !a.identical(b) {
                    // Distinct contents can never be the same reference.
                    return Some(1);
                }
                // Interned reference types are equal by content; other
                // structurally equal references may still be distinct
                // objects, so their identity stays undecided.
                return match (a, b) {
                    (ConcreteValue::String(_), ConcreteValue::String(_))
                    | (ConcreteValue::Class(_), ConcreteValue::Class(_)) => Some(0),
                    _ => None,
                };
            }
            None
        }
        // An uninitialized instance is a real allocation: non-null, and
        // never identical to a concrete reference.
        (Value::UninitializedInstance { .. }, Value::Concrete(b))
            if equality_only && b.is_null() =>
        {
            Some(1)
        }
        (Value::Concrete(a), Value::UninitializedInstance { .. })
            if equality_only && a.is_null() =>
        {
            Some(1)
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use crate::{
        opcode::control,
        smali::instruction::{IfComparison, Instruction},
        vm::{
            context::ExecutionContext,
            method_state::MethodState,
            node::ExecutionNode,
            value::{ConcreteValue, HeapItem, Value},
        },
    };

    fn node_at(location: usize, values: &[Option<i32>]) -> ExecutionNode {
        let mut state = MethodState::new(values.len().max(1));
        for (register, value) in values.iter().enumerate() {
            let item = match value {
                Some(value) => HeapItem::new(Value::Concrete(ConcreteValue::Int(*value)), "I"),
                None => HeapItem::unknown("I"),
            };
            state.assign_register(register as u16, item).unwrap();
        }
        ExecutionNode::new(location, ExecutionContext::new(state))
    }

    #[test]
    fn decided_branch_declares_only_the_taken_side() -> anyhow::Result<()> {
        let mut node = node_at(3, &[Some(1), Some(1)]);
        node.set_child_locations(vec![4, 9]);

        let instruction = Instruction::IfTest {
            lhs: 0,
            rhs: 1,
            comparison: IfComparison::Equal,
            target: 9,
        };
        control::execute(&instruction, &mut node)?;

        assert_eq!(node.child_locations(), &[9]);

        Ok(())
    }

    #[test]
    fn undecided_branch_keeps_both_sides() -> anyhow::Result<()> {
        let mut node = node_at(3, &[None, Some(1)]);
        node.set_child_locations(vec![4, 9]);

        let instruction = Instruction::IfTest {
            lhs: 0,
            rhs: 1,
            comparison: IfComparison::Equal,
            target: 9,
        };
        control::execute(&instruction, &mut node)?;

        assert_eq!(node.child_locations(), &[4, 9]);

        Ok(())
    }

    #[test]
    fn false_zero_test_falls_through() -> anyhow::Result<()> {
        let mut node = node_at(2, &[Some(5)]);
        node.set_child_locations(vec![3, 7]);

        let instruction = Instruction::IfTestZ {
            value: 0,
            comparison: IfComparison::Equal,
            target: 7,
        };
        control::execute(&instruction, &mut node)?;

        assert_eq!(node.child_locations(), &[3]);

        Ok(())
    }

    #[test]
    fn concrete_packed_switch_selects_one_case() -> anyhow::Result<()> {
        let mut node = node_at(0, &[Some(6)]);
        node.set_child_locations(vec![1, 5, 6, 7]);

        let instruction = Instruction::PackedSwitch {
            value: 0,
            first_key: 5,
            targets: vec![5, 6, 7],
        };
        control::execute(&instruction, &mut node)?;

        assert_eq!(node.child_locations(), &[6]);

        Ok(())
    }

    #[test]
    fn unmatched_switch_selector_falls_through() -> anyhow::Result<()> {
        let mut node = node_at(0, &[Some(42)]);
        node.set_child_locations(vec![1, 5]);

        let instruction = Instruction::SparseSwitch {
            value: 0,
            keys: vec![1, 2],
            targets: vec![5, 5],
        };
        control::execute(&instruction, &mut node)?;

        assert_eq!(node.child_locations(), &[1]);

        Ok(())
    }

    #[test]
    fn throw_attaches_the_declared_exception_type() -> anyhow::Result<()> {
        let mut state = MethodState::new(1);
        state.assign_register(
            0,
            HeapItem::new(
                Value::UninitializedInstance {
                    class: "Ljava/lang/IllegalStateException;".into(),
                },
                "Ljava/lang/IllegalStateException;",
            ),
        )?;
        let mut node = ExecutionNode::new(0, ExecutionContext::new(state));
        node.set_child_locations(vec![1]);

        control::execute(&Instruction::Throw { exception: 0 }, &mut node)?;

        assert!(node.child_locations().is_empty());
        assert_eq!(
            node.exception().unwrap().kind,
            "Ljava/lang/IllegalStateException;"
        );

        Ok(())
    }
}
