//! Handlers for the field-access families.
//!
//! The static accessors are execution-context handlers: touching a static
//! field of a local class initializes that class lazily, and the access
//! inherits the initializer's side-effect level. Instance fields are not
//! value-tracked by the engine, so instance reads produce unknowns; what
//! matters for optimization is their null behavior and side-effect level.

use crate::{
    error::execution,
    smali::instruction::{Instruction, NULL_POINTER_EXCEPTION},
    vm::{
        node::ExecutionNode,
        side_effect::Level,
        value::{ConcreteValue, HeapItem, Value, VirtualException},
        VirtualMachine,
    },
};

/// Executes one of the field-access families on `node`.
///
/// # Errors
///
/// Returns [`Err`] if a named register is out of range for the frame, or if a
/// resource bound is breached while running a class initializer.
pub fn execute(
    vm: &mut VirtualMachine,
    instruction: &Instruction,
    node: &mut ExecutionNode,
    depth: usize,
) -> execution::Result<()> {
    match instruction {
        Instruction::StaticGet { dest, field, kind } => {
            let item = if vm.is_local_class(&field.class) {
                vm.ensure_class_initialized(node.context_mut(), &field.class, depth)?;
                let level = node
                    .context()
                    .class_state(&field.class)
                    .map_or(Level::Strong, |state| state.side_effect_level());
                node.set_side_effect_level(level);
                node.context()
                    .class_state(&field.class)
                    .and_then(|state| state.field(&field.name))
                    .cloned()
                    .unwrap_or_else(|| HeapItem::unknown(&field.descriptor))
            } else {
                // A framework class's initializer is outside the model; the
                // value is unknowable, but reading it is harmless when the
                // class is known safe.
                if !vm.configuration().is_safe_class(&field.class) {
                    node.set_side_effect_level(Level::Strong);
                }
                HeapItem::unknown(&field.descriptor)
            };

            let state = node.context_mut().method_state_mut();
            if kind.is_wide() {
                state.assign_register_wide(*dest, item)
            } else {
                state.assign_register(*dest, item)
            }
        }
        Instruction::StaticPut { src, field, kind: _ } => {
            let item = node.context_mut().method_state_mut().read_register(*src)?;
            if vm.is_local_class(&field.class) {
                vm.ensure_class_initialized(node.context_mut(), &field.class, depth)?;
                if let Some(state) = node.context_mut().class_state_mut(&field.class) {
                    state.set_field(
                        &field.name,
                        HeapItem::new(item.value, field.descriptor.clone()),
                    );
                }
                node.set_side_effect_level(Level::Weak);
            } else {
                node.set_side_effect_level(Level::Strong);
            }
            Ok(())
        }
        Instruction::InstanceGet {
            dest,
            object,
            field,
            kind,
        } => {
            let object_item = node.context_mut().method_state_mut().read_register(*object)?;
            if object_item.value.concrete().is_some_and(ConcreteValue::is_null) {
                node.set_exception(VirtualException::new(
                    NULL_POINTER_EXCEPTION,
                    format!("field read of {} on a null reference", field.name),
                ));
                node.clear_children();
                return Ok(());
            }

            node.clear_exception();
            let item = HeapItem::unknown(&field.descriptor);
            let state = node.context_mut().method_state_mut();
            if kind.is_wide() {
                state.assign_register_wide(*dest, item)
            } else {
                state.assign_register(*dest, item)
            }
        }
        Instruction::InstancePut {
            src,
            object,
            field,
            kind: _,
        } => {
            let object_item = node.context_mut().method_state_mut().read_register(*object)?;
            let _ = node.context_mut().method_state_mut().read_register(*src)?;
            if object_item.value.concrete().is_some_and(ConcreteValue::is_null) {
                node.set_exception(VirtualException::new(
                    NULL_POINTER_EXCEPTION,
                    format!("field write of {} on a null reference", field.name),
                ));
                node.clear_children();
                return Ok(());
            }

            node.clear_exception();
            // Writes to instances created in this method stay within the
            // model; writes through unknown references escape it.
            let level = match &object_item.value {
                Value::UninitializedInstance { .. } => Level::Weak,
                _ => Level::Strong,
            };
            node.set_side_effect_level(level);
            Ok(())
        }
        _ => Ok(()),
    }
}
