//! Handler for the `invoke-*` families, the only handlers that may recurse
//! into the driver.
//!
//! Resolution tries three strategies in order:
//!
//! 1. A **local** target whose arguments are all tracked executes in a fresh
//!    child context; the return value, the class-state mutations, and the
//!    callee's aggregate side-effect level all propagate back.
//! 2. A **safe** target with concrete arguments is evaluated through the
//!    emulation catalog.
//! 3. Everything else produces an unknown result and a strong side effect.

use crate::{
    emulate,
    error::execution,
    smali::instruction::{Instruction, NULL_POINTER_EXCEPTION},
    vm::{
        context::ExecutionContext,
        method_state::MethodState,
        node::ExecutionNode,
        side_effect::Level,
        value::{ConcreteValue, HeapItem, Value, VirtualException},
        VirtualMachine,
    },
};

/// Executes an invoke on `node`, possibly recursing into the driver.
///
/// # Errors
///
/// Returns [`Err`] if a named register is out of range for the frame, or if a
/// resource bound is breached during the recursive execution.
pub fn execute(
    vm: &mut VirtualMachine,
    instruction: &Instruction,
    node: &mut ExecutionNode,
    depth: usize,
) -> execution::Result<()> {
    let Instruction::Invoke {
        kind,
        method,
        arguments,
        range: _,
    } = instruction
    else {
        return Ok(());
    };

    let mut argument_items = Vec::with_capacity(arguments.len());
    for register in arguments {
        let item = node.context_mut().method_state_mut().read_register(*register)?;
        argument_items.push(item);
    }

    if kind.has_receiver() {
        let receiver_is_null = argument_items
            .first()
            .and_then(|item| item.value.concrete())
            .is_some_and(ConcreteValue::is_null);
        if receiver_is_null {
            node.set_exception(VirtualException::new(
                NULL_POINTER_EXCEPTION,
                format!("invoke of {} on a null reference", method.name),
            ));
            node.clear_children();
            return Ok(());
        }
    }

    if vm.is_local_method(method) && all_tracked(&argument_items) {
        return execute_local(vm, node, method, &argument_items, depth);
    }

    if vm.configuration().is_safe_method(method) && all_concrete(&argument_items) {
        if let Some(result) = emulate::invoke(method, &argument_items) {
            return match result {
                Ok(value) => {
                    node.clear_exception();
                    node.set_side_effect_level(Level::None);
                    finish(node, method, value.map(|value| HeapItem::new(value, &method.return_type)));
                    Ok(())
                }
                Err(exception) => {
                    node.set_exception(exception);
                    node.clear_children();
                    Ok(())
                }
            };
        }
    }

    // Unresolvable: the call happens outside the model.
    node.clear_exception();
    node.set_side_effect_level(Level::Strong);
    finish(node, method, None);
    Ok(())
}

/// Executes a local callee in a fresh child context and propagates its
/// outcome into `node`.
fn execute_local(
    vm: &mut VirtualMachine,
    node: &mut ExecutionNode,
    method: &crate::smali::method::MethodSignature,
    argument_items: &[HeapItem],
    depth: usize,
) -> execution::Result<()> {
    let Some((registers, first_input)) = vm.local_method_frame(method) else {
        node.set_side_effect_level(Level::Strong);
        finish(node, method, None);
        return Ok(());
    };

    let mut callee_state = MethodState::new(registers);
    for (offset, item) in argument_items.iter().enumerate() {
        callee_state.assign_register((first_input + offset) as u16, item.deep_clone())?;
    }
    let entry = ExecutionContext::for_call(callee_state, node.context());

    let outcome = vm.execute_call(method, entry, depth + 1)?;

    if let Some(context) = outcome.context {
        node.context_mut().adopt_class_states_from(context);
    }
    node.set_side_effect_level(outcome.side_effect_level);

    if let Some(exception) = outcome.exception {
        node.set_exception(exception);
        node.clear_children();
        return Ok(());
    }

    node.clear_exception();
    let return_item = if method.return_type == "V" {
        None
    } else {
        Some(
            outcome
                .return_item
                .unwrap_or_else(|| HeapItem::unknown(&method.return_type)),
        )
    };
    finish(node, method, return_item);
    Ok(())
}

/// Parks the call's result for the following `move-result*`, or clears the
/// pseudo-register for void and unknown outcomes.
fn finish(
    node: &mut ExecutionNode,
    method: &crate::smali::method::MethodSignature,
    return_item: Option<HeapItem>,
) {
    let state = node.context_mut().method_state_mut();
    match return_item {
        Some(item) => state.set_result(item),
        None if method.return_type == "V" => state.clear_result(),
        None => state.set_result(HeapItem::unknown(&method.return_type)),
    }
}

/// Checks whether every argument is tracked well enough to execute a local
/// callee: concrete, or an instance allocated in this method.
fn all_tracked(arguments: &[HeapItem]) -> bool {
    arguments.iter().all(|item| {
        item.is_concrete() || matches!(item.value, Value::UninitializedInstance { .. })
    })
}

/// Checks whether every argument is concretely known.
fn all_concrete(arguments: &[HeapItem]) -> bool {
    arguments.iter().all(HeapItem::is_concrete)
}

#[cfg(test)]
mod test {
    use crate::{
        configuration::Configuration,
        opcode::invoke,
        smali::instruction::{Instruction, InvokeKind, NULL_POINTER_EXCEPTION},
        smali::method::MethodSignature,
        smali::{ClassManager, DexModel},
        vm::{
            context::ExecutionContext,
            method_state::MethodState,
            node::ExecutionNode,
            side_effect::Level,
            value::{ConcreteValue, HeapItem, Value},
            Config,
            VirtualMachine,
        },
    };

    fn empty_vm() -> VirtualMachine {
        let manager = ClassManager::new(DexModel {
            api_level: 15,
            classes: vec![],
        })
        .unwrap();
        VirtualMachine::new(manager, Configuration::default(), Config::default())
    }

    #[test]
    fn safe_call_with_concrete_arguments_is_evaluated() -> anyhow::Result<()> {
        let mut vm = empty_vm();
        let mut state = MethodState::new(1);
        state.assign_register(
            0,
            HeapItem::new(
                Value::Concrete(ConcreteValue::String("abc".into())),
                "Ljava/lang/String;",
            ),
        )?;
        let mut node = ExecutionNode::new(0, ExecutionContext::new(state));

        let instruction = Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodSignature::parse("Ljava/lang/String;->length()I")?,
            arguments: vec![0],
            range: false,
        };
        invoke::execute(&mut vm, &instruction, &mut node, 0)?;

        let result = node.context().method_state().result_snapshot().unwrap();
        assert_eq!(result.value, Value::Concrete(ConcreteValue::Int(3)));
        assert_eq!(node.side_effect_level(), Level::None);

        Ok(())
    }

    #[test]
    fn unresolvable_calls_produce_unknown_and_strong() -> anyhow::Result<()> {
        let mut vm = empty_vm();
        let mut state = MethodState::new(1);
        state.assign_register(0, HeapItem::unknown("I"))?;
        let mut node = ExecutionNode::new(0, ExecutionContext::new(state));

        let instruction = Instruction::Invoke {
            kind: InvokeKind::Static,
            method: MethodSignature::parse("Lcom/elsewhere/C;->f(I)I")?,
            arguments: vec![0],
            range: false,
        };
        invoke::execute(&mut vm, &instruction, &mut node, 0)?;

        let result = node.context().method_state().result_snapshot().unwrap();
        assert!(result.is_unknown());
        assert_eq!(node.side_effect_level(), Level::Strong);

        Ok(())
    }

    #[test]
    fn null_receivers_raise_before_resolution() -> anyhow::Result<()> {
        let mut vm = empty_vm();
        let mut state = MethodState::new(1);
        state.assign_register(
            0,
            HeapItem::new(Value::Concrete(ConcreteValue::Null), "Ljava/lang/String;"),
        )?;
        let mut node = ExecutionNode::new(0, ExecutionContext::new(state));
        node.set_child_locations(vec![1]);

        let instruction = Instruction::Invoke {
            kind: InvokeKind::Virtual,
            method: MethodSignature::parse("Ljava/lang/String;->length()I")?,
            arguments: vec![0],
            range: false,
        };
        invoke::execute(&mut vm, &instruction, &mut node, 0)?;

        assert_eq!(node.exception().unwrap().kind, NULL_POINTER_EXCEPTION);
        assert!(node.child_locations().is_empty());

        Ok(())
    }
}
