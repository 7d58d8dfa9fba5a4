//! Handlers for the allocation and array families, plus `check-cast` and
//! `instance-of`.
//!
//! `new-instance` is the context-aware member of this family: allocating an
//! instance of a local class triggers that class's lazy initialization, and
//! the handler's side-effect level becomes whatever the initializer's was.
//! `new-array`, by contrast, never triggers initialization.

use crate::{
    error::execution,
    smali::instruction::{
        Instruction,
        INDEX_OUT_OF_BOUNDS_EXCEPTION,
        NEGATIVE_ARRAY_SIZE_EXCEPTION,
        NULL_POINTER_EXCEPTION,
    },
    vm::{
        node::ExecutionNode,
        side_effect::Level,
        value::{ArrayValue, ConcreteValue, HeapItem, Value, VirtualException},
        VirtualMachine,
    },
};

/// Executes one of the object or array families on `node`.
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
        Instruction::NewInstance { dest, class } => {
            let level = if vm.is_local_class(class) {
                // New-instance causes static initialization (but new-array
                // does not); the access initializes the class if necessary.
                vm.ensure_class_initialized(node.context_mut(), class, depth)?;
                node.context()
                    .class_state(class)
                    .map_or(Level::Strong, |state| state.side_effect_level())
            } else if vm.configuration().is_safe_class(class) {
                Level::None
            } else {
                Level::Strong
            };
            node.set_side_effect_level(level);

            let item = HeapItem::new(
                Value::UninitializedInstance {
                    class: class.clone(),
                },
                class.clone(),
            );
            node.context_mut().method_state_mut().assign_register(*dest, item)
        }
        Instruction::NewArray {
            dest,
            size,
            descriptor,
        } => {
            let size_item = node.context_mut().method_state_mut().read_register(*size)?;
            let value = match size_item.value.concrete().and_then(ConcreteValue::as_int) {
                Some(length) if length < 0 => {
                    node.set_exception(VirtualException::new(
                        NEGATIVE_ARRAY_SIZE_EXCEPTION,
                        format!("length={length}"),
                    ));
                    node.clear_children();
                    return Ok(());
                }
                Some(length) => Value::Concrete(ConcreteValue::Array(ArrayValue::new(
                    element_descriptor(descriptor),
                    length as usize,
                ))),
                None => Value::Unknown,
            };
            node.clear_exception();
            node.context_mut()
                .method_state_mut()
                .assign_register(*dest, HeapItem::new(value, descriptor.clone()))
        }
        Instruction::FilledNewArray {
            arguments,
            descriptor,
        } => {
            let mut elements = Vec::with_capacity(arguments.len());
            for register in arguments {
                let item = node.context_mut().method_state_mut().read_register(*register)?;
                elements.push(item.value);
            }
            let array = ArrayValue::with_elements(element_descriptor(descriptor), elements);
            let item = HeapItem::new(
                Value::Concrete(ConcreteValue::Array(array)),
                descriptor.clone(),
            );
            node.context_mut().method_state_mut().set_result(item);
            Ok(())
        }
        Instruction::FillArrayData { array, values } => {
            let item = node.context_mut().method_state_mut().read_register(*array)?;
            match &item.value {
                Value::Concrete(ConcreteValue::Array(contents)) => {
                    let element = contents.element_descriptor();
                    for (index, raw) in values.iter().enumerate() {
                        if !contents.set(index, element_from_raw(*raw, &element)) {
                            break;
                        }
                    }
                    node.set_side_effect_level(Level::Weak);
                    Ok(())
                }
                Value::Concrete(value) if value.is_null() => {
                    node.set_exception(VirtualException::new(
                        NULL_POINTER_EXCEPTION,
                        "fill-array-data on a null array",
                    ));
                    node.clear_children();
                    Ok(())
                }
                // An unknown array absorbs the data without a trace.
                _ => Ok(()),
            }
        }
        Instruction::ArrayLength { dest, array } => {
            let item = node.context_mut().method_state_mut().read_register(*array)?;
            let value = match &item.value {
                Value::Concrete(ConcreteValue::Array(contents)) => {
                    Value::Concrete(ConcreteValue::Int(contents.len() as i32))
                }
                Value::Concrete(value) if value.is_null() => {
                    node.set_exception(VirtualException::new(
                        NULL_POINTER_EXCEPTION,
                        "array-length on a null array",
                    ));
                    node.clear_children();
                    return Ok(());
                }
                _ => Value::Unknown,
            };
            node.clear_exception();
            node.context_mut()
                .method_state_mut()
                .assign_register(*dest, HeapItem::new(value, "I"))
        }
        Instruction::ArrayGet {
            dest,
            array,
            index,
            kind,
        } => {
            let array_item = node.context_mut().method_state_mut().read_register(*array)?;
            let index_item = node.context_mut().method_state_mut().read_register(*index)?;

            let element_type = element_descriptor_of_item(&array_item);
            let value = match (&array_item.value, index_item.value.concrete().and_then(ConcreteValue::as_int)) {
                (Value::Concrete(value), _) if value.is_null() => {
                    node.set_exception(VirtualException::new(
                        NULL_POINTER_EXCEPTION,
                        "array read on a null array",
                    ));
                    node.clear_children();
                    return Ok(());
                }
                (Value::Concrete(ConcreteValue::Array(contents)), Some(at)) => {
                    match usize::try_from(at).ok().and_then(|at| contents.get(at)) {
                        Some(element) => element,
                        None => {
                            node.set_exception(VirtualException::new(
                                INDEX_OUT_OF_BOUNDS_EXCEPTION,
                                format!("length={}; index={at}", contents.len()),
                            ));
                            node.clear_children();
                            return Ok(());
                        }
                    }
                }
                _ => Value::Unknown,
            };

            node.clear_exception();
            let item = HeapItem::new(value, element_type);
            let state = node.context_mut().method_state_mut();
            if kind.is_wide() {
                state.assign_register_wide(*dest, item)
            } else {
                state.assign_register(*dest, item)
            }
        }
        Instruction::ArrayPut {
            src,
            array,
            index,
            kind: _,
        } => {
            let array_item = node.context_mut().method_state_mut().read_register(*array)?;
            let index_item = node.context_mut().method_state_mut().read_register(*index)?;
            let src_item = node.context_mut().method_state_mut().read_register(*src)?;

            match (&array_item.value, index_item.value.concrete().and_then(ConcreteValue::as_int)) {
                (Value::Concrete(value), _) if value.is_null() => {
                    node.set_exception(VirtualException::new(
                        NULL_POINTER_EXCEPTION,
                        "array write on a null array",
                    ));
                    node.clear_children();
                    return Ok(());
                }
                (Value::Concrete(ConcreteValue::Array(contents)), Some(at)) => {
                    let stored = usize::try_from(at)
                        .ok()
                        .is_some_and(|at| contents.set(at, src_item.value.clone()));
                    if !stored {
                        node.set_exception(VirtualException::new(
                            INDEX_OUT_OF_BOUNDS_EXCEPTION,
                            format!("length={}; index={at}", contents.len()),
                        ));
                        node.clear_children();
                        return Ok(());
                    }
                }
                (Value::Concrete(ConcreteValue::Array(contents)), None) => {
                    // A write at an unknown index could land anywhere; every
                    // element becomes unknown.
                    for index in 0..contents.len() {
                        contents.set(index, Value::Unknown);
                    }
                }
                _ => {}
            }

            node.clear_exception();
            node.set_side_effect_level(Level::Weak);
            Ok(())
        }
        Instruction::CheckCast { object, class } => {
            let item = node.context_mut().method_state_mut().read_register(*object)?;
            // Without a class hierarchy the cast cannot be refuted, so it is
            // assumed to succeed and the declared type narrows.
            node.clear_exception();
            node.context_mut()
                .method_state_mut()
                .assign_register(*object, HeapItem::new(item.value, class.clone()))
        }
        Instruction::InstanceOf {
            dest,
            object,
            class,
        } => {
            let item = node.context_mut().method_state_mut().read_register(*object)?;
            let value = match &item.value {
                Value::Concrete(value) if value.is_null() => {
                    Value::Concrete(ConcreteValue::Int(0))
                }
                _ if item.declared_type == *class => Value::Concrete(ConcreteValue::Int(1)),
                _ => Value::Unknown,
            };
            node.context_mut()
                .method_state_mut()
                .assign_register(*dest, HeapItem::new(value, "Z"))
        }
        _ => Ok(()),
    }
}

/// Gets the element descriptor of an array type descriptor.
fn element_descriptor(array_descriptor: &str) -> String {
    array_descriptor
        .strip_prefix('[')
        .unwrap_or(crate::constant::UNKNOWN_TYPE_DESCRIPTOR)
        .to_string()
}

/// Gets the element descriptor for the array held by `item`, preferring the
/// live array's own element type over the declared one.
fn element_descriptor_of_item(item: &HeapItem) -> String {
    match &item.value {
        Value::Concrete(ConcreteValue::Array(contents)) => contents.element_descriptor(),
        _ if item.declared_type.starts_with('[') => element_descriptor(&item.declared_type),
        _ => crate::constant::UNKNOWN_TYPE_DESCRIPTOR.to_string(),
    }
}

/// Converts one raw literal from a `fill-array-data` payload into an element
/// value of the described type.
fn element_from_raw(raw: i64, element_descriptor: &str) -> Value {
    let value = match element_descriptor {
        "J" => ConcreteValue::Long(raw),
        "D" => ConcreteValue::Double(f64::from_bits(raw as u64)),
        "F" => ConcreteValue::Float(f32::from_bits(raw as u32)),
        _ => ConcreteValue::Int(raw as i32),
    };
    Value::Concrete(value)
}
