//! This module contains the abstract interpretation of each Dalvik opcode
//! family.
//!
//! # Capability Shapes
//!
//! Every family is one of three shapes, expressed through what the handler
//! actually touches rather than through a type hierarchy:
//!
//! - **Method-state handlers** read and write registers only (`arithmetic`,
//!   `moves`, most of `control`).
//! - **Execution-context handlers** additionally read or write class state,
//!   which may trigger lazy `<clinit>` execution (`field`, `new-instance` in
//!   `object`).
//! - **Invoke handlers** may recurse into the driver (`invoke`).
//!
//! The single [`execute`] dispatch pattern-matches the instruction and passes
//! each family exactly the capabilities it needs.
//!
//! # Exceptions
//!
//! A handler that determines its instruction can only raise attaches a
//! [`crate::vm::value::VirtualException`] to the node and clears the node's
//! children; the driver then routes the exception to a covering catch handler
//! if one exists. A handler that completes normally clears any previously
//! attached exception instead.

pub mod arithmetic;
pub mod control;
pub mod field;
pub mod invoke;
pub mod moves;
pub mod object;

use crate::{
    error::{container::Locatable, execution, execution::Error},
    smali::{instruction::Instruction, method::DexMethod},
    vm::{node::ExecutionNode, VirtualMachine},
};

/// Executes the instruction at `node`'s location, updating the node's
/// context, exception, children, and side-effect level.
///
/// On entry the node's declared children are seeded with the instruction's
/// static successors, in fall-through-first order; handlers narrow or clear
/// them as the abstract state dictates.
///
/// # Errors
///
/// Returns [`Err`] if a resource bound is breached during a recursive invoke,
/// or if the instruction's operands do not fit the frame (a malformed
/// method).
pub fn execute(
    vm: &mut VirtualMachine,
    method: &DexMethod,
    node: &mut ExecutionNode,
    depth: usize,
) -> execution::Result<()> {
    let location = node.location();
    let instruction = method
        .instructions
        .get(location)
        .ok_or(Error::AddressOutOfBounds {
            requested: location,
            available: method.instructions.len(),
        })
        .locate(location as u32)?;

    node.set_child_locations(instruction.successors(location));

    match instruction {
        Instruction::Nop => Ok(()),
        Instruction::Move { .. }
        | Instruction::MoveResult { .. }
        | Instruction::MoveException { .. }
        | Instruction::Const { .. } => moves::execute(instruction, node),
        Instruction::ReturnVoid
        | Instruction::Return { .. }
        | Instruction::Goto { .. }
        | Instruction::IfTest { .. }
        | Instruction::IfTestZ { .. }
        | Instruction::PackedSwitch { .. }
        | Instruction::SparseSwitch { .. }
        | Instruction::Throw { .. }
        | Instruction::MonitorEnter { .. }
        | Instruction::MonitorExit { .. } => control::execute(instruction, node),
        Instruction::Compare { .. }
        | Instruction::Unary { .. }
        | Instruction::Binary { .. }
        | Instruction::BinaryLiteral { .. } => arithmetic::execute(instruction, node),
        Instruction::CheckCast { .. }
        | Instruction::InstanceOf { .. }
        | Instruction::ArrayLength { .. }
        | Instruction::NewInstance { .. }
        | Instruction::NewArray { .. }
        | Instruction::FilledNewArray { .. }
        | Instruction::FillArrayData { .. }
        | Instruction::ArrayGet { .. }
        | Instruction::ArrayPut { .. } => object::execute(vm, instruction, node, depth),
        Instruction::InstanceGet { .. }
        | Instruction::InstancePut { .. }
        | Instruction::StaticGet { .. }
        | Instruction::StaticPut { .. } => field::execute(vm, instruction, node, depth),
        Instruction::Invoke { .. } => invoke::execute(vm, instruction, node, depth),
    }
}
