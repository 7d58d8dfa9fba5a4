//! Handlers for the `const*`, `move*`, `move-result*`, and `move-exception`
//! families. All of them are pure method-state transformers.

use crate::{
    error::execution,
    smali::instruction::{ConstLiteral, Instruction, MoveKind},
    vm::{
        node::ExecutionNode,
        value::{ConcreteValue, HeapItem, Value},
    },
};

/// Executes one of the move or constant families on `node`.
///
/// # Errors
///
/// Returns [`Err`] if a named register is out of range for the frame.
pub fn execute(instruction: &Instruction, node: &mut ExecutionNode) -> execution::Result<()> {
    let state = node.context_mut().method_state_mut();

    match instruction {
        Instruction::Const { dest, literal } => match literal {
            ConstLiteral::Narrow(value) => {
                let item = HeapItem::new(Value::Concrete(ConcreteValue::Int(*value)), "I");
                state.assign_register(*dest, item)
            }
            ConstLiteral::Wide(value) => {
                let item = HeapItem::new(Value::Concrete(ConcreteValue::Long(*value)), "J");
                state.assign_register_wide(*dest, item)
            }
            ConstLiteral::String(value) => {
                let item = HeapItem::new(
                    Value::Concrete(ConcreteValue::String(value.clone())),
                    "Ljava/lang/String;",
                );
                state.assign_register(*dest, item)
            }
            ConstLiteral::Class(value) => {
                let item = HeapItem::new(
                    Value::Concrete(ConcreteValue::Class(value.clone())),
                    "Ljava/lang/Class;",
                );
                state.assign_register(*dest, item)
            }
        },
        Instruction::Move { dest, src, kind } => {
            let item = state.read_register(*src)?;
            match kind {
                MoveKind::Wide => state.assign_register_wide(*dest, item),
                _ => state.assign_register(*dest, item),
            }
        }
        Instruction::MoveResult { dest, kind } => {
            // A move-result with no pending invoke result is tolerated with
            // an unknown, as obfuscators are known to emit such sequences.
            let item = state.take_result().unwrap_or_else(HeapItem::untyped_unknown);
            match kind {
                MoveKind::Wide => state.assign_register_wide(*dest, item),
                _ => state.assign_register(*dest, item),
            }
        }
        Instruction::MoveException { dest } => {
            let item = state
                .exception_item()
                .cloned()
                .unwrap_or_else(|| HeapItem::unknown("Ljava/lang/Throwable;"));
            state.assign_register(*dest, item)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use crate::{
        opcode::moves,
        smali::instruction::{ConstLiteral, Instruction, MoveKind},
        vm::{
            context::ExecutionContext,
            method_state::MethodState,
            node::ExecutionNode,
            value::{ConcreteValue, HeapItem, Value},
        },
    };

    fn node_with_registers(count: usize) -> ExecutionNode {
        ExecutionNode::new(0, ExecutionContext::new(MethodState::new(count)))
    }

    #[test]
    fn const_narrow_assigns_an_int() -> anyhow::Result<()> {
        let mut node = node_with_registers(1);
        let instruction = Instruction::Const {
            dest: 0,
            literal: ConstLiteral::Narrow(7),
        };

        moves::execute(&instruction, &mut node)?;

        let item = node.context().method_state().peek_register(0)?;
        assert_eq!(item, HeapItem::new(Value::Concrete(ConcreteValue::Int(7)), "I"));

        Ok(())
    }

    #[test]
    fn const_wide_fills_the_register_pair() -> anyhow::Result<()> {
        let mut node = node_with_registers(2);
        let instruction = Instruction::Const {
            dest: 0,
            literal: ConstLiteral::Wide(1 << 40),
        };

        moves::execute(&instruction, &mut node)?;

        let state = node.context().method_state();
        assert!(state.peek_register(0)?.is_concrete());
        assert_eq!(state.peek_register(0)?, state.peek_register(1)?);

        Ok(())
    }

    #[test]
    fn move_copies_the_source_register() -> anyhow::Result<()> {
        let mut node = node_with_registers(2);
        node.context_mut()
            .method_state_mut()
            .assign_register(1, HeapItem::new(Value::Concrete(ConcreteValue::Int(3)), "I"))?;

        let instruction = Instruction::Move {
            dest: 0,
            src: 1,
            kind: MoveKind::Narrow,
        };
        moves::execute(&instruction, &mut node)?;

        let item = node.context().method_state().peek_register(0)?;
        assert_eq!(item.value, Value::Concrete(ConcreteValue::Int(3)));

        Ok(())
    }

    #[test]
    fn move_result_consumes_the_pending_result() -> anyhow::Result<()> {
        let mut node = node_with_registers(1);
        node.context_mut()
            .method_state_mut()
            .set_result(HeapItem::new(Value::Concrete(ConcreteValue::Int(3)), "I"));

        let instruction = Instruction::MoveResult {
            dest: 0,
            kind: MoveKind::Narrow,
        };
        moves::execute(&instruction, &mut node)?;

        let state = node.context().method_state();
        assert_eq!(
            state.peek_register(0)?.value,
            Value::Concrete(ConcreteValue::Int(3))
        );
        assert!(state.result_snapshot().is_none());

        Ok(())
    }
}
