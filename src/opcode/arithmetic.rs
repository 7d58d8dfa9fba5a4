//! Handlers for the binary, binary-literal, unary, and comparison arithmetic
//! families. All of them are pure method-state transformers.
//!
//! Semantics follow the Dalvik definition exactly: 32- and 64-bit
//! two's-complement wraparound, shift distances masked to 5 bits (`int`) or 6
//! bits (`long`), logical `ushr`, IEEE 754 floating point with no virtual
//! exceptions, and `ArithmeticException` on integral division by zero.

use std::cmp::Ordering;

use crate::{
    error::{container::Locatable, execution, execution::Error},
    smali::instruction::{
        CompareKind,
        Instruction,
        MathOperator,
        OperandType,
        UnaryOperation,
        ARITHMETIC_EXCEPTION,
    },
    vm::{
        node::ExecutionNode,
        value::{ConcreteValue, HeapItem, Value, VirtualException},
    },
};

/// The detail message the runtime produces for integral division by zero.
const DIVIDE_BY_ZERO_MESSAGE: &str = "/ by zero";

/// Executes one of the arithmetic families on `node`.
///
/// # Errors
///
/// Returns [`Err`] if a named register is out of range for the frame, or if
/// a binary operation receives concrete operands that do not fit its operand
/// type (a malformed method).
pub fn execute(instruction: &Instruction, node: &mut ExecutionNode) -> execution::Result<()> {
    match instruction {
        Instruction::Binary {
            dest,
            lhs,
            rhs,
            operator,
            operand,
        } => {
            let lhs_item = node.context_mut().method_state_mut().read_register(*lhs)?;
            let rhs_item = node.context_mut().method_state_mut().read_register(*rhs)?;
            binary(
                node,
                instruction.mnemonic(),
                *dest,
                &lhs_item,
                &rhs_item,
                *operator,
                *operand,
            )
        }
        Instruction::BinaryLiteral {
            dest,
            lhs,
            literal,
            operator,
        } => {
            let lhs_item = node.context_mut().method_state_mut().read_register(*lhs)?;
            let rhs_item = HeapItem::new(Value::Concrete(ConcreteValue::Int(*literal)), "I");
            binary(
                node,
                instruction.mnemonic(),
                *dest,
                &lhs_item,
                &rhs_item,
                *operator,
                OperandType::Int,
            )
        }
        Instruction::Unary {
            dest,
            src,
            operation,
        } => {
            let item = node.context_mut().method_state_mut().read_register(*src)?;
            let result = match item.value.concrete() {
                Some(value) => unary(value, *operation)
                    .map_or(Value::Unknown, Value::Concrete),
                None => Value::Unknown,
            };
            let result_item = HeapItem::new(result, operation.result_descriptor());
            let state = node.context_mut().method_state_mut();
            if operation.writes_wide() {
                state.assign_register_wide(*dest, result_item)
            } else {
                state.assign_register(*dest, result_item)
            }
        }
        Instruction::Compare {
            dest,
            lhs,
            rhs,
            kind,
        } => {
            let lhs_item = node.context_mut().method_state_mut().read_register(*lhs)?;
            let rhs_item = node.context_mut().method_state_mut().read_register(*rhs)?;
            let result = match (lhs_item.value.concrete(), rhs_item.value.concrete()) {
                (Some(a), Some(b)) => {
                    compare(a, b, *kind).map_or(Value::Unknown, |c| Value::Concrete(ConcreteValue::Int(c)))
                }
                _ => Value::Unknown,
            };
            node.context_mut()
                .method_state_mut()
                .assign_register(*dest, HeapItem::new(result, "I"))
        }
        _ => Ok(()),
    }
}

/// Executes a binary operation, handling division by zero and unknown
/// operands, and assigns the result.
///
/// # Errors
///
/// Returns [`Err`] if the concrete operands do not fit the operand type's
/// shape, which only a malformed method can produce.
fn binary(
    node: &mut ExecutionNode,
    mnemonic: String,
    dest: u16,
    lhs: &HeapItem,
    rhs: &HeapItem,
    operator: MathOperator,
    operand: OperandType,
) -> execution::Result<()> {
    let result = match (lhs.value.concrete(), rhs.value.concrete()) {
        (Some(a), Some(b)) => match compute(a, b, operator, operand) {
            Ok(Some(value)) => Value::Concrete(value),
            Ok(None) => {
                return Err(Error::MalformedInstruction {
                    mnemonic,
                    reason: format!(
                        "{} and {} cannot be {} operands",
                        lhs.value,
                        rhs.value,
                        operand.descriptor()
                    ),
                })
                .locate(node.location() as u32);
            }
            Err(exception) => {
                node.set_exception(exception);
                node.clear_children();
                return Ok(());
            }
        },
        _ => Value::Unknown,
    };

    node.clear_exception();
    let item = HeapItem::new(result, operand.descriptor());
    let state = node.context_mut().method_state_mut();
    if operand.is_wide() {
        state.assign_register_wide(dest, item)
    } else {
        state.assign_register(dest, item)
    }
}

/// Computes a binary operation over concrete operands with exact Dalvik
/// semantics.
///
/// Returns `Ok(None)` when the operands do not have a shape the operand type
/// can compute with, which only occurs for unverifiable bytecode.
fn compute(
    lhs: &ConcreteValue,
    rhs: &ConcreteValue,
    operator: MathOperator,
    operand: OperandType,
) -> Result<Option<ConcreteValue>, VirtualException> {
    let divide_by_zero =
        || VirtualException::new(ARITHMETIC_EXCEPTION, DIVIDE_BY_ZERO_MESSAGE);

    match operand {
        OperandType::Int => {
            let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) else {
                return Ok(None);
            };
            let result = match operator {
                MathOperator::Add => a.wrapping_add(b),
                MathOperator::Sub => a.wrapping_sub(b),
                MathOperator::Mul => a.wrapping_mul(b),
                MathOperator::Div => {
                    if b == 0 {
                        return Err(divide_by_zero());
                    }
                    a.wrapping_div(b)
                }
                MathOperator::Rem => {
                    if b == 0 {
                        return Err(divide_by_zero());
                    }
                    a.wrapping_rem(b)
                }
                MathOperator::And => a & b,
                MathOperator::Or => a | b,
                MathOperator::Xor => a ^ b,
                MathOperator::Shl => a.wrapping_shl(b as u32 & 0x1f),
                MathOperator::Shr => a.wrapping_shr(b as u32 & 0x1f),
                MathOperator::Ushr => ((a as u32) >> (b as u32 & 0x1f)) as i32,
                MathOperator::Rsub => b.wrapping_sub(a),
            };
            Ok(Some(ConcreteValue::Int(result)))
        }
        OperandType::Long => {
            let (Some(a), Some(b)) = (lhs.as_long(), rhs.as_long()) else {
                return Ok(None);
            };
            let result = match operator {
                MathOperator::Add => a.wrapping_add(b),
                MathOperator::Sub => a.wrapping_sub(b),
                MathOperator::Mul => a.wrapping_mul(b),
                MathOperator::Div => {
                    if b == 0 {
                        return Err(divide_by_zero());
                    }
                    a.wrapping_div(b)
                }
                MathOperator::Rem => {
                    if b == 0 {
                        return Err(divide_by_zero());
                    }
                    a.wrapping_rem(b)
                }
                MathOperator::And => a & b,
                MathOperator::Or => a | b,
                MathOperator::Xor => a ^ b,
                MathOperator::Shl => a.wrapping_shl(b as u32 & 0x3f),
                MathOperator::Shr => a.wrapping_shr(b as u32 & 0x3f),
                MathOperator::Ushr => ((a as u64) >> (b as u64 & 0x3f)) as i64,
                MathOperator::Rsub => b.wrapping_sub(a),
            };
            Ok(Some(ConcreteValue::Long(result)))
        }
        OperandType::Float => {
            let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) else {
                return Ok(None);
            };
            let result = match operator {
                MathOperator::Add => a + b,
                MathOperator::Sub => a - b,
                MathOperator::Mul => a * b,
                MathOperator::Div => a / b,
                MathOperator::Rem => a % b,
                MathOperator::Rsub => b - a,
                // The bitwise and shift operators do not exist for floats.
                _ => return Ok(None),
            };
            Ok(Some(ConcreteValue::Float(result)))
        }
        OperandType::Double => {
            let (Some(a), Some(b)) = (lhs.as_double(), rhs.as_double()) else {
                return Ok(None);
            };
            let result = match operator {
                MathOperator::Add => a + b,
                MathOperator::Sub => a - b,
                MathOperator::Mul => a * b,
                MathOperator::Div => a / b,
                MathOperator::Rem => a % b,
                MathOperator::Rsub => b - a,
                _ => return Ok(None),
            };
            Ok(Some(ConcreteValue::Double(result)))
        }
    }
}

/// Computes a unary operation over a concrete operand with exact Dalvik
/// semantics, including Java's saturating float-to-integral conversions.
fn unary(value: &ConcreteValue, operation: UnaryOperation) -> Option<ConcreteValue> {
    use UnaryOperation as Op;

    let result = match operation {
        Op::NegInt => ConcreteValue::Int(value.as_int()?.wrapping_neg()),
        Op::NotInt => ConcreteValue::Int(!value.as_int()?),
        Op::NegLong => ConcreteValue::Long(value.as_long()?.wrapping_neg()),
        Op::NotLong => ConcreteValue::Long(!value.as_long()?),
        Op::NegFloat => ConcreteValue::Float(-value.as_float()?),
        Op::NegDouble => ConcreteValue::Double(-value.as_double()?),
        Op::IntToLong => ConcreteValue::Long(i64::from(numeric_int(value)?)),
        Op::IntToFloat => ConcreteValue::Float(numeric_int(value)? as f32),
        Op::IntToDouble => ConcreteValue::Double(f64::from(numeric_int(value)?)),
        Op::LongToInt => ConcreteValue::Int(value.as_long()? as i32),
        Op::LongToFloat => ConcreteValue::Float(value.as_long()? as f32),
        Op::LongToDouble => ConcreteValue::Double(value.as_long()? as f64),
        Op::FloatToInt => ConcreteValue::Int(value.as_float()? as i32),
        Op::FloatToLong => ConcreteValue::Long(value.as_float()? as i64),
        Op::FloatToDouble => ConcreteValue::Double(f64::from(value.as_float()?)),
        Op::DoubleToInt => ConcreteValue::Int(value.as_double()? as i32),
        Op::DoubleToLong => ConcreteValue::Long(value.as_double()? as i64),
        Op::DoubleToFloat => ConcreteValue::Float(value.as_double()? as f32),
        Op::IntToByte => ConcreteValue::Int(i32::from(numeric_int(value)? as i8)),
        Op::IntToChar => ConcreteValue::Int(i32::from(numeric_int(value)? as u16)),
        Op::IntToShort => ConcreteValue::Int(i32::from(numeric_int(value)? as i16)),
    };

    Some(result)
}

/// Views a value as a numeric `int` for the conversion operations, which
/// unlike the bit views must not reinterpret float bits.
fn numeric_int(value: &ConcreteValue) -> Option<i32> {
    match value {
        ConcreteValue::Int(v) => Some(*v),
        _ => None,
    }
}

/// Computes a three-way comparison with the NaN bias of the `cmp` family.
fn compare(lhs: &ConcreteValue, rhs: &ConcreteValue, kind: CompareKind) -> Option<i32> {
    let from_ordering = |ordering: Ordering| match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };

    match kind {
        CompareKind::Long => Some(from_ordering(lhs.as_long()?.cmp(&rhs.as_long()?))),
        CompareKind::FloatBiasLess | CompareKind::FloatBiasGreater => {
            let (a, b) = (lhs.as_float()?, rhs.as_float()?);
            match a.partial_cmp(&b) {
                Some(ordering) => Some(from_ordering(ordering)),
                None => Some(if matches!(kind, CompareKind::FloatBiasLess) { -1 } else { 1 }),
            }
        }
        CompareKind::DoubleBiasLess | CompareKind::DoubleBiasGreater => {
            let (a, b) = (lhs.as_double()?, rhs.as_double()?);
            match a.partial_cmp(&b) {
                Some(ordering) => Some(from_ordering(ordering)),
                None => Some(if matches!(kind, CompareKind::DoubleBiasLess) { -1 } else { 1 }),
            }
        }
    }
}
