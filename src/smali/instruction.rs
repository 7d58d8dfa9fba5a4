//! This module contains the instruction sum type that represents Dalvik
//! bytecode inside the engine.
//!
//! # Families, Not Formats
//!
//! Dalvik encodes many of its operations several times over in differently
//! sized formats (`move`, `move/from16`, `move/16`, the `/2addr` and
//! `/lit8`/`/lit16` arithmetic forms, the `/range` invokes). The engine does
//! not care about encoding width, so each family is a single variant here and
//! the ingestion layer collapses format suffixes into it. Rendering via
//! [`Instruction::mnemonic`] reconstructs a representative mnemonic.
//!
//! # Addresses
//!
//! Branch targets are indices into the owning method's instruction sequence,
//! not byte offsets. The optimizer's compaction step remaps them whenever
//! instructions are removed.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::smali::method::MethodSignature;

/// The descriptor of the exception raised by integer division by zero.
pub const ARITHMETIC_EXCEPTION: &str = "Ljava/lang/ArithmeticException;";

/// The descriptor of the exception raised by dereferencing null.
pub const NULL_POINTER_EXCEPTION: &str = "Ljava/lang/NullPointerException;";

/// The descriptor of the exception raised by an out-of-bounds array access.
pub const INDEX_OUT_OF_BOUNDS_EXCEPTION: &str = "Ljava/lang/ArrayIndexOutOfBoundsException;";

/// The descriptor of the exception raised by a failed cast.
pub const CLASS_CAST_EXCEPTION: &str = "Ljava/lang/ClassCastException;";

/// The descriptor of the exception raised by a negative array size.
pub const NEGATIVE_ARRAY_SIZE_EXCEPTION: &str = "Ljava/lang/NegativeArraySizeException;";

/// A reference to a field, as carried by the field-access instructions.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct FieldRef {
    /// The descriptor of the class that declares the field.
    pub class: String,

    /// The name of the field.
    pub name: String,

    /// The type descriptor of the field.
    pub descriptor: String,
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}->{}:{}", self.class, self.name, self.descriptor)
    }
}

/// The width class of a `move`, `move-result`, or `return` instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MoveKind {
    Narrow,
    Wide,
    Object,
}

impl MoveKind {
    /// Gets the mnemonic suffix for this width class.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Narrow => "",
            Self::Wide => "-wide",
            Self::Object => "-object",
        }
    }
}

/// The element class of an array or field access instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AccessKind {
    Narrow,
    Wide,
    Object,
    Boolean,
    Byte,
    Char,
    Short,
}

impl AccessKind {
    /// Gets the mnemonic suffix for this element class.
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Narrow => "",
            Self::Wide => "-wide",
            Self::Object => "-object",
            Self::Boolean => "-boolean",
            Self::Byte => "-byte",
            Self::Char => "-char",
            Self::Short => "-short",
        }
    }

    /// Checks whether values of this element class occupy a register pair.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Wide)
    }
}

/// The literal carried by a `const*` instruction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConstLiteral {
    /// A 32-bit literal, as placed by `const/4` through `const/high16`. The
    /// bits may equally represent an `int`, a `float`, or a null reference;
    /// consumers reinterpret as needed.
    Narrow(i32),

    /// A 64-bit literal, as placed by the `const-wide` family.
    Wide(i64),

    /// A string constant, as placed by `const-string`.
    String(String),

    /// A class constant, as placed by `const-class`.
    Class(String),
}

/// The comparison performed by a `cmp` family instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompareKind {
    /// `cmp-long`.
    Long,

    /// `cmpl-float`: NaN compares as less.
    FloatBiasLess,

    /// `cmpg-float`: NaN compares as greater.
    FloatBiasGreater,

    /// `cmpl-double`: NaN compares as less.
    DoubleBiasLess,

    /// `cmpg-double`: NaN compares as greater.
    DoubleBiasGreater,
}

impl CompareKind {
    /// Gets the full mnemonic of the comparison.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Long => "cmp-long",
            Self::FloatBiasLess => "cmpl-float",
            Self::FloatBiasGreater => "cmpg-float",
            Self::DoubleBiasLess => "cmpl-double",
            Self::DoubleBiasGreater => "cmpg-double",
        }
    }
}

/// The relation tested by an `if-test` or `if-testz` instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IfComparison {
    Equal,
    NotEqual,
    Less,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
}

impl IfComparison {
    /// Gets the mnemonic fragment for this relation.
    #[must_use]
    pub fn fragment(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::Less => "lt",
            Self::GreaterOrEqual => "ge",
            Self::Greater => "gt",
            Self::LessOrEqual => "le",
        }
    }

    /// Applies the relation to an already-computed three-way ordering, where
    /// `ordering` is negative, zero, or positive.
    #[must_use]
    pub fn applies_to(self, ordering: i32) -> bool {
        match self {
            Self::Equal => ordering == 0,
            Self::NotEqual => ordering != 0,
            Self::Less => ordering < 0,
            Self::GreaterOrEqual => ordering >= 0,
            Self::Greater => ordering > 0,
            Self::LessOrEqual => ordering <= 0,
        }
    }
}

/// The resolution strategy of an `invoke` instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    /// Gets the mnemonic fragment for this resolution strategy.
    #[must_use]
    pub fn fragment(self) -> &'static str {
        match self {
            Self::Virtual => "virtual",
            Self::Super => "super",
            Self::Direct => "direct",
            Self::Static => "static",
            Self::Interface => "interface",
        }
    }

    /// Checks whether invokes of this kind pass a receiver in the first
    /// argument register.
    #[must_use]
    pub fn has_receiver(self) -> bool {
        !matches!(self, Self::Static)
    }
}

/// The operation performed by a unary-operation instruction: the negations,
/// the bitwise complements, and the fifteen primitive conversions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum UnaryOperation {
    NegInt,
    NotInt,
    NegLong,
    NotLong,
    NegFloat,
    NegDouble,
    IntToLong,
    IntToFloat,
    IntToDouble,
    LongToInt,
    LongToFloat,
    LongToDouble,
    FloatToInt,
    FloatToLong,
    FloatToDouble,
    DoubleToInt,
    DoubleToLong,
    DoubleToFloat,
    IntToByte,
    IntToChar,
    IntToShort,
}

impl UnaryOperation {
    /// Gets the full mnemonic of the operation.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::NegInt => "neg-int",
            Self::NotInt => "not-int",
            Self::NegLong => "neg-long",
            Self::NotLong => "not-long",
            Self::NegFloat => "neg-float",
            Self::NegDouble => "neg-double",
            Self::IntToLong => "int-to-long",
            Self::IntToFloat => "int-to-float",
            Self::IntToDouble => "int-to-double",
            Self::LongToInt => "long-to-int",
            Self::LongToFloat => "long-to-float",
            Self::LongToDouble => "long-to-double",
            Self::FloatToInt => "float-to-int",
            Self::FloatToLong => "float-to-long",
            Self::FloatToDouble => "float-to-double",
            Self::DoubleToInt => "double-to-int",
            Self::DoubleToLong => "double-to-long",
            Self::DoubleToFloat => "double-to-float",
            Self::IntToByte => "int-to-byte",
            Self::IntToChar => "int-to-char",
            Self::IntToShort => "int-to-short",
        }
    }

    /// Checks whether the operation reads a register pair.
    #[must_use]
    pub fn reads_wide(self) -> bool {
        matches!(
            self,
            Self::NegLong
                | Self::NotLong
                | Self::NegDouble
                | Self::LongToInt
                | Self::LongToFloat
                | Self::LongToDouble
                | Self::DoubleToInt
                | Self::DoubleToLong
                | Self::DoubleToFloat
        )
    }

    /// Checks whether the operation writes a register pair.
    #[must_use]
    pub fn writes_wide(self) -> bool {
        matches!(
            self,
            Self::NegLong
                | Self::NotLong
                | Self::NegDouble
                | Self::IntToLong
                | Self::IntToDouble
                | Self::LongToDouble
                | Self::FloatToLong
                | Self::FloatToDouble
                | Self::DoubleToLong
        )
    }

    /// Gets the type descriptor of the value the operation produces.
    #[must_use]
    pub fn result_descriptor(self) -> &'static str {
        match self {
            Self::NegInt | Self::NotInt | Self::LongToInt | Self::FloatToInt | Self::DoubleToInt => "I",
            Self::NegLong | Self::NotLong | Self::IntToLong | Self::FloatToLong | Self::DoubleToLong => "J",
            Self::NegFloat | Self::LongToFloat | Self::IntToFloat | Self::DoubleToFloat => "F",
            Self::NegDouble | Self::IntToDouble | Self::LongToDouble | Self::FloatToDouble => "D",
            Self::IntToByte => "B",
            Self::IntToChar => "C",
            Self::IntToShort => "S",
        }
    }
}

/// The operator of a binary-operation instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MathOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
    /// Reverse subtraction, only available in literal form: computes
    /// `literal - register`.
    Rsub,
}

impl MathOperator {
    /// Gets the mnemonic prefix of the operator.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Ushr => "ushr",
            Self::Rsub => "rsub",
        }
    }

    /// Checks whether the operator can raise an arithmetic exception on
    /// integral operands.
    #[must_use]
    pub fn can_divide_by_zero(self) -> bool {
        matches!(self, Self::Div | Self::Rem)
    }
}

/// The operand type of a binary-operation instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OperandType {
    Int,
    Long,
    Float,
    Double,
}

impl OperandType {
    /// Gets the mnemonic fragment of the operand type.
    #[must_use]
    pub fn fragment(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Gets the type descriptor of values of this operand type.
    #[must_use]
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::Int => "I",
            Self::Long => "J",
            Self::Float => "F",
            Self::Double => "D",
        }
    }

    /// Checks whether values of this operand type occupy a register pair.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, Self::Long | Self::Double)
    }
}

/// A single Dalvik instruction, with format suffixes collapsed into their
/// family (see the module documentation).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    Nop,
    Move {
        dest: u16,
        src: u16,
        kind: MoveKind,
    },
    MoveResult {
        dest: u16,
        kind: MoveKind,
    },
    MoveException {
        dest: u16,
    },
    ReturnVoid,
    Return {
        src: u16,
        kind: MoveKind,
    },
    Const {
        dest: u16,
        literal: ConstLiteral,
    },
    MonitorEnter {
        object: u16,
    },
    MonitorExit {
        object: u16,
    },
    CheckCast {
        object: u16,
        class: String,
    },
    InstanceOf {
        dest: u16,
        object: u16,
        class: String,
    },
    ArrayLength {
        dest: u16,
        array: u16,
    },
    NewInstance {
        dest: u16,
        class: String,
    },
    NewArray {
        dest: u16,
        size: u16,
        descriptor: String,
    },
    FilledNewArray {
        arguments: Vec<u16>,
        descriptor: String,
    },
    FillArrayData {
        array: u16,
        values: Vec<i64>,
    },
    Throw {
        exception: u16,
    },
    Goto {
        target: usize,
    },
    PackedSwitch {
        value: u16,
        first_key: i32,
        targets: Vec<usize>,
    },
    SparseSwitch {
        value: u16,
        keys: Vec<i32>,
        targets: Vec<usize>,
    },
    Compare {
        dest: u16,
        lhs: u16,
        rhs: u16,
        kind: CompareKind,
    },
    IfTest {
        lhs: u16,
        rhs: u16,
        comparison: IfComparison,
        target: usize,
    },
    IfTestZ {
        value: u16,
        comparison: IfComparison,
        target: usize,
    },
    ArrayGet {
        dest: u16,
        array: u16,
        index: u16,
        kind: AccessKind,
    },
    ArrayPut {
        src: u16,
        array: u16,
        index: u16,
        kind: AccessKind,
    },
    InstanceGet {
        dest: u16,
        object: u16,
        field: FieldRef,
        kind: AccessKind,
    },
    InstancePut {
        src: u16,
        object: u16,
        field: FieldRef,
        kind: AccessKind,
    },
    StaticGet {
        dest: u16,
        field: FieldRef,
        kind: AccessKind,
    },
    StaticPut {
        src: u16,
        field: FieldRef,
        kind: AccessKind,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodSignature,
        arguments: Vec<u16>,
        range: bool,
    },
    Unary {
        dest: u16,
        src: u16,
        operation: UnaryOperation,
    },
    Binary {
        dest: u16,
        lhs: u16,
        rhs: u16,
        operator: MathOperator,
        operand: OperandType,
    },
    BinaryLiteral {
        dest: u16,
        lhs: u16,
        literal: i32,
        operator: MathOperator,
    },
}

impl Instruction {
    /// Gets a representative Dalvik mnemonic for the instruction.
    #[must_use]
    pub fn mnemonic(&self) -> String {
        match self {
            Self::Nop => "nop".into(),
            Self::Move { kind, .. } => format!("move{}", kind.suffix()),
            Self::MoveResult { kind, .. } => format!("move-result{}", kind.suffix()),
            Self::MoveException { .. } => "move-exception".into(),
            Self::ReturnVoid => "return-void".into(),
            Self::Return { kind, .. } => format!("return{}", kind.suffix()),
            Self::Const { literal, .. } => match literal {
                ConstLiteral::Narrow(_) => "const".into(),
                ConstLiteral::Wide(_) => "const-wide".into(),
                ConstLiteral::String(_) => "const-string".into(),
                ConstLiteral::Class(_) => "const-class".into(),
            },
            Self::MonitorEnter { .. } => "monitor-enter".into(),
            Self::MonitorExit { .. } => "monitor-exit".into(),
            Self::CheckCast { .. } => "check-cast".into(),
            Self::InstanceOf { .. } => "instance-of".into(),
            Self::ArrayLength { .. } => "array-length".into(),
            Self::NewInstance { .. } => "new-instance".into(),
            Self::NewArray { .. } => "new-array".into(),
            Self::FilledNewArray { .. } => "filled-new-array".into(),
            Self::FillArrayData { .. } => "fill-array-data".into(),
            Self::Throw { .. } => "throw".into(),
            Self::Goto { .. } => "goto".into(),
            Self::PackedSwitch { .. } => "packed-switch".into(),
            Self::SparseSwitch { .. } => "sparse-switch".into(),
            Self::Compare { kind, .. } => kind.mnemonic().into(),
            Self::IfTest { comparison, .. } => format!("if-{}", comparison.fragment()),
            Self::IfTestZ { comparison, .. } => format!("if-{}z", comparison.fragment()),
            Self::ArrayGet { kind, .. } => format!("aget{}", kind.suffix()),
            Self::ArrayPut { kind, .. } => format!("aput{}", kind.suffix()),
            Self::InstanceGet { kind, .. } => format!("iget{}", kind.suffix()),
            Self::InstancePut { kind, .. } => format!("iput{}", kind.suffix()),
            Self::StaticGet { kind, .. } => format!("sget{}", kind.suffix()),
            Self::StaticPut { kind, .. } => format!("sput{}", kind.suffix()),
            Self::Invoke { kind, range, .. } => {
                let suffix = if *range { "/range" } else { "" };
                format!("invoke-{}{}", kind.fragment(), suffix)
            }
            Self::Unary { operation, .. } => operation.mnemonic().into(),
            Self::Binary {
                dest,
                lhs,
                operator,
                operand,
                ..
            } => {
                let suffix = if dest == lhs { "/2addr" } else { "" };
                format!("{}-{}{}", operator.prefix(), operand.fragment(), suffix)
            }
            Self::BinaryLiteral {
                literal, operator, ..
            } => {
                let suffix = if i8::try_from(*literal).is_ok() {
                    "/lit8"
                } else {
                    "/lit16"
                };
                format!("{}-int{}", operator.prefix(), suffix)
            }
        }
    }

    /// Gets the statically-known successor addresses of the instruction at
    /// `address`, in execution-priority order: fall-through first, then the
    /// explicit targets.
    #[must_use]
    pub fn successors(&self, address: usize) -> Vec<usize> {
        match self {
            Self::ReturnVoid | Self::Return { .. } | Self::Throw { .. } => vec![],
            Self::Goto { target } => vec![*target],
            Self::IfTest { target, .. } | Self::IfTestZ { target, .. } => {
                vec![address + 1, *target]
            }
            Self::PackedSwitch { targets, .. } | Self::SparseSwitch { targets, .. } => {
                let mut successors = vec![address + 1];
                successors.extend(targets.iter().copied());
                successors
            }
            _ => vec![address + 1],
        }
    }

    /// Gets the explicit branch targets of the instruction, not including the
    /// fall-through.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            Self::Goto { target }
            | Self::IfTest { target, .. }
            | Self::IfTestZ { target, .. } => vec![*target],
            Self::PackedSwitch { targets, .. } | Self::SparseSwitch { targets, .. } => {
                targets.clone()
            }
            _ => vec![],
        }
    }

    /// Checks whether execution never continues past the instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReturnVoid | Self::Return { .. } | Self::Throw { .. })
    }

    /// Gets the registers the instruction reads, with wide reads expanded to
    /// their register pair.
    #[must_use]
    pub fn registers_read(&self) -> Vec<u16> {
        match self {
            Self::Nop
            | Self::MoveResult { .. }
            | Self::MoveException { .. }
            | Self::ReturnVoid
            | Self::Const { .. }
            | Self::NewInstance { .. }
            | Self::Goto { .. }
            | Self::StaticGet { .. } => vec![],
            Self::Move { src, kind, .. } => widen(*src, matches!(kind, MoveKind::Wide)),
            Self::Return { src, kind } => widen(*src, matches!(kind, MoveKind::Wide)),
            Self::MonitorEnter { object } | Self::MonitorExit { object } => vec![*object],
            Self::CheckCast { object, .. } => vec![*object],
            Self::InstanceOf { object, .. } => vec![*object],
            Self::ArrayLength { array, .. } => vec![*array],
            Self::NewArray { size, .. } => vec![*size],
            Self::FilledNewArray { arguments, .. } => arguments.clone(),
            Self::FillArrayData { array, .. } => vec![*array],
            Self::Throw { exception } => vec![*exception],
            Self::PackedSwitch { value, .. } | Self::SparseSwitch { value, .. } => vec![*value],
            Self::Compare { lhs, rhs, kind, .. } => {
                let wide = !matches!(
                    kind,
                    CompareKind::FloatBiasLess | CompareKind::FloatBiasGreater
                );
                let mut read = widen(*lhs, wide);
                read.extend(widen(*rhs, wide));
                read
            }
            Self::IfTest { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::IfTestZ { value, .. } => vec![*value],
            Self::ArrayGet { array, index, .. } => vec![*array, *index],
            Self::ArrayPut {
                src, array, index, kind,
            } => {
                let mut read = widen(*src, kind.is_wide());
                read.push(*array);
                read.push(*index);
                read
            }
            Self::InstanceGet { object, .. } => vec![*object],
            Self::InstancePut { src, object, kind, .. } => {
                let mut read = widen(*src, kind.is_wide());
                read.push(*object);
                read
            }
            Self::StaticPut { src, kind, .. } => widen(*src, kind.is_wide()),
            Self::Invoke { arguments, .. } => arguments.clone(),
            Self::Unary { src, operation, .. } => widen(*src, operation.reads_wide()),
            Self::Binary {
                lhs,
                rhs,
                operator,
                operand,
                ..
            } => {
                // Shift distances are narrow even for wide operands.
                let shift = matches!(
                    operator,
                    MathOperator::Shl | MathOperator::Shr | MathOperator::Ushr
                );
                let mut read = widen(*lhs, operand.is_wide());
                read.extend(widen(*rhs, operand.is_wide() && !shift));
                read
            }
            Self::BinaryLiteral { lhs, .. } => vec![*lhs],
        }
    }

    /// Gets the register the instruction writes, if any, along with whether
    /// the write occupies a register pair.
    #[must_use]
    pub fn register_written(&self) -> Option<(u16, bool)> {
        match self {
            Self::Move { dest, kind, .. } => Some((*dest, matches!(kind, MoveKind::Wide))),
            Self::MoveResult { dest, kind } => Some((*dest, matches!(kind, MoveKind::Wide))),
            Self::MoveException { dest } => Some((*dest, false)),
            Self::Const { dest, literal } => {
                Some((*dest, matches!(literal, ConstLiteral::Wide(_))))
            }
            Self::InstanceOf { dest, .. }
            | Self::ArrayLength { dest, .. }
            | Self::NewInstance { dest, .. }
            | Self::NewArray { dest, .. } => Some((*dest, false)),
            Self::Compare { dest, .. } => Some((*dest, false)),
            Self::ArrayGet { dest, kind, .. }
            | Self::InstanceGet { dest, kind, .. }
            | Self::StaticGet { dest, kind, .. } => Some((*dest, kind.is_wide())),
            Self::Unary { dest, operation, .. } => Some((*dest, operation.writes_wide())),
            Self::Binary { dest, operand, .. } => Some((*dest, operand.is_wide())),
            Self::BinaryLiteral { dest, .. } => Some((*dest, false)),
            _ => None,
        }
    }

    /// Gets the descriptors of the virtual exception kinds the instruction
    /// may raise during execution.
    #[must_use]
    pub fn possible_exceptions(&self) -> Vec<&'static str> {
        match self {
            Self::Binary {
                operator, operand, ..
            } if operator.can_divide_by_zero() && !matches!(operand, OperandType::Float | OperandType::Double) => {
                vec![ARITHMETIC_EXCEPTION]
            }
            Self::BinaryLiteral { operator, .. } if operator.can_divide_by_zero() => {
                vec![ARITHMETIC_EXCEPTION]
            }
            Self::CheckCast { .. } => vec![NULL_POINTER_EXCEPTION, CLASS_CAST_EXCEPTION],
            Self::ArrayLength { .. }
            | Self::MonitorEnter { .. }
            | Self::MonitorExit { .. }
            | Self::FillArrayData { .. }
            | Self::InstanceGet { .. }
            | Self::InstancePut { .. }
            | Self::Throw { .. } => vec![NULL_POINTER_EXCEPTION],
            Self::ArrayGet { .. } | Self::ArrayPut { .. } => {
                vec![NULL_POINTER_EXCEPTION, INDEX_OUT_OF_BOUNDS_EXCEPTION]
            }
            Self::NewArray { .. } | Self::FilledNewArray { .. } => {
                vec![NEGATIVE_ARRAY_SIZE_EXCEPTION]
            }
            Self::Invoke { kind, .. } if kind.has_receiver() => vec![NULL_POINTER_EXCEPTION],
            _ => vec![],
        }
    }
}

/// Expands a register to its pair when `wide` is set.
fn widen(register: u16, wide: bool) -> Vec<u16> {
    if wide {
        vec![register, register + 1]
    } else {
        vec![register]
    }
}

/// Renders the instruction roughly the way a smali listing would.
impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Self::Nop | Self::ReturnVoid => write!(f, "{mnemonic}"),
            Self::Move { dest, src, .. } => write!(f, "{mnemonic} v{dest}, v{src}"),
            Self::MoveResult { dest, .. } | Self::MoveException { dest } => {
                write!(f, "{mnemonic} v{dest}")
            }
            Self::Return { src, .. } => write!(f, "{mnemonic} v{src}"),
            Self::Const { dest, literal } => match literal {
                ConstLiteral::Narrow(value) => write!(f, "{mnemonic} v{dest}, {value:#x}"),
                ConstLiteral::Wide(value) => write!(f, "{mnemonic} v{dest}, {value:#x}"),
                ConstLiteral::String(value) => write!(f, "{mnemonic} v{dest}, {value:?}"),
                ConstLiteral::Class(value) => write!(f, "{mnemonic} v{dest}, {value}"),
            },
            Self::MonitorEnter { object } | Self::MonitorExit { object } => {
                write!(f, "{mnemonic} v{object}")
            }
            Self::CheckCast { object, class } => write!(f, "{mnemonic} v{object}, {class}"),
            Self::InstanceOf { dest, object, class } => {
                write!(f, "{mnemonic} v{dest}, v{object}, {class}")
            }
            Self::ArrayLength { dest, array } => write!(f, "{mnemonic} v{dest}, v{array}"),
            Self::NewInstance { dest, class } => write!(f, "{mnemonic} v{dest}, {class}"),
            Self::NewArray {
                dest,
                size,
                descriptor,
            } => write!(f, "{mnemonic} v{dest}, v{size}, {descriptor}"),
            Self::FilledNewArray {
                arguments,
                descriptor,
            } => {
                let list = arguments.iter().map(|r| format!("v{r}")).collect::<Vec<_>>().join(", ");
                write!(f, "{mnemonic} {{{list}}}, {descriptor}")
            }
            Self::FillArrayData { array, values } => {
                write!(f, "{mnemonic} v{array}, [{} entries]", values.len())
            }
            Self::Throw { exception } => write!(f, "{mnemonic} v{exception}"),
            Self::Goto { target } => write!(f, "{mnemonic} @{target:#x}"),
            Self::PackedSwitch { value, .. } | Self::SparseSwitch { value, .. } => {
                write!(f, "{mnemonic} v{value}")
            }
            Self::Compare { dest, lhs, rhs, .. } => {
                write!(f, "{mnemonic} v{dest}, v{lhs}, v{rhs}")
            }
            Self::IfTest {
                lhs, rhs, target, ..
            } => write!(f, "{mnemonic} v{lhs}, v{rhs}, @{target:#x}"),
            Self::IfTestZ { value, target, .. } => {
                write!(f, "{mnemonic} v{value}, @{target:#x}")
            }
            Self::ArrayGet {
                dest, array, index, ..
            } => write!(f, "{mnemonic} v{dest}, v{array}, v{index}"),
            Self::ArrayPut {
                src, array, index, ..
            } => write!(f, "{mnemonic} v{src}, v{array}, v{index}"),
            Self::InstanceGet {
                dest, object, field, ..
            } => write!(f, "{mnemonic} v{dest}, v{object}, {field}"),
            Self::InstancePut {
                src, object, field, ..
            } => write!(f, "{mnemonic} v{src}, v{object}, {field}"),
            Self::StaticGet { dest, field, .. } => write!(f, "{mnemonic} v{dest}, {field}"),
            Self::StaticPut { src, field, .. } => write!(f, "{mnemonic} v{src}, {field}"),
            Self::Invoke {
                method, arguments, ..
            } => {
                let list = arguments.iter().map(|r| format!("v{r}")).collect::<Vec<_>>().join(", ");
                write!(f, "{mnemonic} {{{list}}}, {method}")
            }
            Self::Unary { dest, src, .. } => write!(f, "{mnemonic} v{dest}, v{src}"),
            Self::Binary { dest, lhs, rhs, .. } => {
                write!(f, "{mnemonic} v{dest}, v{lhs}, v{rhs}")
            }
            Self::BinaryLiteral {
                dest, lhs, literal, ..
            } => write!(f, "{mnemonic} v{dest}, v{lhs}, {literal:#x}"),
        }
    }
}
