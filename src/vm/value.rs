//! This module contains the abstract value domain the engine executes over.
//!
//! # The Lattice
//!
//! The domain is a flat lattice: [`Value::Unknown`] is top, every concrete
//! value sits below it, and two values merge to their join when control-flow
//! paths meet. There is deliberately no bottom element; a register that was
//! never assigned holds `Unknown`.
//!
//! # Exceptions Are Values
//!
//! Dalvik exceptions are represented as [`VirtualException`] values attached
//! to execution nodes and flowing along catch edges. The engine never uses
//! host-language panics or `Err` values to model them; those are reserved for
//! engine bugs and resource-bound breaches.

use std::{
    cell::RefCell,
    fmt::{Display, Formatter},
    rc::Rc,
};

use crate::constant::{OBJECT_TYPE_DESCRIPTOR, UNKNOWN_TYPE_DESCRIPTOR};

/// An exception raised on an execution path, carried as a value rather than
/// as host-language control flow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualException {
    /// The type descriptor of the exception class.
    pub kind: String,

    /// The detail message, as the runtime would produce it.
    pub message: String,
}

impl VirtualException {
    /// Constructs a new virtual exception of class `kind` with the provided
    /// detail `message`.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl Display for VirtualException {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The mutable contents of a concretely-tracked array.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayContents {
    /// The type descriptor of the array's elements.
    pub element_descriptor: String,

    /// The element values.
    pub elements: Vec<Value>,
}

/// A reference to a concretely-tracked array.
///
/// Within a single execution context, copies of the reference alias the same
/// contents, so writes through one register are visible through another. A
/// branched copy of a context deep-copies instead ([`ArrayValue::deep_clone`])
/// so that divergent paths cannot see one another's writes.
#[derive(Clone, Debug)]
pub struct ArrayValue(Rc<RefCell<ArrayContents>>);

impl ArrayValue {
    /// Constructs a new array of `length` elements of the described type,
    /// each initialised to the type's default value.
    #[must_use]
    pub fn new(element_descriptor: impl Into<String>, length: usize) -> Self {
        let element_descriptor = element_descriptor.into();
        let default = default_value(&element_descriptor);
        let elements = vec![default; length];
        Self(Rc::new(RefCell::new(ArrayContents {
            element_descriptor,
            elements,
        })))
    }

    /// Constructs a new array holding exactly `elements`.
    #[must_use]
    pub fn with_elements(element_descriptor: impl Into<String>, elements: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(ArrayContents {
            element_descriptor: element_descriptor.into(),
            elements,
        })))
    }

    /// Gets the number of elements in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().elements.len()
    }

    /// Checks whether the array is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the type descriptor of the array's elements.
    #[must_use]
    pub fn element_descriptor(&self) -> String {
        self.0.borrow().element_descriptor.clone()
    }

    /// Gets the element at `index`, or [`None`] when out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().elements.get(index).cloned()
    }

    /// Sets the element at `index`, returning whether the index was in
    /// bounds.
    pub fn set(&self, index: usize, value: Value) -> bool {
        let mut contents = self.0.borrow_mut();
        match contents.elements.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Creates a copy of the array whose contents are independent of this
    /// one, for use when a context is branched.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let contents = self.0.borrow();
        let elements = contents.elements.iter().map(Value::deep_clone).collect();
        Self(Rc::new(RefCell::new(ArrayContents {
            element_descriptor: contents.element_descriptor.clone(),
            elements,
        })))
    }
}

/// Arrays compare by contents, so that structurally identical arrays on two
/// merging paths are recognised as the same value.
impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0.borrow() == *other.0.borrow()
    }
}

/// A concrete value of the abstract domain.
///
/// Narrow integral types (`boolean`, `byte`, `char`, `short`) are stored as
/// [`ConcreteValue::Int`], matching the Dalvik register model where they are
/// indistinguishable at rest. A narrow register is 32 bits and a wide pair is
/// 64 bits, so conversions between the integral and floating views of a
/// register reinterpret bits rather than convert numerically.
#[derive(Clone, Debug, PartialEq)]
pub enum ConcreteValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    Null,
    Array(ArrayValue),
}

impl ConcreteValue {
    /// Views the value as the 32 bits of an `int` register, reinterpreting
    /// float bits and treating null as zero.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) => Some(value.to_bits() as i32),
            Self::Null => Some(0),
            _ => None,
        }
    }

    /// Views the value as the 64 bits of a wide register pair.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            Self::Double(value) => Some(value.to_bits() as i64),
            Self::Int(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    /// Views the value as a `float`, reinterpreting int bits.
    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(f32::from_bits(*value as u32)),
            _ => None,
        }
    }

    /// Views the value as a `double`, reinterpreting long bits.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Long(value) => Some(f64::from_bits(*value as u64)),
            _ => None,
        }
    }

    /// Checks whether the value is the null reference (or the interchangeable
    /// zero register).
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null) || matches!(self, Self::Int(0))
    }

    /// Compares two concrete values bit-for-bit, which is the equality the
    /// merge lattice uses. Unlike [`PartialEq`], NaN is identical to itself
    /// here.
    #[must_use]
    pub fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl Display for ConcreteValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Long(value) => write!(f, "{value}L"),
            Self::Float(value) => write!(f, "{value}f"),
            Self::Double(value) => write!(f, "{value}"),
            Self::String(value) => write!(f, "{value:?}"),
            Self::Class(value) => write!(f, "class {value}"),
            Self::Null => write!(f, "null"),
            Self::Array(value) => write!(f, "array[{}]", value.len()),
        }
    }
}

/// A value of the abstract domain.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A concretely known value.
    Concrete(ConcreteValue),

    /// The top of the lattice: any concrete value is possible.
    Unknown,

    /// An instance allocated by `new-instance` on which no constructor has
    /// run yet.
    UninitializedInstance {
        /// The type descriptor of the allocated class.
        class: String,
    },

    /// An exception flowing along an execution edge.
    Exception(VirtualException),
}

impl Value {
    /// Checks whether the value is concretely known.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        matches!(self, Self::Concrete(_))
    }

    /// Checks whether the value is the top of the lattice.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Gets the concrete value, if the value is concretely known.
    #[must_use]
    pub fn concrete(&self) -> Option<&ConcreteValue> {
        match self {
            Self::Concrete(value) => Some(value),
            _ => None,
        }
    }

    /// Compares two values with the equality the merge lattice uses (see
    /// [`ConcreteValue::identical`]).
    #[must_use]
    pub fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Concrete(a), Self::Concrete(b)) => a.identical(b),
            (a, b) => a == b,
        }
    }

    /// Creates a copy of the value that shares no mutable state with this
    /// one, for use when a context is branched.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Concrete(ConcreteValue::Array(array)) => {
                Self::Concrete(ConcreteValue::Array(array.deep_clone()))
            }
            other => other.clone(),
        }
    }

    /// Joins two values in the lattice: identical values join to themselves
    /// and anything else joins to [`Value::Unknown`].
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.identical(other) {
            self.deep_clone()
        } else {
            Self::Unknown
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concrete(value) => write!(f, "{value}"),
            Self::Unknown => write!(f, "unknown"),
            Self::UninitializedInstance { class } => write!(f, "uninitialized {class}"),
            Self::Exception(exception) => write!(f, "exception {exception}"),
        }
    }
}

/// The default value a field or array element of the described type holds
/// before anything is assigned to it.
#[must_use]
pub fn default_value(descriptor: &str) -> Value {
    match descriptor {
        "Z" | "B" | "S" | "C" | "I" => Value::Concrete(ConcreteValue::Int(0)),
        "J" => Value::Concrete(ConcreteValue::Long(0)),
        "F" => Value::Concrete(ConcreteValue::Float(0.0)),
        "D" => Value::Concrete(ConcreteValue::Double(0.0)),
        _ => Value::Concrete(ConcreteValue::Null),
    }
}

/// A value paired with the type the program declared for it.
///
/// The declared type travels with the value so that widening and narrowing
/// during arithmetic and merging stay explicit.
#[derive(Clone, Debug, PartialEq)]
pub struct HeapItem {
    /// The value itself.
    pub value: Value,

    /// The Dalvik type descriptor the program declared for the value.
    pub declared_type: String,
}

impl HeapItem {
    /// Constructs a new item holding `value` with the provided declared
    /// type.
    #[must_use]
    pub fn new(value: Value, declared_type: impl Into<String>) -> Self {
        Self {
            value,
            declared_type: declared_type.into(),
        }
    }

    /// Constructs an item holding [`Value::Unknown`] with the provided
    /// declared type.
    #[must_use]
    pub fn unknown(declared_type: impl Into<String>) -> Self {
        Self::new(Value::Unknown, declared_type)
    }

    /// Constructs an item holding [`Value::Unknown`] with an unknowable
    /// declared type.
    #[must_use]
    pub fn untyped_unknown() -> Self {
        Self::new(Value::Unknown, UNKNOWN_TYPE_DESCRIPTOR)
    }

    /// Checks whether the item's value is concretely known.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.value.is_concrete()
    }

    /// Checks whether the item's value is the top of the lattice.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.value.is_unknown()
    }

    /// Creates a copy of the item that shares no mutable state with this
    /// one.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        Self {
            value: self.value.deep_clone(),
            declared_type: self.declared_type.clone(),
        }
    }

    /// Joins two items: values join in the value lattice, and declared types
    /// join to their common supertype.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let value = self.value.merge(&other.value);
        let declared_type = merge_types(&self.declared_type, &other.declared_type);
        Self {
            value,
            declared_type,
        }
    }
}

impl Display for HeapItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.value, self.declared_type)
    }
}

/// Joins two declared types: equal types join to themselves, distinct
/// reference types join to `java.lang.Object`, and anything else joins to the
/// unknown descriptor.
#[must_use]
pub fn merge_types(a: &str, b: &str) -> String {
    if a == b {
        a.to_string()
    } else if is_reference_descriptor(a) && is_reference_descriptor(b) {
        OBJECT_TYPE_DESCRIPTOR.to_string()
    } else {
        UNKNOWN_TYPE_DESCRIPTOR.to_string()
    }
}

/// Checks whether the descriptor names a reference type.
#[must_use]
pub fn is_reference_descriptor(descriptor: &str) -> bool {
    descriptor.starts_with('L') || descriptor.starts_with('[')
}

#[cfg(test)]
mod test {
    use crate::vm::value::{ArrayValue, ConcreteValue, HeapItem, Value};

    fn int_item(value: i32) -> HeapItem {
        HeapItem::new(Value::Concrete(ConcreteValue::Int(value)), "I")
    }

    #[test]
    fn merge_is_idempotent() {
        let item = int_item(42);
        assert_eq!(item.merge(&item), item);
    }

    #[test]
    fn merge_is_commutative_and_absorbs_into_unknown() {
        let a = int_item(1);
        let b = int_item(2);
        let unknown = HeapItem::unknown("I");

        assert_eq!(a.merge(&b), b.merge(&a));
        assert!(a.merge(&b).is_unknown());
        assert!(a.merge(&unknown).is_unknown());
        assert!(unknown.merge(&a).is_unknown());
    }

    #[test]
    fn merge_is_associative() {
        let a = int_item(1);
        let b = int_item(1);
        let c = int_item(2);

        assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
    }

    #[test]
    fn merging_equal_types_preserves_the_type() {
        let merged = int_item(1).merge(&int_item(2));
        assert_eq!(merged.declared_type, "I");
    }

    #[test]
    fn merging_distinct_reference_types_widens_to_object() {
        let a = HeapItem::new(Value::Concrete(ConcreteValue::Null), "Ljava/lang/String;");
        let b = HeapItem::new(Value::Concrete(ConcreteValue::Null), "[I");
        let merged = a.merge(&b);

        assert_eq!(merged.declared_type, "Ljava/lang/Object;");
        assert!(merged.is_concrete());
    }

    #[test]
    fn nan_is_identical_to_itself_in_the_lattice() {
        let nan = Value::Concrete(ConcreteValue::Float(f32::NAN));
        assert!(nan.identical(&nan));
        assert_eq!(nan.merge(&nan), nan);
    }

    #[test]
    fn float_bits_reinterpret_through_int_view() {
        let float = ConcreteValue::Float(3.0);
        let bits = float.as_int().unwrap();
        assert_eq!(ConcreteValue::Int(bits).as_float(), Some(3.0));
    }

    #[test]
    fn branched_array_copies_do_not_alias() {
        let array = ArrayValue::new("I", 2);
        let aliased = array.clone();
        let branched = array.deep_clone();

        array.set(0, Value::Concrete(ConcreteValue::Int(7)));

        assert_eq!(aliased.get(0), Some(Value::Concrete(ConcreteValue::Int(7))));
        assert_eq!(branched.get(0), Some(Value::Concrete(ConcreteValue::Int(0))));
    }
}
