//! This module contains the catalog of framework methods the engine is
//! permitted to evaluate directly during abstract interpretation.
//!
//! Every entry is a pure function over its arguments with semantics lifted
//! straight from the Java standard library. Anything with observable side
//! effects, or whose result depends on ambient state, must not appear here;
//! the safety configuration treats "emulated" as the definition of a safe
//! method.

use crate::{
    smali::method::MethodSignature,
    vm::value::{ConcreteValue, HeapItem, Value, VirtualException},
};

/// The descriptor of the exception raised by out-of-range string indexing.
const STRING_INDEX_EXCEPTION: &str = "Ljava/lang/StringIndexOutOfBoundsException;";

/// The descriptor of the exception raised by unparseable numeric input.
const NUMBER_FORMAT_EXCEPTION: &str = "Ljava/lang/NumberFormatException;";

/// The result of an emulated call: a produced value for non-void methods, or
/// a virtual exception exactly as the real implementation would raise one.
pub type EmulationResult = Result<Option<Value>, VirtualException>;

/// Checks whether the method with the provided `signature` is in the
/// emulation catalog.
#[must_use]
pub fn is_emulated(signature: &MethodSignature) -> bool {
    CATALOG.iter().any(|(rendered, _)| *rendered == signature.to_string())
}

/// Invokes the emulated implementation of `signature` over the provided
/// `arguments` (the receiver first, for instance methods).
///
/// Returns [`None`] if the method is not in the catalog or the arguments do
/// not have the shapes the real implementation would accept.
#[must_use]
pub fn invoke(signature: &MethodSignature, arguments: &[HeapItem]) -> Option<EmulationResult> {
    let rendered = signature.to_string();
    let (_, implementation) = CATALOG.iter().find(|(name, _)| *name == rendered)?;
    implementation(arguments)
}

type Implementation = fn(&[HeapItem]) -> Option<EmulationResult>;

/// The emulation catalog, keyed by rendered signature.
static CATALOG: &[(&str, Implementation)] = &[
    ("Ljava/lang/String;->length()I", string_length),
    ("Ljava/lang/String;->isEmpty()Z", string_is_empty),
    ("Ljava/lang/String;->charAt(I)C", string_char_at),
    (
        "Ljava/lang/String;->concat(Ljava/lang/String;)Ljava/lang/String;",
        string_concat,
    ),
    (
        "Ljava/lang/String;->equals(Ljava/lang/Object;)Z",
        string_equals,
    ),
    ("Ljava/lang/String;->hashCode()I", string_hash_code),
    ("Ljava/lang/String;->valueOf(I)Ljava/lang/String;", string_value_of_int),
    ("Ljava/lang/Math;->abs(I)I", math_abs),
    ("Ljava/lang/Math;->min(II)I", math_min),
    ("Ljava/lang/Math;->max(II)I", math_max),
    (
        "Ljava/lang/Integer;->parseInt(Ljava/lang/String;)I",
        integer_parse_int,
    ),
];

/// Views an argument as a string.
fn string_argument(arguments: &[HeapItem], index: usize) -> Option<&str> {
    match arguments.get(index)?.value.concrete()? {
        ConcreteValue::String(value) => Some(value),
        _ => None,
    }
}

/// Views an argument as an int.
fn int_argument(arguments: &[HeapItem], index: usize) -> Option<i32> {
    arguments.get(index)?.value.concrete()?.as_int()
}

fn string_length(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let length = receiver.encode_utf16().count() as i32;
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(length)))))
}

fn string_is_empty(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let empty = i32::from(receiver.is_empty());
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(empty)))))
}

fn string_char_at(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let index = int_argument(arguments, 1)?;
    let unit = usize::try_from(index)
        .ok()
        .and_then(|index| receiver.encode_utf16().nth(index));
    Some(match unit {
        Some(unit) => Ok(Some(Value::Concrete(ConcreteValue::Int(i32::from(unit))))),
        None => Err(VirtualException::new(
            STRING_INDEX_EXCEPTION,
            format!("String index out of range: {index}"),
        )),
    })
}

fn string_concat(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let other = string_argument(arguments, 1)?;
    let joined = format!("{receiver}{other}");
    Some(Ok(Some(Value::Concrete(ConcreteValue::String(joined)))))
}

fn string_equals(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let other = arguments.get(1)?.value.concrete()?;
    let equal = match other {
        ConcreteValue::String(other) => receiver == other,
        _ => false,
    };
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(i32::from(equal))))))
}

fn string_hash_code(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let receiver = string_argument(arguments, 0)?;
    let hash = receiver
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(hash)))))
}

fn string_value_of_int(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let value = int_argument(arguments, 0)?;
    Some(Ok(Some(Value::Concrete(ConcreteValue::String(
        value.to_string(),
    )))))
}

fn math_abs(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let value = int_argument(arguments, 0)?;
    // Math.abs(Integer.MIN_VALUE) is MIN_VALUE, like the runtime.
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(
        value.wrapping_abs(),
    )))))
}

fn math_min(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let a = int_argument(arguments, 0)?;
    let b = int_argument(arguments, 1)?;
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(a.min(b))))))
}

fn math_max(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let a = int_argument(arguments, 0)?;
    let b = int_argument(arguments, 1)?;
    Some(Ok(Some(Value::Concrete(ConcreteValue::Int(a.max(b))))))
}

fn integer_parse_int(arguments: &[HeapItem]) -> Option<EmulationResult> {
    let text = string_argument(arguments, 0)?;
    Some(match text.parse::<i32>() {
        Ok(value) => Ok(Some(Value::Concrete(ConcreteValue::Int(value)))),
        Err(_) => Err(VirtualException::new(
            NUMBER_FORMAT_EXCEPTION,
            format!("For input string: {text:?}"),
        )),
    })
}

#[cfg(test)]
mod test {
    use crate::{
        emulate,
        smali::method::MethodSignature,
        vm::value::{ConcreteValue, HeapItem, Value},
    };

    fn string_item(value: &str) -> HeapItem {
        HeapItem::new(
            Value::Concrete(ConcreteValue::String(value.into())),
            "Ljava/lang/String;",
        )
    }

    #[test]
    fn string_length_matches_utf16_semantics() {
        let signature = MethodSignature::parse("Ljava/lang/String;->length()I").unwrap();

        let result = emulate::invoke(&signature, &[string_item("abc")]).unwrap().unwrap();
        assert_eq!(result, Some(Value::Concrete(ConcreteValue::Int(3))));

        // A supplementary character occupies two UTF-16 units.
        let result = emulate::invoke(&signature, &[string_item("𝄞")]).unwrap().unwrap();
        assert_eq!(result, Some(Value::Concrete(ConcreteValue::Int(2))));
    }

    #[test]
    fn string_hash_code_matches_the_jdk() {
        let signature = MethodSignature::parse("Ljava/lang/String;->hashCode()I").unwrap();

        let result = emulate::invoke(&signature, &[string_item("abc")]).unwrap().unwrap();
        assert_eq!(result, Some(Value::Concrete(ConcreteValue::Int(96354))));
    }

    #[test]
    fn char_at_out_of_range_raises() {
        let signature = MethodSignature::parse("Ljava/lang/String;->charAt(I)C").unwrap();
        let index = HeapItem::new(Value::Concrete(ConcreteValue::Int(5)), "I");

        let result = emulate::invoke(&signature, &[string_item("ab"), index]).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn parse_int_raises_on_garbage() {
        let signature =
            MethodSignature::parse("Ljava/lang/Integer;->parseInt(Ljava/lang/String;)I").unwrap();

        let ok = emulate::invoke(&signature, &[string_item("-17")]).unwrap().unwrap();
        assert_eq!(ok, Some(Value::Concrete(ConcreteValue::Int(-17))));

        let err = emulate::invoke(&signature, &[string_item("x")]).unwrap();
        assert!(err.is_err());
    }

    #[test]
    fn unknown_arguments_are_not_emulated() {
        let signature = MethodSignature::parse("Ljava/lang/String;->length()I").unwrap();
        let unknown = HeapItem::unknown("Ljava/lang/String;");

        assert!(emulate::invoke(&signature, &[unknown]).is_none());
    }
}
