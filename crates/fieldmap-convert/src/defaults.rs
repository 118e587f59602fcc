//! Default scalar converters

use std::sync::Arc;

use fieldmap_model::{TypeKey, Value};

use crate::registry::ConversionRegistry;
use crate::{ConversionError, Result};

/// Register the default scalar converters.
///
/// Strings parse into integers, decimals, and booleans (an empty or blank
/// string becomes null). Integers widen to decimals; decimals narrow to
/// integers only when they carry no fraction. Scalars render as strings.
pub fn register_defaults(registry: &mut ConversionRegistry) {
    registry.add_converter(TypeKey::String, TypeKey::Integer, Arc::new(string_to_integer));
    registry.add_converter(TypeKey::String, TypeKey::Decimal, Arc::new(string_to_decimal));
    registry.add_converter(TypeKey::String, TypeKey::Boolean, Arc::new(string_to_boolean));
    registry.add_converter(TypeKey::Integer, TypeKey::Decimal, Arc::new(integer_to_decimal));
    registry.add_converter(TypeKey::Decimal, TypeKey::Integer, Arc::new(decimal_to_integer));
    for from in [TypeKey::Integer, TypeKey::Decimal, TypeKey::Boolean] {
        registry.add_converter(from, TypeKey::String, Arc::new(scalar_to_string));
    }
}

fn text<'a>(value: &'a Value, to: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| ConversionError::failed(value.kind(), to, "expected a string"))
}

fn string_to_integer(value: &Value) -> Result<Value> {
    let s = text(value, "integer")?.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    s.parse::<i64>()
        .map(Value::Integer)
        .map_err(|error| ConversionError::failed("string", "integer", format!("'{s}': {error}")))
}

fn string_to_decimal(value: &Value) -> Result<Value> {
    let s = text(value, "decimal")?.trim();
    if s.is_empty() {
        return Ok(Value::Null);
    }
    s.parse::<f64>()
        .map(Value::Decimal)
        .map_err(|error| ConversionError::failed("string", "decimal", format!("'{s}': {error}")))
}

fn string_to_boolean(value: &Value) -> Result<Value> {
    let s = text(value, "boolean")?.trim();
    match s.to_ascii_lowercase().as_str() {
        "" => Ok(Value::Null),
        "true" | "on" | "yes" | "1" => Ok(Value::Boolean(true)),
        "false" | "off" | "no" | "0" => Ok(Value::Boolean(false)),
        _ => Err(ConversionError::failed(
            "string",
            "boolean",
            format!("'{s}' is not a boolean"),
        )),
    }
}

fn integer_to_decimal(value: &Value) -> Result<Value> {
    value
        .as_f64()
        .map(Value::Decimal)
        .ok_or_else(|| ConversionError::failed(value.kind(), "decimal", "expected an integer"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn decimal_to_integer(value: &Value) -> Result<Value> {
    let Value::Decimal(d) = value else {
        return Err(ConversionError::failed(value.kind(), "integer", "expected a decimal"));
    };
    if d.fract() != 0.0 || !d.is_finite() {
        return Err(ConversionError::failed(
            "decimal",
            "integer",
            format!("{d} is not integral"),
        ));
    }
    if *d < i64::MIN as f64 || *d >= i64::MAX as f64 {
        return Err(ConversionError::failed(
            "decimal",
            "integer",
            format!("{d} is out of range"),
        ));
    }
    Ok(Value::Integer(*d as i64))
}

fn scalar_to_string(value: &Value) -> Result<Value> {
    value
        .as_string()
        .map(Value::String)
        .ok_or_else(|| ConversionError::failed(value.kind(), "string", "expected a scalar"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_model::FieldType;

    fn registry() -> ConversionRegistry {
        ConversionRegistry::with_defaults()
    }

    #[test]
    fn test_string_parsing() {
        let registry = registry();
        assert_eq!(
            registry.convert(Value::from(" 42 "), &FieldType::Integer).unwrap(),
            Value::from(42)
        );
        assert_eq!(
            registry.convert(Value::from("7.25"), &FieldType::Decimal).unwrap(),
            Value::from(7.25)
        );
        assert_eq!(
            registry.convert(Value::from("Yes"), &FieldType::Boolean).unwrap(),
            Value::from(true)
        );
        assert_eq!(
            registry.convert(Value::from(""), &FieldType::Integer).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_invalid_strings_fail() {
        let registry = registry();
        assert!(matches!(
            registry.convert(Value::from("forty"), &FieldType::Integer),
            Err(ConversionError::Failed { .. })
        ));
        assert!(registry.convert(Value::from("maybe"), &FieldType::Boolean).is_err());
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        let registry = registry();
        assert_eq!(
            registry.convert(Value::from(3), &FieldType::Decimal).unwrap(),
            Value::from(3.0)
        );
        assert_eq!(
            registry.convert(Value::from(8.0), &FieldType::Integer).unwrap(),
            Value::from(8)
        );
        assert!(registry.convert(Value::from(8.5), &FieldType::Integer).is_err());
        assert!(registry.convert(Value::from(f64::NAN), &FieldType::Integer).is_err());
        assert!(registry.convert(Value::from(1e30), &FieldType::Integer).is_err());
    }

    #[test]
    fn test_scalars_render_as_strings() {
        let registry = registry();
        assert_eq!(
            registry.convert(Value::from(42), &FieldType::String).unwrap(),
            Value::from("42")
        );
        assert_eq!(
            registry.convert(Value::from(false), &FieldType::String).unwrap(),
            Value::from("false")
        );
        assert!(registry.convert(Value::List(vec![]), &FieldType::String).is_err());
    }
}
