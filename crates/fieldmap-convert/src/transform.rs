//! Named value transforms
//!
//! Transforms are converters that can be declared in a mapping file. The
//! `concatenate` transform is an assembler: applied to a record it joins the
//! record's non-null values.

use fieldmap_model::Value;
use serde::{Deserialize, Serialize};

use crate::registry::Converter;
use crate::{ConversionError, Result};

/// Most decimals `number_format` renders; an `f64` carries no more
pub const MAX_DECIMALS: u32 = 17;

/// Transform operation applied to a value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Convert to uppercase
    Uppercase,

    /// Convert to lowercase
    Lowercase,

    /// Trim whitespace
    Trim,

    /// Replace null or empty strings
    Default { value: String },

    /// Format a number with fixed decimals
    NumberFormat {
        decimals: u32,
        #[serde(default)]
        thousands_sep: Option<String>,
    },

    /// Take one part of a delimited string
    Split { delimiter: String, index: usize },

    /// Join the non-null values of a record or list
    Concatenate {
        #[serde(default)]
        separator: Option<String>,
    },

    /// Apply transforms in order
    Chain { transforms: Vec<Transform> },
}

impl Transform {
    /// Apply the transform. Null passes through every transform except
    /// `default`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transform cannot be applied to the input.
    pub fn apply(&self, value: &Value) -> Result<Value> {
        match self {
            Transform::Uppercase => map_text(value, "uppercase", str::to_uppercase),
            Transform::Lowercase => map_text(value, "lowercase", str::to_lowercase),
            Transform::Trim => map_text(value, "trim", |s| s.trim().to_string()),
            Transform::Default { value: default } => Ok(apply_default(value, default)),
            Transform::NumberFormat {
                decimals,
                thousands_sep,
            } => number_format(value, *decimals, thousands_sep.as_deref()),
            Transform::Split { delimiter, index } => split(value, delimiter, *index),
            Transform::Concatenate { separator } => {
                Ok(concatenate(value, separator.as_deref().unwrap_or("")))
            }
            Transform::Chain { transforms } => transforms
                .iter()
                .try_fold(value.clone(), |current, transform| transform.apply(&current)),
        }
    }
}

impl Converter for Transform {
    fn convert(&self, value: &Value) -> Result<Value> {
        self.apply(value)
    }

    fn as_transform(&self) -> Option<&Transform> {
        Some(self)
    }
}

fn map_text(value: &Value, op: &str, f: impl Fn(&str) -> String) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    value
        .as_string()
        .map(|s| Value::String(f(&s)))
        .ok_or_else(|| ConversionError::Transform(format!("Cannot {op} a {}", value.kind())))
}

fn apply_default(value: &Value, default: &str) -> Value {
    match value {
        Value::Null => Value::String(default.to_string()),
        Value::String(s) if s.is_empty() => Value::String(default.to_string()),
        _ => value.clone(),
    }
}

fn to_number(value: &Value) -> Result<f64> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ConversionError::Transform(format!("Cannot parse '{s}' as number"))),
        other => other
            .as_f64()
            .ok_or_else(|| ConversionError::Transform(format!("Cannot format a {} as number", other.kind()))),
    }
}

fn number_format(value: &Value, decimals: u32, thousands_sep: Option<&str>) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if decimals > MAX_DECIMALS {
        return Err(ConversionError::Transform(format!(
            "Cannot format with {decimals} decimals (at most {MAX_DECIMALS})"
        )));
    }
    let number = to_number(value)?;
    let precision = usize::try_from(decimals)
        .map_err(|_| ConversionError::Transform("Unsupported decimal precision".to_string()))?;
    let rounded = format!("{number:.precision$}");
    Ok(Value::String(match thousands_sep {
        Some(sep) => group_thousands(&rounded, sep),
        None => rounded,
    }))
}

fn group_thousands(number: &str, sep: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let digits: Vec<char> = integer.chars().collect();
    let mut grouped = String::new();
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(sep);
        }
        grouped.push(*digit);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

fn split(value: &Value, delimiter: &str, index: usize) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let input = value
        .as_string()
        .ok_or_else(|| ConversionError::Transform(format!("Cannot split a {}", value.kind())))?;
    let parts: Vec<&str> = input.split(delimiter).collect();
    parts
        .get(index)
        .map(|part| Value::String((*part).to_string()))
        .ok_or_else(|| {
            ConversionError::Transform(format!(
                "Split index {index} out of bounds ({} parts)",
                parts.len()
            ))
        })
}

fn concatenate(value: &Value, separator: &str) -> Value {
    let parts: Vec<String> = match value {
        Value::Null => return Value::Null,
        Value::Record(record) => record
            .iter()
            .filter(|(_, item)| !item.is_null())
            .map(|(_, item)| item.to_string())
            .collect(),
        Value::List(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(ToString::to_string)
            .collect(),
        scalar => vec![scalar.to_string()],
    };
    Value::String(parts.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_model::Record;

    #[test]
    fn test_string_transforms() {
        assert_eq!(
            Transform::Uppercase.apply(&Value::from("keith")).unwrap(),
            Value::from("KEITH")
        );
        assert_eq!(
            Transform::Lowercase.apply(&Value::from("HeLLo")).unwrap(),
            Value::from("hello")
        );
        assert_eq!(
            Transform::Trim.apply(&Value::from("  x  ")).unwrap(),
            Value::from("x")
        );
        assert_eq!(Transform::Uppercase.apply(&Value::Null).unwrap(), Value::Null);
        assert!(Transform::Trim.apply(&Value::List(vec![])).is_err());
    }

    #[test]
    fn test_default_replaces_null_and_empty() {
        let transform = Transform::Default {
            value: "n/a".to_string(),
        };
        assert_eq!(transform.apply(&Value::Null).unwrap(), Value::from("n/a"));
        assert_eq!(transform.apply(&Value::from("")).unwrap(), Value::from("n/a"));
        assert_eq!(transform.apply(&Value::from(3)).unwrap(), Value::from(3));
    }

    #[test]
    fn test_number_format() {
        let transform = Transform::NumberFormat {
            decimals: 2,
            thousands_sep: Some(",".to_string()),
        };
        assert_eq!(
            transform.apply(&Value::from(1_234_567.891)).unwrap(),
            Value::from("1,234,567.89")
        );
        assert_eq!(
            transform.apply(&Value::from("-1000")).unwrap(),
            Value::from("-1,000.00")
        );

        let plain = Transform::NumberFormat {
            decimals: 0,
            thousands_sep: None,
        };
        assert_eq!(plain.apply(&Value::from(12)).unwrap(), Value::from("12"));
        assert!(plain.apply(&Value::from("abc")).is_err());
    }

    #[test]
    fn test_number_format_precision_is_capped() {
        let widest = Transform::NumberFormat {
            decimals: MAX_DECIMALS,
            thousands_sep: None,
        };
        assert!(widest.apply(&Value::from(1)).is_ok());

        let huge = Transform::NumberFormat {
            decimals: 4_000_000_000,
            thousands_sep: None,
        };
        let err = huge.apply(&Value::from(1)).unwrap_err();
        assert!(matches!(err, ConversionError::Transform(message) if message.contains("at most 17")));
        assert_eq!(huge.apply(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_split() {
        let transform = Transform::Split {
            delimiter: " ".to_string(),
            index: 1,
        };
        assert_eq!(
            transform.apply(&Value::from("Keith Smith")).unwrap(),
            Value::from("Smith")
        );
        assert!(transform.apply(&Value::from("Keith")).is_err());
    }

    #[test]
    fn test_concatenate_skips_nulls() {
        let record = Value::Record(
            Record::open()
                .with("first", "Keith")
                .with("middle", Value::Null)
                .with("last", "Smith"),
        );
        let transform = Transform::Concatenate {
            separator: Some(" ".to_string()),
        };
        assert_eq!(transform.apply(&record).unwrap(), Value::from("Keith Smith"));
        assert_eq!(
            transform
                .apply(&Value::List(vec![Value::from(1), Value::from(2)]))
                .unwrap(),
            Value::from("1 2")
        );
    }

    #[test]
    fn test_chain_and_yaml_shape() {
        let yaml = r"
op: chain
transforms:
  - op: trim
  - op: uppercase
  - op: default
    value: NONE
";
        let transform: Transform = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            transform.apply(&Value::from("  keith ")).unwrap(),
            Value::from("KEITH")
        );
        assert_eq!(transform.apply(&Value::from("   ")).unwrap(), Value::from("NONE"));
    }
}
