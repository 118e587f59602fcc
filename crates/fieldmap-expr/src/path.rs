//! Assignable path expressions
//!
//! A path is an identifier followed by `.name`, `[index]`, or `['key']`
//! segments with literal keys. Paths can be read, written, and checked for
//! writability. Writes create missing intermediate records and lists.

use std::fmt;

use fieldmap_model::{FieldType, Record, Value};

use crate::ast::Expr;
use crate::eval::{index_into, property};
use crate::parser::{Expression, property_text};
use crate::{EvalError, ParseError, Result};

/// Lists never grow past this many elements through a single write
pub const AUTO_GROW_LIMIT: usize = 10_000;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Property(String),
    Index(usize),
}

/// Adapts values to the declared type of the location they are written to
pub trait Coercer {
    /// Convert `value` so that `declared` accepts it
    ///
    /// # Errors
    ///
    /// Returns an error when no conversion applies.
    fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value>;

    /// Create the value used to fill a missing intermediate record
    fn instantiate(&self, declared: &FieldType) -> Value {
        match declared {
            FieldType::Record(name) => Value::Record(Record::named(name.clone())),
            _ => Value::Record(Record::open()),
        }
    }
}

/// Coercer that only accepts values already matching the declared type
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCoercion;

impl Coercer for NoCoercion {
    fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value> {
        if declared.accepts(&value) {
            Ok(value)
        } else {
            Err(EvalError::conversion(
                value.type_key().to_string(),
                declared.to_string(),
                "no conversion available",
            ))
        }
    }
}

/// An assignable path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    text: String,
    segments: Vec<Segment>,
}

impl PathExpression {
    /// Parse an assignable path
    ///
    /// # Errors
    ///
    /// Returns an error when the text does not parse or is not assignable.
    pub fn parse(text: &str) -> std::result::Result<Self, ParseError> {
        let expression = Expression::parse(text)?;
        Self::from_expression(&expression).ok_or_else(|| {
            ParseError::new(
                format!("'{}' is not an assignable property path", expression.text()),
                0,
            )
        })
    }

    /// Convert an expression into a path if it is assignable
    #[must_use]
    pub fn from_expression(expression: &Expression) -> Option<Self> {
        let mut segments = Vec::new();
        collect_segments(expression.ast(), &mut segments)?;
        Some(Self {
            text: expression.text().to_string(),
            segments,
        })
    }

    /// Path to a single property; any field name is accepted
    pub fn property(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            text: property_text(&name),
            segments: vec![Segment::Property(name)],
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Name of the first property in the path
    #[must_use]
    pub fn root_property(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Property(name)) => Some(name),
            _ => None,
        }
    }

    /// Read the value at this path
    ///
    /// # Errors
    ///
    /// Returns an error when a segment cannot be resolved.
    pub fn read(&self, root: &Value) -> Result<Value> {
        let mut current = root.clone();
        for segment in &self.segments {
            current = match segment {
                Segment::Property(name) => property(&current, name)?,
                Segment::Index(index) => index_into(&current, &index_value(*index))?,
            };
        }
        Ok(current)
    }

    /// Write a value at this path, creating missing intermediate records and
    /// lists and coercing the value to the declared type of the location.
    ///
    /// Intermediates are built off to the side and attached only once the
    /// final value is stored, so a failed write leaves `root` unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error when a segment cannot be resolved or created, the
    /// final location is read-only, or coercion fails.
    pub fn write(&self, root: &mut Value, value: Value, coercer: &dyn Coercer) -> Result<()> {
        assign(root, &self.segments, value, coercer, &self.text)
    }

    /// Whether a write to this path would be accepted.
    ///
    /// `Ok(false)` means the location exists in principle but cannot be
    /// assigned (undeclared or read-only field). `Err` means the path cannot
    /// be resolved against this value at all. Missing intermediates are
    /// checked as open records; see [`PathExpression::is_writable_with`].
    ///
    /// # Errors
    ///
    /// Returns an error when a segment cannot be resolved.
    pub fn is_writable(&self, root: &Value) -> Result<bool> {
        self.is_writable_with(root, &NoCoercion)
    }

    /// Like [`PathExpression::is_writable`], checking the rest of the path
    /// below a missing intermediate against the value `coercer` would create
    /// for it.
    ///
    /// # Errors
    ///
    /// Returns an error when a segment cannot be resolved.
    pub fn is_writable_with(&self, root: &Value, coercer: &dyn Coercer) -> Result<bool> {
        writable(root, &self.segments, coercer)
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn collect_segments(expr: &Expr, segments: &mut Vec<Segment>) -> Option<()> {
    match expr {
        Expr::Property(name) => segments.push(Segment::Property(name.clone())),
        Expr::Member { target, name } => {
            collect_segments(target, segments)?;
            segments.push(Segment::Property(name.clone()));
        }
        Expr::Index { target, index } => {
            collect_segments(target, segments)?;
            let segment = match index.as_ref() {
                Expr::Literal(Value::Integer(i)) => Segment::Index(usize::try_from(*i).ok()?),
                Expr::Literal(Value::String(key)) => Segment::Property(key.clone()),
                _ => return None,
            };
            segments.push(segment);
        }
        _ => return None,
    }
    Some(())
}

fn index_value(index: usize) -> Value {
    Value::Integer(i64::try_from(index).unwrap_or(i64::MAX))
}

fn assign(
    current: &mut Value,
    segments: &[Segment],
    value: Value,
    coercer: &dyn Coercer,
    path: &str,
) -> Result<()> {
    let Some((segment, rest)) = segments.split_first() else {
        return Err(EvalError::not_writable(path, "empty path"));
    };

    match segment {
        Segment::Property(name) => {
            let record = match current {
                Value::Record(record) => record,
                Value::Null => return Err(EvalError::null_navigation(name.as_str())),
                other => return Err(EvalError::property_not_found(name.as_str(), other.kind())),
            };
            if !record.accepts(name) {
                return Err(EvalError::property_not_found(
                    name.as_str(),
                    record.type_name().unwrap_or("record"),
                ));
            }
            let writable = record.is_writable(name);
            if rest.is_empty() && !writable {
                return Err(EvalError::not_writable(path, format!("'{name}' is read-only")));
            }
            let declared = record.declared_type(name);
            if let Some(slot) = record.get_mut(name) {
                if slot.is_null() && !rest.is_empty() && !writable {
                    return Err(EvalError::not_writable(
                        path,
                        format!("cannot create read-only '{name}'"),
                    ));
                }
                return descend(slot, rest, &declared, value, coercer, path);
            }
            if !rest.is_empty() && !writable {
                return Err(EvalError::not_writable(
                    path,
                    format!("cannot create read-only '{name}'"),
                ));
            }
            let mut created = Value::Null;
            descend(&mut created, rest, &declared, value, coercer, path)?;
            record
                .insert(name.as_str(), created)
                .map_err(|error| EvalError::not_writable(path, error.to_string()))?;
            Ok(())
        }
        Segment::Index(index) => {
            let items = match current {
                Value::List(items) => items,
                Value::Null => return Err(EvalError::null_navigation(format!("[{index}]"))),
                other => {
                    return Err(EvalError::NotIndexable {
                        kind: other.kind().to_string(),
                    });
                }
            };
            if *index >= AUTO_GROW_LIMIT {
                return Err(EvalError::IndexOutOfBounds {
                    index: i64::try_from(*index).unwrap_or(i64::MAX),
                    len: items.len(),
                });
            }
            if let Some(slot) = items.get_mut(*index) {
                return descend(slot, rest, &FieldType::Any, value, coercer, path);
            }
            let mut created = Value::Null;
            descend(&mut created, rest, &FieldType::Any, value, coercer, path)?;
            tracing::trace!(path, from = items.len(), to = index + 1, "Growing list");
            items.resize(*index, Value::Null);
            items.push(created);
            Ok(())
        }
    }
}

fn descend(
    slot: &mut Value,
    rest: &[Segment],
    declared: &FieldType,
    value: Value,
    coercer: &dyn Coercer,
    path: &str,
) -> Result<()> {
    match rest.first() {
        None => {
            *slot = coercer.coerce(value, declared)?;
            Ok(())
        }
        Some(next) if slot.is_null() => {
            let mut created = intermediate(next, declared, coercer);
            assign(&mut created, rest, value, coercer, path)?;
            *slot = created;
            Ok(())
        }
        Some(_) => assign(slot, rest, value, coercer, path),
    }
}

/// Empty value created for a missing slot that `next` navigates into
fn intermediate(next: &Segment, declared: &FieldType, coercer: &dyn Coercer) -> Value {
    match next {
        Segment::Index(_) => Value::List(Vec::new()),
        Segment::Property(_) => coercer.instantiate(declared),
    }
}

fn writable(current: &Value, segments: &[Segment], coercer: &dyn Coercer) -> Result<bool> {
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(false);
    };

    match (segment, current) {
        (Segment::Property(name), Value::Record(record)) => {
            if !record.accepts(name) {
                return Ok(false);
            }
            if rest.is_empty() {
                return Ok(record.is_writable(name));
            }
            match record.get(name) {
                Some(value) if !value.is_null() => writable(value, rest, coercer),
                _ if !record.is_writable(name) => Ok(false),
                // Missing intermediates are created on write
                _ => writable(
                    &intermediate(&rest[0], &record.declared_type(name), coercer),
                    rest,
                    coercer,
                ),
            }
        }
        (Segment::Index(index), Value::List(items)) => {
            if *index >= AUTO_GROW_LIMIT {
                return Ok(false);
            }
            if rest.is_empty() {
                return Ok(true);
            }
            match items.get(*index) {
                Some(value) if !value.is_null() => writable(value, rest, coercer),
                _ => writable(
                    &intermediate(&rest[0], &FieldType::Any, coercer),
                    rest,
                    coercer,
                ),
            }
        }
        (Segment::Property(name), Value::Null) => Err(EvalError::null_navigation(name.as_str())),
        (Segment::Property(name), other) => Err(EvalError::property_not_found(name.as_str(), other.kind())),
        (Segment::Index(index), Value::Null) => Err(EvalError::null_navigation(format!("[{index}]"))),
        (Segment::Index(_), other) => Err(EvalError::NotIndexable {
            kind: other.kind().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_model::{FieldDescriptor, TypeDescriptor};
    use std::sync::Arc;

    fn dto_type() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("PersonDto")
                .field(FieldDescriptor::new("fullName", FieldType::String))
                .field(FieldDescriptor::new("age", FieldType::Integer))
                .field(FieldDescriptor::read_only("id", FieldType::Integer))
                .field(FieldDescriptor::new(
                    "address",
                    FieldType::Record("AddressDto".to_string()),
                )),
        )
    }

    /// Instantiates `AddressDto` intermediates from a descriptor
    struct Registered;

    impl Coercer for Registered {
        fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value> {
            NoCoercion.coerce(value, declared)
        }

        fn instantiate(&self, declared: &FieldType) -> Value {
            match declared {
                FieldType::Record(name) if name == "AddressDto" => Value::Record(Record::typed(
                    Arc::new(
                        TypeDescriptor::new("AddressDto")
                            .field(FieldDescriptor::new("city", FieldType::String)),
                    ),
                )),
                _ => NoCoercion.instantiate(declared),
            }
        }
    }

    /// Accepts nothing
    struct Rejecting;

    impl Coercer for Rejecting {
        fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value> {
            Err(EvalError::conversion(
                value.type_key().to_string(),
                declared.to_string(),
                "rejected",
            ))
        }
    }

    #[test]
    fn test_parse_assignable_paths() {
        let path = PathExpression::parse("items[2].sku").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Property("items".to_string()),
                Segment::Index(2),
                Segment::Property("sku".to_string()),
            ]
        );
        assert_eq!(path.root_property(), Some("items"));

        let keyed = PathExpression::parse("attributes['first name']").unwrap();
        assert_eq!(
            keyed.segments()[1],
            Segment::Property("first name".to_string())
        );
    }

    #[test]
    fn test_non_assignable_expressions_are_rejected() {
        for text in ["a + b", "#target.name", "'literal'", "items[i]", "items[-1]", "a == b"] {
            let err = PathExpression::parse(text).unwrap_err();
            assert!(
                err.message.contains("not an assignable property path"),
                "{text}: {err}"
            );
        }
        assert!(PathExpression::parse("a..b").is_err());
    }

    #[test]
    fn test_write_grows_intermediates() {
        let mut target = Value::Record(Record::open());
        PathExpression::parse("address.lines[2]")
            .unwrap()
            .write(&mut target, Value::from("third"), &NoCoercion)
            .unwrap();

        let lines = PathExpression::parse("address.lines").unwrap().read(&target).unwrap();
        assert_eq!(
            lines,
            Value::List(vec![Value::Null, Value::Null, Value::from("third")])
        );
    }

    #[test]
    fn test_write_creates_named_record_for_declared_type() {
        let mut target = Value::Record(Record::typed(dto_type()));
        PathExpression::parse("address.city")
            .unwrap()
            .write(&mut target, Value::from("Melbourne"), &NoCoercion)
            .unwrap();

        let address = target.field("address").and_then(Value::as_record).unwrap();
        assert_eq!(address.type_name(), Some("AddressDto"));
        assert_eq!(address.get("city"), Some(&Value::from("Melbourne")));
    }

    #[test]
    fn test_write_respects_descriptor() {
        let mut target = Value::Record(Record::typed(dto_type()));

        let err = PathExpression::parse("id")
            .unwrap()
            .write(&mut target, Value::from(1), &NoCoercion)
            .unwrap_err();
        assert!(matches!(err, EvalError::NotWritable { .. }));

        let err = PathExpression::parse("nickname")
            .unwrap()
            .write(&mut target, Value::from("K"), &NoCoercion)
            .unwrap_err();
        assert_eq!(err, EvalError::property_not_found("nickname", "PersonDto"));

        let err = PathExpression::parse("age")
            .unwrap()
            .write(&mut target, Value::from("42"), &NoCoercion)
            .unwrap_err();
        assert!(matches!(err, EvalError::Conversion { .. }));
    }

    #[test]
    fn test_write_uses_coercer() {
        struct Stringify;
        impl Coercer for Stringify {
            fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value> {
                match (declared, &value) {
                    (FieldType::String, Value::Integer(i)) => Ok(Value::String(i.to_string())),
                    _ => Ok(value),
                }
            }
        }

        let mut target = Value::Record(Record::typed(dto_type()));
        PathExpression::parse("fullName")
            .unwrap()
            .write(&mut target, Value::from(7), &Stringify)
            .unwrap();
        assert_eq!(target.field("fullName"), Some(&Value::from("7")));
    }

    #[test]
    fn test_is_writable_distinguishes_invalid_paths() {
        let target = Value::Record(Record::typed(dto_type()).with("fullName", "x"));

        assert!(PathExpression::property("age").is_writable(&target).unwrap());
        assert!(!PathExpression::property("id").is_writable(&target).unwrap());
        assert!(!PathExpression::property("nickname").is_writable(&target).unwrap());
        assert!(PathExpression::parse("address.city").unwrap().is_writable(&target).unwrap());

        // A property of a string cannot be resolved at all
        assert!(PathExpression::parse("fullName.first").unwrap().is_writable(&target).is_err());
        assert!(PathExpression::property("age").is_writable(&Value::from(3)).is_err());
    }

    #[test]
    fn test_failed_write_leaves_root_unchanged() {
        let mut target = Value::Record(Record::typed(dto_type()));
        let before = target.clone();

        // The created `AddressDto` intermediate rejects the undeclared field
        let err = PathExpression::parse("address.zip")
            .unwrap()
            .write(&mut target, Value::from("6000"), &Registered)
            .unwrap_err();
        assert_eq!(err, EvalError::property_not_found("zip", "AddressDto"));
        assert_eq!(target, before);

        let mut open = Value::Record(Record::open().with("items", Value::List(Vec::new())));
        let before = open.clone();
        PathExpression::parse("items[3].sku")
            .unwrap()
            .write(&mut open, Value::from(1), &Rejecting)
            .unwrap_err();
        assert_eq!(open, before);
    }

    #[test]
    fn test_is_writable_checks_below_missing_intermediates() {
        let target = Value::Record(Record::typed(dto_type()));
        let zip = PathExpression::parse("address.zip").unwrap();
        let city = PathExpression::parse("address.city").unwrap();

        assert!(!zip.is_writable_with(&target, &Registered).unwrap());
        assert!(city.is_writable_with(&target, &Registered).unwrap());

        // Without type information the intermediate is an open record
        assert!(zip.is_writable(&target).unwrap());

        let open = Value::Record(Record::open());
        assert!(!PathExpression::parse("lines[10000].sku").unwrap().is_writable(&open).unwrap());
        assert!(PathExpression::parse("lines[2].sku").unwrap().is_writable(&open).unwrap());
    }

    #[test]
    fn test_list_growth_is_bounded() {
        let mut target = Value::Record(Record::open().with("items", Value::List(Vec::new())));
        let path = PathExpression::parse("items[10000]").unwrap();
        assert!(!path.is_writable(&target).unwrap());
        assert!(matches!(
            path.write(&mut target, Value::from(1), &NoCoercion).unwrap_err(),
            EvalError::IndexOutOfBounds { .. }
        ));
    }

    #[test]
    fn test_read_matches_evaluation() {
        let root = Value::Record(
            Record::open().with("items", vec![Value::Record(Record::open().with("sku", "A1"))]),
        );
        assert_eq!(
            PathExpression::parse("items[0].sku").unwrap().read(&root).unwrap(),
            Value::from("A1")
        );
        assert_eq!(
            PathExpression::property("odd name").read(&root).unwrap(),
            Value::Null
        );
    }
}
