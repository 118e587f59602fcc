//! Mapping entries
//!
//! An entry is one declared correspondence between source and target. Entries
//! are immutable once registered; applying one records exactly one result in
//! the mapping context.

use std::fmt;
use std::sync::Arc;

use fieldmap_convert::Converter;
use fieldmap_expr::{EvalError, Expression, PathExpression};
use fieldmap_model::{Record, Value};

use crate::context::MappingContext;
use crate::engine::Mapper;
use crate::results::{FailureCause, MappingResult, Outcome, Severity};

/// Where an assembled entry gathers its inputs from
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblySource {
    /// Each expression's value, keyed by the expression text
    Fields(Vec<Expression>),
    /// Every source field named `prefix.<suffix>`, keyed by suffix
    Prefix(String),
}

/// A registered correspondence
#[derive(Clone)]
pub enum MappingEntry {
    /// One source value, optionally converted, written to one target path
    FieldToField {
        source: Expression,
        target: PathExpression,
        converter: Option<Arc<dyn Converter>>,
        condition: Option<Expression>,
    },
    /// One source value mapped onto the whole target by a nested mapper
    FieldToMultiField {
        source: Expression,
        mapper: Arc<dyn Mapper>,
        condition: Option<Expression>,
    },
    /// The whole source mapped onto the whole target by a nested mapper,
    /// claiming the listed source fields
    Flexible {
        fields: Vec<String>,
        mapper: Arc<dyn Mapper>,
        condition: Option<Expression>,
    },
    /// Several source values assembled into one target value
    Assembled {
        sources: AssemblySource,
        target: PathExpression,
        assembler: Arc<dyn Converter>,
        condition: Option<Expression>,
    },
}

type Applied = Result<Option<Value>, FailureCause>;

impl MappingEntry {
    #[must_use]
    pub fn condition(&self) -> Option<&Expression> {
        match self {
            MappingEntry::FieldToField { condition, .. }
            | MappingEntry::FieldToMultiField { condition, .. }
            | MappingEntry::Flexible { condition, .. }
            | MappingEntry::Assembled { condition, .. } => condition.as_ref(),
        }
    }

    /// Evaluate the guard; entries without one always apply
    ///
    /// # Errors
    ///
    /// Returns an error when the guard cannot be evaluated to a boolean.
    pub fn applies(&self, context: &MappingContext<'_>) -> Result<bool, EvalError> {
        match self.condition() {
            Some(condition) => context.evaluate_condition(condition),
            None => Ok(true),
        }
    }

    /// Whether this entry claims a source field, suppressing its auto-mapping
    #[must_use]
    pub fn maps_field(&self, name: &str) -> bool {
        match self {
            MappingEntry::FieldToField { source, .. }
            | MappingEntry::FieldToMultiField { source, .. } => claims(source, name),
            MappingEntry::Flexible { fields, .. } => fields.iter().any(|field| field == name),
            MappingEntry::Assembled { sources, .. } => match sources {
                AssemblySource::Fields(expressions) => {
                    expressions.iter().any(|source| claims(source, name))
                }
                AssemblySource::Prefix(prefix) => name
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('.')),
            },
        }
    }

    /// Label of the source side, used in results and logs
    #[must_use]
    pub fn source_label(&self) -> String {
        match self {
            MappingEntry::FieldToField { source, .. }
            | MappingEntry::FieldToMultiField { source, .. } => source.text().to_string(),
            MappingEntry::Flexible { fields, .. } => fields.join(","),
            MappingEntry::Assembled { sources, .. } => match sources {
                AssemblySource::Fields(expressions) => expressions
                    .iter()
                    .map(Expression::text)
                    .collect::<Vec<_>>()
                    .join(","),
                AssemblySource::Prefix(prefix) => format!("{prefix}.*"),
            },
        }
    }

    /// Label of the target side; `*` when a nested mapper writes the target
    #[must_use]
    pub fn target_label(&self) -> String {
        match self {
            MappingEntry::FieldToField { target, .. } | MappingEntry::Assembled { target, .. } => {
                target.text().to_string()
            }
            MappingEntry::FieldToMultiField { .. } | MappingEntry::Flexible { .. } => "*".to_string(),
        }
    }

    /// Apply the entry, recording its result in the context.
    ///
    /// Failures are recorded with `Error` severity for declared entries and
    /// `Warning` for auto-mappings.
    pub fn map(&self, context: &mut MappingContext<'_>, auto: bool) {
        let severity = if auto { Severity::Warning } else { Severity::Error };
        let outcome = match self.applies(context) {
            Ok(true) => match self.apply(context) {
                Ok(Some(value)) => Outcome::Success(value),
                Ok(None) => Outcome::Skipped,
                Err(cause) => Outcome::Failure { cause, severity },
            },
            Ok(false) => Outcome::Skipped,
            Err(error) => Outcome::Failure {
                cause: FailureCause::Condition(error),
                severity,
            },
        };

        context.record(MappingResult {
            source_field: self.source_label(),
            target_field: self.target_label(),
            auto,
            outcome,
        });
    }

    fn apply(&self, context: &mut MappingContext<'_>) -> Applied {
        match self {
            MappingEntry::FieldToField {
                source,
                target,
                converter,
                ..
            } => {
                let value = context.read(source).map_err(FailureCause::Read)?;
                let value = match converter {
                    Some(converter) => converter.convert(&value).map_err(FailureCause::Conversion)?,
                    None => value,
                };
                context
                    .write(target, value.clone())
                    .map_err(FailureCause::Write)?;
                Ok(Some(value))
            }
            MappingEntry::FieldToMultiField { source, mapper, .. } => {
                let value = context.read(source).map_err(FailureCause::Read)?;
                if value.is_null() {
                    return Ok(None);
                }
                mapper
                    .map_into(&value, context.target_mut())
                    .map_err(|error| FailureCause::Nested(Arc::new(error)))?;
                Ok(Some(value))
            }
            MappingEntry::Flexible { mapper, .. } => {
                let source = context.source();
                mapper
                    .map_into(source, context.target_mut())
                    .map_err(|error| FailureCause::Nested(Arc::new(error)))?;
                Ok(Some(Value::Null))
            }
            MappingEntry::Assembled {
                sources,
                target,
                assembler,
                ..
            } => {
                let parts = assemble(sources, context)?;
                let value = assembler
                    .convert(&Value::Record(parts))
                    .map_err(FailureCause::Conversion)?;
                context
                    .write(target, value.clone())
                    .map_err(FailureCause::Write)?;
                Ok(Some(value))
            }
        }
    }
}

fn claims(source: &Expression, name: &str) -> bool {
    source.text() == name || source.root_property() == Some(name)
}

fn assemble(sources: &AssemblySource, context: &MappingContext<'_>) -> Result<Record, FailureCause> {
    let mut parts = Record::open();
    match sources {
        AssemblySource::Fields(expressions) => {
            for expression in expressions {
                let value = context.read(expression).map_err(FailureCause::Read)?;
                parts = parts.with(expression.text(), value);
            }
        }
        AssemblySource::Prefix(prefix) => {
            for field in context.source_field_names() {
                let Some(suffix) = field
                    .strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('.'))
                else {
                    continue;
                };
                let value = context
                    .read(&Expression::property(field.as_str()))
                    .map_err(FailureCause::Read)?;
                parts = parts.with(suffix, value);
            }
        }
    }
    Ok(parts)
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::ptr_eq(a, b)
}

/// Converters match when shared or backed by equal transforms
fn same_converter(a: &Arc<dyn Converter>, b: &Arc<dyn Converter>) -> bool {
    same(a, b)
        || matches!((a.as_transform(), b.as_transform()), (Some(x), Some(y)) if x == y)
}

impl PartialEq for MappingEntry {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                MappingEntry::FieldToField {
                    source: s1,
                    target: t1,
                    converter: c1,
                    condition: k1,
                },
                MappingEntry::FieldToField {
                    source: s2,
                    target: t2,
                    converter: c2,
                    condition: k2,
                },
            ) => {
                let converters = match (c1, c2) {
                    (Some(a), Some(b)) => same_converter(a, b),
                    (None, None) => true,
                    _ => false,
                };
                s1 == s2 && t1 == t2 && converters && k1 == k2
            }
            (
                MappingEntry::FieldToMultiField {
                    source: s1,
                    mapper: m1,
                    condition: k1,
                },
                MappingEntry::FieldToMultiField {
                    source: s2,
                    mapper: m2,
                    condition: k2,
                },
            ) => s1 == s2 && same(m1, m2) && k1 == k2,
            (
                MappingEntry::Flexible {
                    fields: f1,
                    mapper: m1,
                    condition: k1,
                },
                MappingEntry::Flexible {
                    fields: f2,
                    mapper: m2,
                    condition: k2,
                },
            ) => f1 == f2 && same(m1, m2) && k1 == k2,
            (
                MappingEntry::Assembled {
                    sources: s1,
                    target: t1,
                    assembler: a1,
                    condition: k1,
                },
                MappingEntry::Assembled {
                    sources: s2,
                    target: t2,
                    assembler: a2,
                    condition: k2,
                },
            ) => s1 == s2 && t1 == t2 && same_converter(a1, a2) && k1 == k2,
            _ => false,
        }
    }
}

impl fmt::Display for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source_label(), self.target_label())?;
        if let Some(condition) = self.condition() {
            write!(f, " [if {condition}]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for MappingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            MappingEntry::FieldToField { .. } => "FieldToField",
            MappingEntry::FieldToMultiField { .. } => "FieldToMultiField",
            MappingEntry::Flexible { .. } => "Flexible",
            MappingEntry::Assembled { .. } => "Assembled",
        };
        write!(f, "{kind}({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(source: &str, target: &str, condition: Option<&str>) -> MappingEntry {
        MappingEntry::FieldToField {
            source: Expression::parse(source).unwrap(),
            target: PathExpression::parse(target).unwrap(),
            converter: None,
            condition: condition.map(|c| Expression::parse(c).unwrap()),
        }
    }

    #[test]
    fn test_maps_field() {
        assert!(field("name", "fullName", None).maps_field("name"));
        assert!(!field("name", "fullName", None).maps_field("fullName"));
        assert!(field("['first name']", "first", None).maps_field("first name"));
        assert!(!field("address.city", "city", None).maps_field("address"));

        let prefixed = MappingEntry::Assembled {
            sources: AssemblySource::Prefix("price".to_string()),
            target: PathExpression::parse("price").unwrap(),
            assembler: Arc::new(fieldmap_convert::Transform::Concatenate { separator: None }),
            condition: None,
        };
        assert!(prefixed.maps_field("price.amount"));
        assert!(!prefixed.maps_field("price"));
        assert!(!prefixed.maps_field("priceList"));
    }

    #[test]
    fn test_equality() {
        assert_eq!(field("name", "fullName", None), field("name", "fullName", None));
        assert_ne!(
            field("name", "fullName", None),
            field("name", "fullName", Some("age > 1"))
        );

        let upper: Arc<dyn Converter> = Arc::new(fieldmap_convert::Transform::Uppercase);
        let with = |converter: &Arc<dyn Converter>| MappingEntry::FieldToField {
            source: Expression::parse("name").unwrap(),
            target: PathExpression::parse("fullName").unwrap(),
            converter: Some(Arc::clone(converter)),
            condition: None,
        };
        assert_eq!(with(&upper), with(&upper));

        // Separately built but equal transforms are the same mapping
        let other: Arc<dyn Converter> = Arc::new(fieldmap_convert::Transform::Uppercase);
        assert_eq!(with(&upper), with(&other));
        let lower: Arc<dyn Converter> = Arc::new(fieldmap_convert::Transform::Lowercase);
        assert_ne!(with(&upper), with(&lower));

        // Opaque converters only match themselves
        let first: Arc<dyn Converter> =
            Arc::new(|value: &Value| -> fieldmap_convert::Result<Value> { Ok(value.clone()) });
        let second: Arc<dyn Converter> =
            Arc::new(|value: &Value| -> fieldmap_convert::Result<Value> { Ok(value.clone()) });
        assert_eq!(with(&first), with(&first));
        assert_ne!(with(&first), with(&second));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            field("name", "fullName", Some("age >= 18")).to_string(),
            "name -> fullName [if age >= 18]"
        );
    }
}
