//! Expression evaluation

use std::cmp::Ordering;
use std::collections::HashMap;

use fieldmap_model::Value;
use regex::Regex;

use crate::ast::{BinaryOp, Expr, Pattern, UnaryOp};
use crate::{EvalError, Result};

/// Root object and bound variables for one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    root: &'a Value,
    variables: HashMap<String, &'a Value>,
}

impl<'a> EvaluationContext<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            variables: HashMap::new(),
        }
    }

    /// Bind `#name` to a value
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: &'a Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn root(&self) -> &'a Value {
        self.root
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&'a Value> {
        self.variables.get(name).copied()
    }
}

pub(crate) fn evaluate(expr: &Expr, context: &EvaluationContext<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Property(name) => property(context.root(), name),
        Expr::Variable(name) => context
            .variable(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
        Expr::Member { target, name } => {
            let target = evaluate(target, context)?;
            property(&target, name)
        }
        Expr::Index { target, index } => {
            let target = evaluate(target, context)?;
            let index = evaluate(index, context)?;
            index_into(&target, &index)
        }
        Expr::Unary { op, operand } => {
            let operand = evaluate(operand, context)?;
            unary(*op, &operand)
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, context),
        Expr::Matches { subject, pattern } => {
            let subject = evaluate(subject, context)?;
            let text = match subject {
                Value::String(text) => text,
                Value::Null => return Ok(Value::Boolean(false)),
                other => {
                    return Err(EvalError::type_mismatch("matches", other.kind()));
                }
            };
            let matched = match pattern {
                Pattern::Compiled(regex) => regex.is_match(&text),
                Pattern::Dynamic(expr) => {
                    let pattern = match evaluate(expr, context)? {
                        Value::String(pattern) => pattern,
                        other => {
                            return Err(EvalError::type_mismatch(
                                "matches",
                                format!("string and {}", other.kind()),
                            ));
                        }
                    };
                    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                        EvalError::InvalidPattern {
                            pattern: pattern.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    regex.is_match(&text)
                }
            };
            Ok(Value::Boolean(matched))
        }
    }
}

/// Read a property of a value.
///
/// Missing fields of open records read as `null`; typed records only expose
/// declared fields.
pub(crate) fn property(target: &Value, name: &str) -> Result<Value> {
    match target {
        Value::Record(record) => match record.get(name) {
            Some(value) => Ok(value.clone()),
            None if record.accepts(name) => Ok(Value::Null),
            None => Err(EvalError::property_not_found(
                name,
                record.type_name().unwrap_or("record"),
            )),
        },
        Value::Null => Err(EvalError::null_navigation(name)),
        other => Err(EvalError::property_not_found(name, other.kind())),
    }
}

pub(crate) fn index_into(target: &Value, index: &Value) -> Result<Value> {
    match (target, index) {
        (Value::List(items), Value::Integer(i)) => usize::try_from(*i)
            .ok()
            .and_then(|position| items.get(position))
            .cloned()
            .ok_or(EvalError::IndexOutOfBounds {
                index: *i,
                len: items.len(),
            }),
        (Value::Record(_), Value::String(key)) => property(target, key),
        (Value::Null, index) => Err(EvalError::null_navigation(format!("[{index}]"))),
        (Value::List(_), index) => Err(EvalError::type_mismatch(
            "[]",
            format!("list and {}", index.kind()),
        )),
        (other, _) => Err(EvalError::NotIndexable {
            kind: other.kind().to_string(),
        }),
    }
}

fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Boolean(!truth(operand, "!")?)),
        UnaryOp::Neg => match operand {
            Value::Integer(i) => i
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| EvalError::Overflow(format!("-{i}"))),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            other => Err(EvalError::type_mismatch("-", other.kind())),
        },
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, context: &EvaluationContext<'_>) -> Result<Value> {
    // Logical operators short-circuit
    match op {
        BinaryOp::And => {
            let left = evaluate(left, context)?;
            if !truth(&left, "&&")? {
                return Ok(Value::Boolean(false));
            }
            let right = evaluate(right, context)?;
            return Ok(Value::Boolean(truth(&right, "&&")?));
        }
        BinaryOp::Or => {
            let left = evaluate(left, context)?;
            if truth(&left, "||")? {
                return Ok(Value::Boolean(true));
            }
            let right = evaluate(right, context)?;
            return Ok(Value::Boolean(truth(&right, "||")?));
        }
        _ => {}
    }

    let left = evaluate(left, context)?;
    let right = evaluate(right, context)?;

    match op {
        BinaryOp::Eq => Ok(Value::Boolean(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Boolean(!values_equal(&left, &right))),
        BinaryOp::Lt => compare(op, &left, &right).map(|o| Value::Boolean(o == Ordering::Less)),
        BinaryOp::Le => compare(op, &left, &right).map(|o| Value::Boolean(o != Ordering::Greater)),
        BinaryOp::Gt => compare(op, &left, &right).map(|o| Value::Boolean(o == Ordering::Greater)),
        BinaryOp::Ge => compare(op, &left, &right).map(|o| Value::Boolean(o != Ordering::Less)),
        BinaryOp::Add => add(&left, &right),
        BinaryOp::Sub => subtract(&left, &right),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators handled above"),
    }
}

/// Booleans are themselves; `null` is false; anything else is an error
fn truth(value: &Value, operator: &str) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::type_mismatch(operator, other.kind())),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a == b,
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left == right,
    }
}

fn operands(left: &Value, right: &Value) -> String {
    format!("{} and {}", left.kind(), right.kind())
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| EvalError::type_mismatch(op.to_string(), "NaN")),
            _ => Err(EvalError::type_mismatch(op.to_string(), operands(left, right))),
        },
    }
}

fn add(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_add(*b)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::Overflow(format!("{a} + {b}"))),
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{left}{right}")))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Decimal(a + b)),
            _ => Err(EvalError::type_mismatch("+", operands(left, right))),
        },
    }
}

fn subtract(left: &Value, right: &Value) -> Result<Value> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_sub(*b)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::Overflow(format!("{a} - {b}"))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Decimal(a - b)),
            _ => Err(EvalError::type_mismatch("-", operands(left, right))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Expression;
    use fieldmap_model::{FieldDescriptor, FieldType, Record, TypeDescriptor};
    use std::sync::Arc;

    fn person() -> Value {
        Value::Record(
            Record::open()
                .with("name", "Keith")
                .with("age", 42)
                .with("score", 7.5)
                .with("tags", vec![Value::from("a"), Value::from("b")])
                .with("address", Record::open().with("city", "Melbourne")),
        )
    }

    fn eval(text: &str, root: &Value) -> Result<Value> {
        Expression::parse(text)
            .unwrap()
            .evaluate(&EvaluationContext::new(root))
    }

    #[test]
    fn test_property_paths() {
        let root = person();
        assert_eq!(eval("name", &root).unwrap(), Value::from("Keith"));
        assert_eq!(eval("address.city", &root).unwrap(), Value::from("Melbourne"));
        assert_eq!(eval("tags[1]", &root).unwrap(), Value::from("b"));
        assert_eq!(eval("address['city']", &root).unwrap(), Value::from("Melbourne"));
        assert_eq!(eval("missing", &root).unwrap(), Value::Null);
    }

    #[test]
    fn test_navigation_errors() {
        let root = person();
        assert_eq!(
            eval("missing.city", &root).unwrap_err(),
            EvalError::null_navigation("city")
        );
        assert_eq!(
            eval("tags[5]", &root).unwrap_err(),
            EvalError::IndexOutOfBounds { index: 5, len: 2 }
        );
        assert_eq!(
            eval("name.first", &root).unwrap_err(),
            EvalError::property_not_found("first", "string")
        );
        assert!(matches!(
            eval("age[0]", &root).unwrap_err(),
            EvalError::NotIndexable { .. }
        ));
    }

    #[test]
    fn test_typed_record_hides_undeclared_fields() {
        let descriptor = Arc::new(
            TypeDescriptor::new("Person").field(FieldDescriptor::new("name", FieldType::String)),
        );
        let root = Value::Record(Record::typed(descriptor));
        assert_eq!(eval("name", &root).unwrap(), Value::Null);
        assert_eq!(
            eval("nickname", &root).unwrap_err(),
            EvalError::property_not_found("nickname", "Person")
        );
    }

    #[test]
    fn test_comparisons() {
        let root = person();
        assert_eq!(eval("age == 42", &root).unwrap(), Value::Boolean(true));
        assert_eq!(eval("age == 42.0", &root).unwrap(), Value::Boolean(true));
        assert_eq!(eval("score > age", &root).unwrap(), Value::Boolean(false));
        assert_eq!(eval("name < 'Z'", &root).unwrap(), Value::Boolean(true));
        assert_eq!(eval("missing == null", &root).unwrap(), Value::Boolean(true));
        assert!(matches!(
            eval("name > 3", &root).unwrap_err(),
            EvalError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_logic_short_circuits() {
        let root = person();
        // The right-hand side would fail if evaluated
        assert_eq!(
            eval("age < 18 && missing.city == 'x'", &root).unwrap(),
            Value::Boolean(false)
        );
        assert_eq!(
            eval("age > 18 or missing.city == 'x'", &root).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(eval("!(age > 18)", &root).unwrap(), Value::Boolean(false));
        assert!(eval("name && true", &root).is_err());
    }

    #[test]
    fn test_arithmetic_and_concatenation() {
        let root = person();
        assert_eq!(eval("age + 1", &root).unwrap(), Value::Integer(43));
        assert_eq!(eval("age - score", &root).unwrap(), Value::Decimal(34.5));
        assert_eq!(
            eval("name + ' (' + age + ')'", &root).unwrap(),
            Value::from("Keith (42)")
        );
        assert!(matches!(
            eval("9223372036854775807 + 1", &root).unwrap_err(),
            EvalError::Overflow(_)
        ));
    }

    #[test]
    fn test_matches_is_a_full_match() {
        let root = person();
        assert_eq!(eval("name matches 'K.*'", &root).unwrap(), Value::Boolean(true));
        assert_eq!(eval("name matches 'K'", &root).unwrap(), Value::Boolean(false));
        assert_eq!(eval("missing matches 'K'", &root).unwrap(), Value::Boolean(false));

        let dynamic = Value::Record(Record::open().with("code", "AB").with("rule", "[A-Z"));
        assert!(matches!(
            eval("code matches rule", &dynamic).unwrap_err(),
            EvalError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn test_variables() {
        let root = person();
        let target = Value::Record(Record::open().with("name", "Existing"));
        let expression = Expression::parse("#target.name == 'Existing' and #source.age == 42").unwrap();
        let context = EvaluationContext::new(&root)
            .with_variable("source", &root)
            .with_variable("target", &target);
        assert_eq!(expression.evaluate(&context).unwrap(), Value::Boolean(true));

        assert_eq!(
            eval("#nope", &root).unwrap_err(),
            EvalError::UnknownVariable("nope".to_string())
        );
    }

    #[test]
    fn test_condition_result_must_be_boolean() {
        let root = person();
        let context = EvaluationContext::new(&root);
        assert!(Expression::parse("age > 1").unwrap().evaluate_condition(&context).unwrap());
        assert!(!Expression::parse("missing").unwrap().evaluate_condition(&context).unwrap());
        assert!(Expression::parse("name").unwrap().evaluate_condition(&context).is_err());
    }
}
