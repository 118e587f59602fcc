#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # fieldmap-expr
//!
//! A small expression language over [`fieldmap_model::Value`] trees.
//!
//! Expressions are parsed once and evaluated many times. Source locators and
//! guard conditions are general [`Expression`]s; target locators are
//! assignable [`PathExpression`]s that can be written to, growing missing
//! intermediate records and lists on the way.
//!
//! ```
//! use fieldmap_expr::{EvaluationContext, Expression, NoCoercion, PathExpression};
//! use fieldmap_model::{Record, Value};
//!
//! let source = Value::Record(Record::open().with("age", 42));
//! let adult = Expression::parse("age >= 18").unwrap();
//! assert_eq!(
//!     adult.evaluate(&EvaluationContext::new(&source)).unwrap(),
//!     Value::Boolean(true)
//! );
//!
//! let mut target = Value::Record(Record::open());
//! let path = PathExpression::parse("address.lines[1]").unwrap();
//! path.write(&mut target, Value::from("Level 2"), &NoCoercion).unwrap();
//! assert_eq!(path.read(&target).unwrap(), Value::from("Level 2"));
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod path;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::EvaluationContext;
pub use parser::Expression;
pub use path::{Coercer, NoCoercion, PathExpression, Segment};

use thiserror::Error;

/// Error raised when an expression cannot be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// Character offset into the expression text
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// Errors raised while evaluating or assigning through an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Property '{property}' not found on {type_name}")]
    PropertyNotFound { property: String, type_name: String },

    #[error("Cannot access '{property}' on null")]
    NullNavigation { property: String },

    #[error("Index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("Cannot index into {kind}")]
    NotIndexable { kind: String },

    #[error("Unknown variable '#{0}'")]
    UnknownVariable(String),

    #[error("Operator '{operator}' cannot be applied to {operands}")]
    TypeMismatch { operator: String, operands: String },

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Arithmetic overflow evaluating '{0}'")]
    Overflow(String),

    #[error("Path '{path}' is not writable: {reason}")]
    NotWritable { path: String, reason: String },

    #[error("Cannot convert {from} to {to}: {message}")]
    Conversion {
        from: String,
        to: String,
        message: String,
    },
}

impl EvalError {
    pub fn property_not_found(property: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::PropertyNotFound {
            property: property.into(),
            type_name: type_name.into(),
        }
    }

    pub fn null_navigation(property: impl Into<String>) -> Self {
        Self::NullNavigation {
            property: property.into(),
        }
    }

    pub fn type_mismatch(operator: impl Into<String>, operands: impl Into<String>) -> Self {
        Self::TypeMismatch {
            operator: operator.into(),
            operands: operands.into(),
        }
    }

    pub fn not_writable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotWritable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn conversion(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conversion {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }
}

/// Crate-local result type for evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;
