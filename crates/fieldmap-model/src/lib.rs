#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # fieldmap-model
//!
//! Dynamic object model used by the mapping engine.
//!
//! Objects are represented as a [`Value`] tree. Records are either open
//! (map-like, any field accepted) or typed by a [`TypeDescriptor`] that lists
//! the declared fields, their types, and whether they can be written.

/// Type descriptors and the named type registry.
pub mod descriptor;
/// JSON conversions for the value tree.
pub mod json;
/// Records: the object nodes of the value tree.
pub mod record;
/// The value tree itself.
pub mod value;

pub use descriptor::{FieldDescriptor, FieldType, TypeDescriptor, TypeRegistry};
pub use record::Record;
pub use value::{TypeKey, Value};

use thiserror::Error;

/// Errors that can occur when building or reshaping values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Type '{type_name}' does not declare a field named '{field}'")]
    UnknownField { type_name: String, field: String },

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
}

impl ModelError {
    /// Build an unknown-field error for a typed record.
    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    /// Build a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Crate-local result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
