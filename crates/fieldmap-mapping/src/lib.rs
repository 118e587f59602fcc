#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # fieldmap-mapping
//!
//! Field mapping engine: copies values from a source object onto a target
//! object through declared correspondences and, optionally, by matching
//! field names.
//!
//! ```
//! use fieldmap_mapping::FieldMapper;
//! use fieldmap_model::{Record, Value};
//!
//! let mut mapper = FieldMapper::new();
//! mapper.add_field_mapping("name", "fullName").unwrap();
//!
//! let source = Value::Record(Record::open().with("name", "Keith").with("age", 42));
//! let target = mapper.map(&source, Value::Record(Record::open())).unwrap();
//!
//! assert_eq!(target.field("fullName"), Some(&Value::from("Keith")));
//! assert_eq!(target.field("age"), Some(&Value::from(42)));
//! assert_eq!(target.field("name"), None);
//! ```

pub mod context;
pub mod dsl;
pub mod engine;
pub mod entry;
pub mod mappable;
pub mod nested;
pub mod results;
pub mod scope;

pub use context::MappingContext;
pub use dsl::{MappingDefinition, MappingDsl};
pub use engine::{FailurePolicy, FieldMapper, Mapper, MappingOutcome};
pub use entry::MappingEntry;
pub use mappable::{DefaultMappableTypeFactory, MappableType, MappableTypeFactory};
pub use nested::{MappingTargetFactory, TypeRegistryTargetFactory};
pub use results::{FailureCause, MappingResult, MappingResults, Outcome, Severity};
pub use scope::MappingScope;

use fieldmap_model::ModelError;
use thiserror::Error;

/// Errors that can occur while configuring or running a mapper
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("The mapping {role} '{expression}' is not a valid expression: {source}")]
    Configuration {
        role: &'static str,
        expression: String,
        source: fieldmap_expr::ParseError,
    },

    #[error("Mapping configuration error: {0}")]
    InvalidConfiguration(String),

    #[error("The {role} to map cannot be null")]
    MissingArgument { role: &'static str },

    #[error("Mapping failed: {0}")]
    Failures(MappingResults),

    #[error("DSL parse error: {0}")]
    Dsl(#[from] dsl::ParseError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl MappingError {
    pub fn configuration(
        role: &'static str,
        expression: impl Into<String>,
        source: fieldmap_expr::ParseError,
    ) -> Self {
        Self::Configuration {
            role,
            expression: expression.into(),
            source,
        }
    }

    /// Results of the failed pass, for [`MappingError::Failures`]
    #[must_use]
    pub fn results(&self) -> Option<&MappingResults> {
        match self {
            Self::Failures(results) => Some(results),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
