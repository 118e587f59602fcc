#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # fieldmap-convert
//!
//! Conversion between value kinds for the mapping engine.
//!
//! A [`ConversionRegistry`] answers "can a value of kind A become kind B" and
//! performs the conversion. It holds plain [`Converter`]s for one source and
//! target kind pair and [`GenericConverter`]s that also see the declared
//! target type and the registry itself (used for nested record mappers).
//!
//! [`Transform`]s are named converters that can be declared in YAML.

pub mod defaults;
pub mod registry;
pub mod transform;

pub use registry::{ConversionRegistry, Converter, GenericConverter};
pub use transform::Transform;

use thiserror::Error;

/// Errors raised while converting values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("No converter from {from} to {to}")]
    NoConverter { from: String, to: String },

    #[error("Cannot convert {from} to {to}: {message}")]
    Failed {
        from: String,
        to: String,
        message: String,
    },

    #[error("Transform error: {0}")]
    Transform(String),
}

impl ConversionError {
    pub fn failed(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Failed {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }
}

/// Crate-local result type for conversions.
pub type Result<T> = std::result::Result<T, ConversionError>;
