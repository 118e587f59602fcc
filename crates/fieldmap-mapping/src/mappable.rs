//! Mappable type views
//!
//! A view adapts an object for the engine: it enumerates the field names
//! offered for auto-mapping and answers whether a target path can be
//! written.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use fieldmap_expr::{Coercer, EvalError, PathExpression};
use fieldmap_model::{Record, Value};

/// View of one object for a mapping pass
pub trait MappableType: Send + Sync {
    /// Field names offered for auto-mapping, in a stable order
    fn field_names(&self, value: &Value) -> Vec<String>;

    /// Whether `path` can be written on `value`. `coercer` creates the
    /// intermediates a write would fill in.
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be resolved against the value
    /// at all, as opposed to `Ok(false)` for a known but read-only location.
    fn is_writable(
        &self,
        value: &Value,
        path: &PathExpression,
        coercer: &dyn Coercer,
    ) -> Result<bool, EvalError>;
}

/// Produces the view used for an object
pub trait MappableTypeFactory: Send + Sync {
    fn mappable_type(&self, value: &Value) -> Arc<dyn MappableType>;
}

/// View of a record: typed records expose their declared fields, open
/// records the fields they currently hold
#[derive(Debug, Clone, Default)]
pub struct RecordMappableType {
    type_name: Option<String>,
}

impl RecordMappableType {
    #[must_use]
    pub fn new(type_name: Option<String>) -> Self {
        Self { type_name }
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }
}

impl MappableType for RecordMappableType {
    fn field_names(&self, value: &Value) -> Vec<String> {
        value.as_record().map(Record::field_names).unwrap_or_default()
    }

    fn is_writable(
        &self,
        value: &Value,
        path: &PathExpression,
        coercer: &dyn Coercer,
    ) -> Result<bool, EvalError> {
        path.is_writable_with(value, coercer)
    }
}

/// View of a scalar or list: no fields, nothing writable by name
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueMappableType;

impl MappableType for OpaqueMappableType {
    fn field_names(&self, _value: &Value) -> Vec<String> {
        Vec::new()
    }

    fn is_writable(
        &self,
        value: &Value,
        path: &PathExpression,
        _coercer: &dyn Coercer,
    ) -> Result<bool, EvalError> {
        Err(EvalError::property_not_found(path.text(), value.kind()))
    }
}

/// Default factory, caching one record view per type name
pub struct DefaultMappableTypeFactory {
    records: DashMap<String, Arc<dyn MappableType>>,
    opaque: Arc<dyn MappableType>,
}

impl DefaultMappableTypeFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            opaque: Arc::new(OpaqueMappableType),
        }
    }

    /// Number of cached record views
    #[must_use]
    pub fn cached(&self) -> usize {
        self.records.len()
    }
}

impl Default for DefaultMappableTypeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultMappableTypeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultMappableTypeFactory")
            .field("cached", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl MappableTypeFactory for DefaultMappableTypeFactory {
    fn mappable_type(&self, value: &Value) -> Arc<dyn MappableType> {
        let Value::Record(record) = value else {
            return Arc::clone(&self.opaque);
        };
        // Open records share the view keyed by the empty name
        let key = record.type_name().unwrap_or_default().to_string();
        let view = self.records.entry(key).or_insert_with(|| -> Arc<dyn MappableType> {
            Arc::new(RecordMappableType::new(record.type_name().map(str::to_string)))
        });
        Arc::clone(view.value())
    }
}
