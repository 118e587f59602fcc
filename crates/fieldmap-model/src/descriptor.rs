//! Type descriptors: explicit per-type schemas standing in for reflection

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::record::Record;
use crate::value::{TypeKey, Value};
use crate::{ModelError, Result};

/// Declared type of a record field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    /// Accepts any value without conversion
    #[default]
    Any,
    Boolean,
    Integer,
    Decimal,
    String,
    List,
    /// A record of the named type
    Record(String),
}

impl FieldType {
    /// Whether a value can be stored in a field of this type as-is
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null)
            | (FieldType::Any, _)
            | (FieldType::Boolean, Value::Boolean(_))
            | (FieldType::Integer, Value::Integer(_))
            | (FieldType::Decimal, Value::Decimal(_))
            | (FieldType::String, Value::String(_))
            | (FieldType::List, Value::List(_)) => true,
            (FieldType::Record(name), Value::Record(record)) => record.type_name() == Some(name.as_str()),
            _ => false,
        }
    }

    /// Converter lookup key for this type
    #[must_use]
    pub fn type_key(&self) -> TypeKey {
        match self {
            FieldType::Any => TypeKey::Any,
            FieldType::Boolean => TypeKey::Boolean,
            FieldType::Integer => TypeKey::Integer,
            FieldType::Decimal => TypeKey::Decimal,
            FieldType::String => TypeKey::String,
            FieldType::List => TypeKey::List,
            FieldType::Record(name) => TypeKey::Record(Some(name.clone())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.type_key(), f)
    }
}

/// A declared field of a type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    /// Read-only fields can be populated at construction but not mapped into
    pub writable: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            writable: true,
        }
    }

    pub fn read_only(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            writable: false,
            ..Self::new(name, field_type)
        }
    }
}

/// Schema of a typed record
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field declaration; a redeclared name replaces the earlier one
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Find a declared field
    #[must_use]
    pub fn field_descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Registry of named type descriptors
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one with the same name
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let descriptor = Arc::new(descriptor);
        tracing::debug!(type_name = %descriptor.name, "Registered type descriptor");
        self.types
            .insert(descriptor.name.clone(), Arc::clone(&descriptor));
        descriptor
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, sorted
    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Create an empty typed record
    ///
    /// # Errors
    ///
    /// Returns an error when the type is not registered.
    pub fn new_instance(&self, name: &str) -> Result<Value> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))?;
        Ok(Value::Record(Record::typed(descriptor)))
    }

    /// Bind an open record (for example decoded JSON) to a registered type.
    ///
    /// Record-valued fields whose declared type is also registered are bound
    /// recursively. Scalar values are kept as they are.
    ///
    /// # Errors
    ///
    /// Returns an error when the type is unknown, the value is not a record,
    /// or the record carries a field the type does not declare.
    pub fn instantiate(&self, name: &str, value: Value) -> Result<Value> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))?;

        let record = match value {
            Value::Null => return Ok(Value::Null),
            Value::Record(record) => record,
            other => return Err(ModelError::type_mismatch(format!("record<{name}>"), other.kind())),
        };

        let mut typed = Record::typed(Arc::clone(&descriptor));
        for (field_name, field_value) in record.into_fields() {
            let declared = descriptor
                .field_descriptor(&field_name)
                .ok_or_else(|| ModelError::unknown_field(name, &field_name))?;
            let field_value = match (&declared.field_type, field_value) {
                (FieldType::Record(nested), value @ Value::Record(_)) if self.contains(nested) => {
                    self.instantiate(nested, value)?
                }
                (_, value) => value,
            };
            typed.insert(field_name, field_value)?;
        }
        Ok(Value::Record(typed))
    }
}
