//! Record nodes of the value tree

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{FieldType, TypeDescriptor};
use crate::value::Value;
use crate::{ModelError, Result};

/// An object with named fields.
///
/// Open records accept any field name. Typed records are bound to a
/// [`TypeDescriptor`] and only accept declared fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    type_name: Option<String>,
    descriptor: Option<Arc<TypeDescriptor>>,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an open, unnamed record
    #[must_use]
    pub fn open() -> Self {
        Self::default()
    }

    /// Create an open record carrying a type name but no descriptor
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Self::default()
        }
    }

    /// Create an empty record bound to a descriptor
    #[must_use]
    pub fn typed(descriptor: Arc<TypeDescriptor>) -> Self {
        Self {
            type_name: Some(descriptor.name.clone()),
            descriptor: Some(descriptor),
            fields: Vec::new(),
        }
    }

    /// Builder-style insert. Fields the record does not accept are dropped.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if let Err(error) = self.insert(name, value) {
            tracing::debug!(%error, "Dropping field while building record");
        }
        self
    }

    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    #[must_use]
    pub fn descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        self.descriptor.as_ref()
    }

    /// True when the record is bound to a descriptor
    #[must_use]
    pub fn is_typed(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Whether the record can hold a field with this name
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        match &self.descriptor {
            Some(descriptor) => descriptor.field_descriptor(name).is_some(),
            None => true,
        }
    }

    /// Whether the field may be assigned through a path expression
    #[must_use]
    pub fn is_writable(&self, name: &str) -> bool {
        match &self.descriptor {
            Some(descriptor) => descriptor.field_descriptor(name).is_some_and(|field| field.writable),
            None => true,
        }
    }

    /// Declared type of a field, `Any` for open records
    #[must_use]
    pub fn declared_type(&self, name: &str) -> FieldType {
        self.descriptor
            .as_ref()
            .and_then(|descriptor| descriptor.field_descriptor(name))
            .map_or(FieldType::Any, |field| field.field_type.clone())
    }

    /// Names of the fields this record exposes.
    ///
    /// Typed records report every declared field in declaration order; open
    /// records report the fields present, in insertion order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        match &self.descriptor {
            Some(descriptor) => descriptor.fields.iter().map(|f| f.name.clone()).collect(),
            None => self.fields.iter().map(|(name, _)| name.clone()).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a field, returning the previous value
    ///
    /// # Errors
    ///
    /// Returns an error when a typed record does not declare the field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let name = name.into();
        if !self.accepts(&name) {
            return Err(ModelError::unknown_field(
                self.type_name.clone().unwrap_or_default(),
                name,
            ));
        }
        let value = value.into();
        if let Some(slot) = self.get_mut(&name) {
            return Ok(Some(std::mem::replace(slot, value)));
        }
        self.fields.push((name, value));
        Ok(None)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    /// Iterate over the fields present, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Consume the record, yielding its fields in insertion order
    #[must_use]
    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.type_name {
            write!(f, "{name}")?;
        }
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldDescriptor;

    fn person_type() -> Arc<TypeDescriptor> {
        Arc::new(
            TypeDescriptor::new("Person")
                .field(FieldDescriptor::new("name", FieldType::String))
                .field(FieldDescriptor::new("age", FieldType::Integer))
                .field(FieldDescriptor::read_only("id", FieldType::Integer)),
        )
    }

    #[test]
    fn test_open_record_accepts_anything() {
        let mut record = Record::open();
        assert!(record.accepts("whatever"));
        assert!(record.is_writable("whatever"));
        record.insert("b", 2).unwrap();
        record.insert("a", 1).unwrap();

        assert_eq!(record.field_names(), vec!["b", "a"]);
        assert_eq!(record.declared_type("a"), FieldType::Any);
    }

    #[test]
    fn test_typed_record_rejects_undeclared_fields() {
        let mut record = Record::typed(person_type());
        let err = record.insert("nickname", "Kev").unwrap_err();
        assert_eq!(err, ModelError::unknown_field("Person", "nickname"));
        assert!(!record.contains("nickname"));
    }

    #[test]
    fn test_typed_record_reports_declared_fields() {
        let record = Record::typed(person_type()).with("age", 42);
        assert_eq!(record.field_names(), vec!["name", "age", "id"]);
        assert!(record.is_writable("name"));
        assert!(!record.is_writable("id"));
        assert_eq!(record.declared_type("age"), FieldType::Integer);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut record = Record::open().with("a", 1).with("b", 2);
        let previous = record.insert("a", 10).unwrap();
        assert_eq!(previous, Some(Value::Integer(1)));
        assert_eq!(record.field_names(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::Integer(10)));
    }

    #[test]
    fn test_display() {
        let record = Record::named("Point").with("x", 1).with("y", 2);
        assert_eq!(record.to_string(), "Point{x: 1, y: 2}");
    }
}
