//! Nested mappers exposed as converters

use std::sync::Arc;

use fieldmap_convert::{ConversionError, ConversionRegistry, GenericConverter};
use fieldmap_model::{FieldType, Record, TypeRegistry, Value};

use crate::engine::Mapper;

/// Creates the target object a nested mapper maps onto
pub trait MappingTargetFactory: Send + Sync {
    fn create_target(&self, source: &Value, target_type: &FieldType) -> Value;
}

impl<F> MappingTargetFactory for F
where
    F: Fn(&Value, &FieldType) -> Value + Send + Sync,
{
    fn create_target(&self, source: &Value, target_type: &FieldType) -> Value {
        self(source, target_type)
    }
}

/// Creates typed records from a type registry, or named open records for
/// unregistered types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistryTargetFactory {
    types: Arc<TypeRegistry>,
}

impl TypeRegistryTargetFactory {
    pub fn new(types: impl Into<Arc<TypeRegistry>>) -> Self {
        Self {
            types: types.into(),
        }
    }
}

impl MappingTargetFactory for TypeRegistryTargetFactory {
    fn create_target(&self, _source: &Value, target_type: &FieldType) -> Value {
        match target_type {
            FieldType::Record(name) => self
                .types
                .new_instance(name)
                .unwrap_or_else(|_| Value::Record(Record::named(name.clone()))),
            _ => Value::Record(Record::open()),
        }
    }
}

/// Runs a nested mapper when the conversion registry needs to turn a record
/// of one type into another
pub struct MappingConverter {
    mapper: Arc<dyn Mapper>,
    target_factory: Arc<dyn MappingTargetFactory>,
}

impl MappingConverter {
    pub fn new(mapper: Arc<dyn Mapper>, target_factory: Arc<dyn MappingTargetFactory>) -> Self {
        Self {
            mapper,
            target_factory,
        }
    }
}

impl GenericConverter for MappingConverter {
    fn convert(
        &self,
        value: &Value,
        target: &FieldType,
        _registry: &ConversionRegistry,
    ) -> Result<Value, ConversionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mut created = self.target_factory.create_target(value, target);
        self.mapper
            .map_into(value, &mut created)
            .map_err(|error| {
                ConversionError::failed(value.type_key().to_string(), target.to_string(), error.to_string())
            })?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FieldMapper;
    use fieldmap_model::{FieldDescriptor, TypeDescriptor, TypeKey};

    #[test]
    fn test_converter_maps_into_created_target() {
        let mut types = TypeRegistry::new();
        types.register(
            TypeDescriptor::new("AddressDto").field(FieldDescriptor::new("town", FieldType::String)),
        );

        let mut nested = FieldMapper::between("Address", "AddressDto");
        nested.add_field_mapping("city", "town").unwrap();

        let mut registry = ConversionRegistry::new();
        registry.add_generic_converter(
            TypeKey::Record(Some("Address".to_string())),
            TypeKey::Record(Some("AddressDto".to_string())),
            Arc::new(MappingConverter::new(
                Arc::new(nested),
                Arc::new(TypeRegistryTargetFactory::new(types)),
            )),
        );

        let address = Value::Record(Record::named("Address").with("city", "Perth"));
        let converted = registry
            .convert(address, &FieldType::Record("AddressDto".to_string()))
            .unwrap();
        let record = converted.as_record().unwrap();
        assert!(record.is_typed());
        assert_eq!(record.get("town"), Some(&Value::from("Perth")));
    }

    #[test]
    fn test_closure_target_factory() {
        let factory = |_: &Value, _: &FieldType| Value::Record(Record::named("Custom"));
        let created = factory.create_target(&Value::Null, &FieldType::Any);
        assert_eq!(created.as_record().unwrap().type_name(), Some("Custom"));
    }
}
