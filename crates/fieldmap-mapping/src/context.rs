//! Per-call mapping context

use std::sync::Arc;

use fieldmap_convert::{ConversionError, ConversionRegistry};
use fieldmap_expr::{Coercer, EvalError, EvaluationContext, Expression, PathExpression};
use fieldmap_model::{FieldType, Record, TypeRegistry, Value};

use crate::mappable::MappableType;
use crate::results::{MappingResult, MappingResults};

/// State of one mapping pass: the source and target, their views, the
/// shared registries, and the results recorded so far
pub struct MappingContext<'a> {
    source: &'a Value,
    target: &'a mut Value,
    source_type: Arc<dyn MappableType>,
    target_type: Arc<dyn MappableType>,
    conversions: &'a ConversionRegistry,
    types: &'a TypeRegistry,
    results: MappingResults,
}

impl<'a> MappingContext<'a> {
    pub fn new(
        source: &'a Value,
        target: &'a mut Value,
        source_type: Arc<dyn MappableType>,
        target_type: Arc<dyn MappableType>,
        conversions: &'a ConversionRegistry,
        types: &'a TypeRegistry,
    ) -> Self {
        Self {
            source,
            target,
            source_type,
            target_type,
            conversions,
            types,
            results: MappingResults::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &'a Value {
        self.source
    }

    #[must_use]
    pub fn target(&self) -> &Value {
        &*self.target
    }

    pub fn target_mut(&mut self) -> &mut Value {
        &mut *self.target
    }

    /// Field names the source view offers for auto-mapping
    #[must_use]
    pub fn source_field_names(&self) -> Vec<String> {
        self.source_type.field_names(self.source)
    }

    /// Ask the target view whether a path can be written
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be resolved on the target.
    pub fn is_target_field_writable(&self, path: &PathExpression) -> Result<bool, EvalError> {
        let coercer = RegistryCoercer::new(self.conversions, self.types);
        self.target_type.is_writable(&*self.target, path, &coercer)
    }

    /// Evaluate a guard with the source as root and `#source` and `#target`
    /// bound
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation fails or the result is not boolean.
    pub fn evaluate_condition(&self, condition: &Expression) -> Result<bool, EvalError> {
        let target: &Value = &*self.target;
        let context = EvaluationContext::new(self.source)
            .with_variable("source", self.source)
            .with_variable("target", target);
        condition.evaluate_condition(&context)
    }

    /// Evaluate a source expression
    ///
    /// # Errors
    ///
    /// Returns an error when evaluation fails.
    pub fn read(&self, expression: &Expression) -> Result<Value, EvalError> {
        let context = EvaluationContext::new(self.source).with_variable("source", self.source);
        expression.evaluate(&context)
    }

    /// Write a value to a target path, converting it to the declared type of
    /// the location
    ///
    /// # Errors
    ///
    /// Returns an error when the path cannot be written or the value cannot
    /// be converted.
    pub fn write(&mut self, path: &PathExpression, value: Value) -> Result<(), EvalError> {
        let coercer = RegistryCoercer::new(self.conversions, self.types);
        path.write(&mut *self.target, value, &coercer)
    }

    pub fn record(&mut self, result: MappingResult) {
        self.results.add(result);
    }

    #[must_use]
    pub fn results(&self) -> &MappingResults {
        &self.results
    }

    #[must_use]
    pub fn into_results(self) -> MappingResults {
        self.results
    }
}

/// Coerces written values through the conversion registry, falling back to
/// binding open records to registered types
pub(crate) struct RegistryCoercer<'a> {
    conversions: &'a ConversionRegistry,
    types: &'a TypeRegistry,
}

impl<'a> RegistryCoercer<'a> {
    pub(crate) fn new(conversions: &'a ConversionRegistry, types: &'a TypeRegistry) -> Self {
        Self { conversions, types }
    }
}

impl Coercer for RegistryCoercer<'_> {
    fn coerce(&self, value: Value, declared: &FieldType) -> Result<Value, EvalError> {
        if declared.accepts(&value) {
            return Ok(value);
        }

        let from = value.type_key();
        if self.conversions.find_converter(&from, &declared.type_key()).is_none() {
            if let (FieldType::Record(name), Value::Record(record)) = (declared, &value) {
                if !record.is_typed() && self.types.contains(name) {
                    return self.types.instantiate(name, value).map_err(|error| {
                        EvalError::conversion(from.to_string(), declared.to_string(), error.to_string())
                    });
                }
            }
        }

        self.conversions
            .convert(value, declared)
            .map_err(|error| conversion_failure(&from.to_string(), declared, &error))
    }

    fn instantiate(&self, declared: &FieldType) -> Value {
        match declared {
            FieldType::Record(name) => self
                .types
                .new_instance(name)
                .unwrap_or_else(|_| Value::Record(Record::named(name.clone()))),
            _ => Value::Record(Record::open()),
        }
    }
}

fn conversion_failure(from: &str, to: &FieldType, error: &ConversionError) -> EvalError {
    EvalError::conversion(from, to.to_string(), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mappable::{DefaultMappableTypeFactory, MappableTypeFactory};
    use fieldmap_model::{FieldDescriptor, TypeDescriptor};

    fn registry() -> TypeRegistry {
        let mut types = TypeRegistry::new();
        types.register(
            TypeDescriptor::new("AddressDto").field(FieldDescriptor::new("city", FieldType::String)),
        );
        types.register(
            TypeDescriptor::new("PersonDto")
                .field(FieldDescriptor::new("age", FieldType::Integer))
                .field(FieldDescriptor::new(
                    "address",
                    FieldType::Record("AddressDto".to_string()),
                )),
        );
        types
    }

    #[test]
    fn test_write_converts_and_instantiates() {
        let types = registry();
        let conversions = ConversionRegistry::with_defaults();
        let factory = DefaultMappableTypeFactory::new();
        let source = Value::Record(Record::open().with("age", "42"));
        let mut target = types.new_instance("PersonDto").unwrap();
        let source_type = factory.mappable_type(&source);
        let target_type = factory.mappable_type(&target);

        let mut context = MappingContext::new(
            &source,
            &mut target,
            source_type,
            target_type,
            &conversions,
            &types,
        );
        let age = context.read(&Expression::parse("age").unwrap()).unwrap();
        context.write(&PathExpression::parse("age").unwrap(), age).unwrap();
        context
            .write(&PathExpression::parse("address.city").unwrap(), Value::from("Perth"))
            .unwrap();
        drop(context);

        assert_eq!(target.field("age"), Some(&Value::from(42)));
        let address = target.field("address").and_then(Value::as_record).unwrap();
        assert!(address.is_typed());
        assert_eq!(address.type_name(), Some("AddressDto"));
    }

    #[test]
    fn test_writability_follows_declared_intermediates() {
        let types = registry();
        let conversions = ConversionRegistry::new();
        let factory = DefaultMappableTypeFactory::new();
        let source = Value::Record(Record::open());
        let mut target = types.new_instance("PersonDto").unwrap();
        let source_type = factory.mappable_type(&source);
        let target_type = factory.mappable_type(&target);
        let context = MappingContext::new(
            &source,
            &mut target,
            source_type,
            target_type,
            &conversions,
            &types,
        );

        let city = PathExpression::parse("address.city").unwrap();
        let zip = PathExpression::parse("address.zip").unwrap();
        assert!(context.is_target_field_writable(&city).unwrap());
        assert!(!context.is_target_field_writable(&zip).unwrap());
    }

    #[test]
    fn test_open_record_bound_to_declared_type() {
        let types = registry();
        let conversions = ConversionRegistry::with_defaults();
        let coercer = RegistryCoercer::new(&conversions, &types);

        let open = Value::Record(Record::open().with("city", "Perth"));
        let bound = coercer
            .coerce(open, &FieldType::Record("AddressDto".to_string()))
            .unwrap();
        assert_eq!(bound.as_record().unwrap().type_name(), Some("AddressDto"));

        let err = coercer
            .coerce(Value::from("x"), &FieldType::Record("AddressDto".to_string()))
            .unwrap_err();
        assert!(matches!(err, EvalError::Conversion { .. }));
    }

    #[test]
    fn test_condition_sees_target() {
        let types = TypeRegistry::new();
        let conversions = ConversionRegistry::new();
        let factory = DefaultMappableTypeFactory::new();
        let source = Value::Record(Record::open().with("status", "NEW"));
        let mut target = Value::Record(Record::open().with("status", "OLD"));
        let source_type = factory.mappable_type(&source);
        let target_type = factory.mappable_type(&target);
        let context = MappingContext::new(
            &source,
            &mut target,
            source_type,
            target_type,
            &conversions,
            &types,
        );

        let changed = Expression::parse("#target.status != #source.status").unwrap();
        assert!(context.evaluate_condition(&changed).unwrap());
        assert_eq!(context.source_field_names(), vec!["status"]);
    }
}
