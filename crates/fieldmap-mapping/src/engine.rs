//! The field mapping engine

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use fieldmap_convert::{ConversionRegistry, Converter};
use fieldmap_expr::{EvalError, Expression, PathExpression};
use fieldmap_model::{Record, TypeKey, TypeRegistry, Value};
use serde::{Deserialize, Serialize};

use crate::context::{MappingContext, RegistryCoercer};
use crate::entry::{AssemblySource, MappingEntry};
use crate::mappable::{DefaultMappableTypeFactory, MappableTypeFactory};
use crate::nested::{MappingConverter, MappingTargetFactory};
use crate::results::MappingResults;
use crate::scope::MappingScope;
use crate::{MappingError, Result};

/// Maps a source object onto a target object
pub trait Mapper: Send + Sync {
    /// Map `source` onto `target` in place
    ///
    /// # Errors
    ///
    /// Returns an error when the mapping fails.
    fn map_into(&self, source: &Value, target: &mut Value) -> Result<()>;

    /// Source and target kinds this mapper handles, when known
    fn type_info(&self) -> Option<(TypeKey, TypeKey)> {
        None
    }
}

impl<F> Mapper for F
where
    F: Fn(&Value, &mut Value) -> Result<()> + Send + Sync,
{
    fn map_into(&self, source: &Value, target: &mut Value) -> Result<()> {
        self(source, target)
    }
}

/// What to do with failures at the end of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failure fails the call
    #[default]
    Raise,
    /// Only failures of severity `Error` fail the call
    RaiseOnErrors,
    /// Failures are logged and returned with the results
    Collect,
}

/// Target and results of a pass
#[derive(Debug, Clone)]
pub struct MappingOutcome {
    pub target: Value,
    pub results: MappingResults,
}

/// Copies values from source objects onto target objects through declared
/// and auto-discovered field correspondences.
///
/// Registration takes `&mut self` and mapping takes `&self`, so a configured
/// mapper can be shared behind an `Arc` and used from several threads.
pub struct FieldMapper {
    entries: Vec<MappingEntry>,
    auto_mapping: bool,
    excluded_fields: BTreeSet<String>,
    mappable_types: Arc<dyn MappableTypeFactory>,
    conversions: ConversionRegistry,
    types: Arc<TypeRegistry>,
    failure_policy: FailurePolicy,
    source_type: Option<String>,
    target_type: Option<String>,
}

impl FieldMapper {
    /// Create a mapper with auto-mapping on and the default converters
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            auto_mapping: true,
            excluded_fields: BTreeSet::new(),
            mappable_types: Arc::new(DefaultMappableTypeFactory::new()),
            conversions: ConversionRegistry::with_defaults(),
            types: Arc::new(TypeRegistry::new()),
            failure_policy: FailurePolicy::default(),
            source_type: None,
            target_type: None,
        }
    }

    /// Create a mapper between two named record types. The types are
    /// reported through [`Mapper::type_info`] when this mapper is nested.
    pub fn between(source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            source_type: Some(source_type.into()),
            target_type: Some(target_type.into()),
            ..Self::new()
        }
    }

    /// Map a field to a field, with an optional converter and guard
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an expression does not parse or
    /// the target is not assignable.
    pub fn add_field_to_field_mapping(
        &mut self,
        source: &str,
        target: &str,
        converter: Option<Arc<dyn Converter>>,
        condition: Option<&str>,
    ) -> Result<()> {
        let entry = MappingEntry::FieldToField {
            source: parse_source(source)?,
            target: parse_target(target)?,
            converter,
            condition: parse_condition(condition)?,
        };
        self.add_entry(entry);
        Ok(())
    }

    /// Map a field to a field without converter or guard
    ///
    /// # Errors
    ///
    /// See [`FieldMapper::add_field_to_field_mapping`].
    pub fn add_field_mapping(&mut self, source: &str, target: &str) -> Result<()> {
        self.add_field_to_field_mapping(source, target, None, None)
    }

    /// Map one source value onto several target fields through a nested
    /// mapper
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an expression does not parse.
    pub fn add_field_to_multi_field_mapping(
        &mut self,
        source: &str,
        mapper: Arc<dyn Mapper>,
        condition: Option<&str>,
    ) -> Result<()> {
        let entry = MappingEntry::FieldToMultiField {
            source: parse_source(source)?,
            mapper,
            condition: parse_condition(condition)?,
        };
        self.add_entry(entry);
        Ok(())
    }

    /// Hand the whole source and target to a nested mapper, claiming the
    /// listed source fields so they are not auto-mapped
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the guard does not parse.
    pub fn add_multi_field_to_field_mapping(
        &mut self,
        fields: &[&str],
        mapper: Arc<dyn Mapper>,
        condition: Option<&str>,
    ) -> Result<()> {
        let entry = MappingEntry::Flexible {
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
            mapper,
            condition: parse_condition(condition)?,
        };
        self.add_entry(entry);
        Ok(())
    }

    /// Assemble several source values into one target value. The assembler
    /// receives an open record keyed by source expression text.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when an expression does not parse or
    /// the target is not assignable.
    pub fn add_assembled_field_mapping(
        &mut self,
        sources: &[&str],
        target: &str,
        assembler: Arc<dyn Converter>,
        condition: Option<&str>,
    ) -> Result<()> {
        let sources = sources
            .iter()
            .map(|source| parse_source(source))
            .collect::<Result<Vec<_>>>()?;
        let entry = MappingEntry::Assembled {
            sources: AssemblySource::Fields(sources),
            target: parse_target(target)?,
            assembler,
            condition: parse_condition(condition)?,
        };
        self.add_entry(entry);
        Ok(())
    }

    /// Assemble every source field named `prefix.<suffix>` into one target
    /// value. The assembler receives an open record keyed by suffix.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the prefix is empty, the target is
    /// not assignable, or the guard does not parse.
    pub fn add_nested_fields_mapping(
        &mut self,
        prefix: &str,
        target: &str,
        assembler: Arc<dyn Converter>,
        condition: Option<&str>,
    ) -> Result<()> {
        if prefix.is_empty() {
            return Err(MappingError::InvalidConfiguration(
                "The nested field prefix cannot be empty".to_string(),
            ));
        }
        let entry = MappingEntry::Assembled {
            sources: AssemblySource::Prefix(prefix.to_string()),
            target: parse_target(target)?,
            assembler,
            condition: parse_condition(condition)?,
        };
        self.add_entry(entry);
        Ok(())
    }

    /// Register a nested mapper for the source and target kinds it reports
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the mapper does not report its
    /// types.
    pub fn add_nested_mapper(
        &mut self,
        mapper: Arc<dyn Mapper>,
        target_factory: Arc<dyn MappingTargetFactory>,
    ) -> Result<()> {
        let (source_type, target_type) = mapper.type_info().ok_or_else(|| {
            MappingError::InvalidConfiguration(
                "Unable to determine the source and target types of the nested mapper".to_string(),
            )
        })?;
        self.add_nested_mapper_for(source_type, target_type, mapper, target_factory)
    }

    /// Register a nested mapper used whenever a value of `source_type` is
    /// written to a location declared as `target_type`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the target kind is not a record.
    pub fn add_nested_mapper_for(
        &mut self,
        source_type: TypeKey,
        target_type: TypeKey,
        mapper: Arc<dyn Mapper>,
        target_factory: Arc<dyn MappingTargetFactory>,
    ) -> Result<()> {
        if !matches!(target_type, TypeKey::Record(_)) {
            return Err(MappingError::InvalidConfiguration(format!(
                "Nested mappers must produce records, not {target_type}"
            )));
        }
        tracing::debug!(%source_type, %target_type, "Registered nested mapper");
        self.conversions.add_generic_converter(
            source_type,
            target_type,
            Arc::new(MappingConverter::new(mapper, target_factory)),
        );
        Ok(())
    }

    pub fn set_auto_mapping_enabled(&mut self, enabled: bool) {
        self.auto_mapping = enabled;
    }

    #[must_use]
    pub fn is_auto_mapping_enabled(&self) -> bool {
        self.auto_mapping
    }

    /// Source fields that are never auto-mapped
    pub fn set_excluded_fields<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields = fields.into_iter().map(Into::into).collect();
    }

    pub fn set_mappable_type_factory(&mut self, factory: Arc<dyn MappableTypeFactory>) {
        self.mappable_types = factory;
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.failure_policy = policy;
    }

    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Types used to create intermediate records and bind open records
    pub fn set_type_registry(&mut self, types: impl Into<Arc<TypeRegistry>>) {
        self.types = types.into();
    }

    #[must_use]
    pub fn type_registry(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    #[must_use]
    pub fn converter_registry(&self) -> &ConversionRegistry {
        &self.conversions
    }

    pub fn converter_registry_mut(&mut self) -> &mut ConversionRegistry {
        &mut self.conversions
    }

    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    #[must_use]
    pub fn source_type(&self) -> Option<&str> {
        self.source_type.as_deref()
    }

    #[must_use]
    pub fn target_type(&self) -> Option<&str> {
        self.target_type.as_deref()
    }

    /// Bind an open source record to the declared source type when that
    /// type is registered; other values are returned as they are
    ///
    /// # Errors
    ///
    /// Returns an error when the record does not fit the declared type.
    pub fn bind_source(&self, source: Value) -> Result<Value> {
        match &self.source_type {
            Some(name) if self.types.contains(name) => Ok(self.types.instantiate(name, source)?),
            _ => Ok(source),
        }
    }

    /// Create an empty target: a typed record when the declared target type
    /// is registered, a named or open record otherwise
    #[must_use]
    pub fn new_target(&self) -> Value {
        match &self.target_type {
            Some(name) => self
                .types
                .new_instance(name)
                .unwrap_or_else(|_| Value::Record(Record::named(name.clone()))),
            None => Value::Record(Record::open()),
        }
    }

    /// Map `source` onto `target` and return the target
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingArgument`] for a null source or target
    /// and [`MappingError::Failures`] when the failure policy raises.
    pub fn map(&self, source: &Value, mut target: Value) -> Result<Value> {
        self.map_into(source, &mut target)?;
        Ok(target)
    }

    /// Map and return every result regardless of the failure policy
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingArgument`] for a null source or target.
    pub fn map_with_results(&self, source: &Value, mut target: Value) -> Result<MappingOutcome> {
        let results = self.run(source, &mut target)?;
        Ok(MappingOutcome { target, results })
    }

    /// Auto-mappings a pass would apply for this source and target
    #[must_use]
    pub fn auto_mappings(&self, source: &Value, target: &Value) -> Vec<MappingEntry> {
        let source_type = self.mappable_types.mappable_type(source);
        let target_type = self.mappable_types.mappable_type(target);
        let coercer = RegistryCoercer::new(&self.conversions, &self.types);
        self.collect_auto_mappings(source_type.field_names(source), |path| {
            target_type.is_writable(target, path, &coercer)
        })
    }

    fn add_entry(&mut self, entry: MappingEntry) {
        if self.entries.contains(&entry) {
            tracing::debug!(%entry, "Ignoring duplicate mapping");
            return;
        }
        self.entries.push(entry);
    }

    fn run(&self, source: &Value, target: &mut Value) -> Result<MappingResults> {
        if source.is_null() {
            return Err(MappingError::MissingArgument { role: "source" });
        }
        if target.is_null() {
            return Err(MappingError::MissingArgument { role: "target" });
        }

        let _scope = MappingScope::enter(source.type_key().to_string());
        let span = tracing::debug_span!(
            "map",
            source = %source.type_key(),
            target = %target.type_key(),
            depth = MappingScope::depth()
        );
        let _entered = span.enter();

        let source_type = self.mappable_types.mappable_type(source);
        let target_type = self.mappable_types.mappable_type(target);
        let mut context = MappingContext::new(
            source,
            target,
            source_type,
            target_type,
            &self.conversions,
            &self.types,
        );

        for entry in &self.entries {
            tracing::debug!("{}{entry}", MappingScope::level());
            entry.map(&mut context, false);
        }

        let auto = self.collect_auto_mappings(context.source_field_names(), |path| {
            context.is_target_field_writable(path)
        });
        for entry in &auto {
            tracing::debug!("{}{entry} (auto)", MappingScope::level());
            entry.map(&mut context, true);
        }

        Ok(context.into_results())
    }

    fn collect_auto_mappings(
        &self,
        fields: Vec<String>,
        is_writable: impl Fn(&PathExpression) -> std::result::Result<bool, EvalError>,
    ) -> Vec<MappingEntry> {
        if !self.auto_mapping {
            return Vec::new();
        }

        let mut auto = Vec::new();
        for field in fields {
            if self.excluded_fields.contains(&field) {
                tracing::debug!(field, "Excluded from auto-mapping");
                continue;
            }
            if self.explicitly_mapped(&field) {
                continue;
            }
            let target = PathExpression::property(field.as_str());
            match is_writable(&target) {
                Ok(true) => auto.push(MappingEntry::FieldToField {
                    source: Expression::property(field.as_str()),
                    target,
                    converter: None,
                    condition: None,
                }),
                Ok(false) => tracing::debug!(field, "Target field not writable, not auto-mapping"),
                Err(error) => tracing::debug!(field, %error, "Target field not resolvable, not auto-mapping"),
            }
        }
        auto
    }

    fn explicitly_mapped(&self, field: &str) -> bool {
        self.entries.iter().any(|entry| entry.maps_field(field))
    }

    fn handle_failures(&self, results: MappingResults) -> Result<()> {
        let raise = match self.failure_policy {
            FailurePolicy::Raise => results.has_failures(),
            FailurePolicy::RaiseOnErrors => results.has_errors(),
            FailurePolicy::Collect => false,
        };
        if raise {
            return Err(MappingError::Failures(results));
        }
        for failure in results.failures() {
            tracing::warn!(%failure, "Mapping failure");
        }
        Ok(())
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper for FieldMapper {
    fn map_into(&self, source: &Value, target: &mut Value) -> Result<()> {
        let results = self.run(source, target)?;
        self.handle_failures(results)
    }

    fn type_info(&self) -> Option<(TypeKey, TypeKey)> {
        match (&self.source_type, &self.target_type) {
            (Some(source), Some(target)) => Some((
                TypeKey::Record(Some(source.clone())),
                TypeKey::Record(Some(target.clone())),
            )),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapper")
            .field("entries", &self.entries)
            .field("auto_mapping", &self.auto_mapping)
            .field("excluded_fields", &self.excluded_fields)
            .field("failure_policy", &self.failure_policy)
            .field("source_type", &self.source_type)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

fn parse_source(text: &str) -> Result<Expression> {
    Expression::parse(text).map_err(|source| MappingError::configuration("source", text, source))
}

fn parse_target(text: &str) -> Result<PathExpression> {
    PathExpression::parse(text).map_err(|source| MappingError::configuration("target", text, source))
}

fn parse_condition(condition: Option<&str>) -> Result<Option<Expression>> {
    condition
        .map(|text| {
            Expression::parse(text)
                .map_err(|source| MappingError::configuration("condition", text, source))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{FailureCause, Severity};

    fn person() -> Value {
        Value::Record(Record::open().with("name", "Keith").with("age", 42))
    }

    #[test]
    fn test_auto_maps_matching_fields() {
        let mapper = FieldMapper::new();
        let target = mapper.map(&person(), Value::Record(Record::open())).unwrap();
        assert_eq!(target.field("name"), Some(&Value::from("Keith")));
        assert_eq!(target.field("age"), Some(&Value::from(42)));
    }

    #[test]
    fn test_registration_rejects_bad_expressions() {
        let mut mapper = FieldMapper::new();
        let err = mapper.add_field_mapping("name ==", "fullName").unwrap_err();
        assert!(matches!(err, MappingError::Configuration { role: "source", .. }));

        let err = mapper.add_field_mapping("name", "full + name").unwrap_err();
        assert!(matches!(err, MappingError::Configuration { role: "target", .. }));

        let err = mapper
            .add_field_to_field_mapping("name", "fullName", None, Some("age >"))
            .unwrap_err();
        assert!(matches!(err, MappingError::Configuration { role: "condition", .. }));
        assert!(mapper.entries().is_empty());
    }

    #[test]
    fn test_duplicates_are_suppressed() {
        let mut mapper = FieldMapper::new();
        mapper.add_field_mapping("name", "fullName").unwrap();
        mapper.add_field_mapping("name", "fullName").unwrap();
        mapper
            .add_field_to_field_mapping("name", "fullName", None, Some("age > 1"))
            .unwrap();
        assert_eq!(mapper.entries().len(), 2);
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        let mapper = FieldMapper::new();
        assert!(matches!(
            mapper.map(&Value::Null, Value::Record(Record::open())),
            Err(MappingError::MissingArgument { role: "source" })
        ));
        assert!(matches!(
            mapper.map(&person(), Value::Null),
            Err(MappingError::MissingArgument { role: "target" })
        ));
    }

    #[test]
    fn test_failure_policies() {
        let mut mapper = FieldMapper::new();
        mapper.set_auto_mapping_enabled(false);
        mapper.add_field_mapping("address.city", "city").unwrap();
        mapper.add_field_mapping("name", "fullName").unwrap();

        let err = mapper.map(&person(), Value::Record(Record::open())).unwrap_err();
        let MappingError::Failures(results) = err else {
            panic!("expected failures");
        };
        assert_eq!(results.len(), 2);
        let failure = results.get(0).unwrap();
        assert_eq!(failure.severity(), Some(Severity::Error));
        assert!(matches!(failure.cause(), Some(FailureCause::Read(_))));
        assert!(results.get(1).unwrap().is_success());

        mapper.set_failure_policy(FailurePolicy::Collect);
        let target = mapper.map(&person(), Value::Record(Record::open())).unwrap();
        assert_eq!(target.field("fullName"), Some(&Value::from("Keith")));
    }

    #[test]
    fn test_type_info_from_between() {
        assert_eq!(FieldMapper::new().type_info(), None);
        assert_eq!(
            FieldMapper::between("Address", "AddressDto").type_info(),
            Some((
                TypeKey::Record(Some("Address".to_string())),
                TypeKey::Record(Some("AddressDto".to_string()))
            ))
        );
    }
}
