//! Mapping DSL
//!
//! Declarative YAML form of a mapper: the record types involved, the engine
//! settings, and the mapping rules. [`MappingDefinition::build`] turns a
//! parsed definition into a configured [`FieldMapper`].

use std::sync::Arc;

use fieldmap_convert::{Converter, Transform};
use fieldmap_model::{FieldDescriptor, FieldType, TypeDescriptor, TypeRegistry};
use serde::{Deserialize, Serialize};

use crate::engine::{FailurePolicy, FieldMapper};
use crate::nested::TypeRegistryTargetFactory;
use crate::{MappingError, Result};

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

/// A complete mapping definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingDefinition {
    /// Mapping name
    #[serde(default)]
    pub name: String,

    /// Declared source record type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Declared target record type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub auto_mapping: bool,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Source fields never auto-mapped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_fields: Vec<String>,

    /// Record types used by this mapping and its nested mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDefinition>,

    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

/// A named record type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

/// One declared field of a record type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    /// Record type name for `record` fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of: Option<String>,

    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub writable: bool,
}

/// Field kinds as written in YAML
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Any,
    Boolean,
    Integer,
    Decimal,
    String,
    List,
    Record,
}

/// Individual mapping rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingRule {
    /// Field-to-field mapping
    Field {
        source: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<Transform>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },

    /// One source value mapped onto the target by a nested mapping
    FanOut {
        source: String,
        mapping: Box<MappingDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },

    /// The whole source mapped by a nested mapping that claims the listed
    /// source fields
    MultiSource {
        sources: Vec<String>,
        mapping: Box<MappingDefinition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },

    /// Several source values joined by an assembler
    Assemble {
        sources: Vec<String>,
        target: String,
        assembler: Transform,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },

    /// Every `prefix.<suffix>` source field joined by an assembler
    NestedFields {
        prefix: String,
        target: String,
        assembler: Transform,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        when: Option<String>,
    },

    /// Mapper used whenever a record of the nested mapping's source type is
    /// written to a field of its target type
    Nested { mapping: Box<MappingDefinition> },
}

/// DSL parser
pub struct MappingDsl;

/// Parse error type
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, " at line {line}, column {col}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl MappingDsl {
    /// Parse a mapping from YAML
    ///
    /// # Errors
    ///
    /// Returns an error when YAML parsing fails.
    pub fn parse(yaml: &str) -> std::result::Result<MappingDefinition, ParseError> {
        serde_yaml::from_str(yaml).map_err(|e| ParseError {
            message: format!("Failed to parse mapping: {e}"),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
        })
    }

    /// Parse a mapping from a file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn parse_file(
        path: &std::path::Path,
    ) -> std::result::Result<MappingDefinition, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|e| ParseError {
            message: format!("Failed to read {}: {e}", path.display()),
            line: None,
            column: None,
        })?;
        Self::parse(&content)
    }

    /// Serialize a mapping to YAML
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_yaml(mapping: &MappingDefinition) -> std::result::Result<String, ParseError> {
        serde_yaml::to_string(mapping).map_err(|e| ParseError {
            message: format!("Failed to serialize: {e}"),
            line: None,
            column: None,
        })
    }
}

impl MappingDefinition {
    /// Build the type registry declared by this definition and its nested
    /// mappings
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a `record` field names no type.
    pub fn type_registry(&self) -> Result<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        self.register_types(&mut registry)?;
        Ok(registry)
    }

    /// Build a configured mapper
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a type declaration or an
    /// expression is invalid.
    pub fn build(&self) -> Result<FieldMapper> {
        let types = Arc::new(self.type_registry()?);
        self.build_with(&types)
    }

    fn register_types(&self, registry: &mut TypeRegistry) -> Result<()> {
        for definition in &self.types {
            let mut descriptor = TypeDescriptor::new(definition.name.as_str());
            for field in &definition.fields {
                let field_type = field_type(&definition.name, field)?;
                descriptor = descriptor.field(FieldDescriptor {
                    name: field.name.clone(),
                    field_type,
                    writable: field.writable,
                });
            }
            registry.register(descriptor);
        }
        for rule in &self.rules {
            if let MappingRule::FanOut { mapping, .. }
            | MappingRule::MultiSource { mapping, .. }
            | MappingRule::Nested { mapping } = rule
            {
                mapping.register_types(registry)?;
            }
        }
        Ok(())
    }

    fn build_with(&self, types: &Arc<TypeRegistry>) -> Result<FieldMapper> {
        let mut mapper = match (&self.source_type, &self.target_type) {
            (Some(source), Some(target)) => FieldMapper::between(source.as_str(), target.as_str()),
            _ => FieldMapper::new(),
        };
        mapper.set_type_registry(Arc::clone(types));
        mapper.set_auto_mapping_enabled(self.auto_mapping);
        mapper.set_failure_policy(self.failure_policy);
        mapper.set_excluded_fields(self.excluded_fields.iter().cloned());

        for rule in &self.rules {
            match rule {
                MappingRule::Field {
                    source,
                    target,
                    transform,
                    when,
                } => {
                    let converter = transform
                        .clone()
                        .map(|transform| Arc::new(transform) as Arc<dyn Converter>);
                    mapper.add_field_to_field_mapping(source, target, converter, when.as_deref())?;
                }
                MappingRule::FanOut {
                    source,
                    mapping,
                    when,
                } => {
                    let nested = mapping.build_with(types)?;
                    mapper.add_field_to_multi_field_mapping(source, Arc::new(nested), when.as_deref())?;
                }
                MappingRule::MultiSource {
                    sources,
                    mapping,
                    when,
                } => {
                    let nested = mapping.build_with(types)?;
                    let fields: Vec<&str> = sources.iter().map(String::as_str).collect();
                    mapper.add_multi_field_to_field_mapping(&fields, Arc::new(nested), when.as_deref())?;
                }
                MappingRule::Assemble {
                    sources,
                    target,
                    assembler,
                    when,
                } => {
                    let sources: Vec<&str> = sources.iter().map(String::as_str).collect();
                    mapper.add_assembled_field_mapping(
                        &sources,
                        target,
                        Arc::new(assembler.clone()),
                        when.as_deref(),
                    )?;
                }
                MappingRule::NestedFields {
                    prefix,
                    target,
                    assembler,
                    when,
                } => {
                    mapper.add_nested_fields_mapping(
                        prefix,
                        target,
                        Arc::new(assembler.clone()),
                        when.as_deref(),
                    )?;
                }
                MappingRule::Nested { mapping } => {
                    if mapping.source_type.is_none() || mapping.target_type.is_none() {
                        return Err(MappingError::InvalidConfiguration(format!(
                            "Nested mapping '{}' must declare source_type and target_type",
                            mapping.name
                        )));
                    }
                    let nested = mapping.build_with(types)?;
                    mapper.add_nested_mapper(
                        Arc::new(nested),
                        Arc::new(TypeRegistryTargetFactory::new(Arc::clone(types))),
                    )?;
                }
            }
        }

        tracing::debug!(
            name = %self.name,
            entries = mapper.entries().len(),
            "Built mapping"
        );
        Ok(mapper)
    }
}

fn field_type(type_name: &str, field: &FieldDefinition) -> Result<FieldType> {
    Ok(match field.kind {
        FieldKind::Any => FieldType::Any,
        FieldKind::Boolean => FieldType::Boolean,
        FieldKind::Integer => FieldType::Integer,
        FieldKind::Decimal => FieldType::Decimal,
        FieldKind::String => FieldType::String,
        FieldKind::List => FieldType::List,
        FieldKind::Record => {
            let of = field.of.clone().ok_or_else(|| {
                MappingError::InvalidConfiguration(format!(
                    "Field '{}.{}' is a record but does not name its type with 'of'",
                    type_name, field.name
                ))
            })?;
            FieldType::Record(of)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldmap_model::{Record, Value};

    const PERSON: &str = r#"
name: person_to_dto
source_type: Person
target_type: PersonDto
excluded_fields: [password]
types:
  - name: PersonDto
    fields:
      - { name: fullName, type: string }
      - { name: age, type: integer }
      - { name: password, type: string }
      - { name: id, type: integer, writable: false }
rules:
  - type: field
    source: name
    target: fullName
    transform: { op: uppercase }
    when: "age >= 18"
"#;

    #[test]
    fn test_parse_definition() {
        let mapping = MappingDsl::parse(PERSON).unwrap();
        assert_eq!(mapping.name, "person_to_dto");
        assert_eq!(mapping.source_type.as_deref(), Some("Person"));
        assert!(mapping.auto_mapping);
        assert_eq!(mapping.failure_policy, FailurePolicy::Raise);
        assert_eq!(mapping.types[0].fields[3].kind, FieldKind::Integer);
        assert!(!mapping.types[0].fields[3].writable);

        match &mapping.rules[0] {
            MappingRule::Field {
                source,
                target,
                transform,
                when,
            } => {
                assert_eq!(source, "name");
                assert_eq!(target, "fullName");
                assert_eq!(transform, &Some(Transform::Uppercase));
                assert_eq!(when.as_deref(), Some("age >= 18"));
            }
            _ => panic!("Expected Field rule"),
        }
    }

    #[test]
    fn test_build_and_map() {
        let mapper = MappingDsl::parse(PERSON).unwrap().build().unwrap();
        let source = Value::Record(
            Record::open()
                .with("name", "Keith")
                .with("age", 42)
                .with("password", "secret"),
        );

        let target = mapper.map(&source, mapper.new_target()).unwrap();
        assert_eq!(target.field("fullName"), Some(&Value::from("KEITH")));
        assert_eq!(target.field("age"), Some(&Value::from(42)));
        assert_eq!(target.field("password"), None);
        assert_eq!(target.as_record().unwrap().type_name(), Some("PersonDto"));
    }

    #[test]
    fn test_parse_errors_carry_location() {
        let err = MappingDsl::parse("name: [unclosed").unwrap_err();
        assert!(err.message.contains("Failed to parse mapping"));
        assert!(err.line.is_some());

        let err = MappingDsl::parse("name: x\nrules:\n  - type: teleport\n").unwrap_err();
        assert!(err.message.contains("teleport"));
    }

    #[test]
    fn test_bad_expression_fails_build() {
        let yaml = r"
name: broken
rules:
  - type: field
    source: name
    target: 'full name'
";
        let err = MappingDsl::parse(yaml).unwrap().build().unwrap_err();
        assert!(matches!(err, MappingError::Configuration { role: "target", .. }));
    }

    #[test]
    fn test_record_fields_need_a_type() {
        let yaml = r"
name: broken
types:
  - name: Order
    fields:
      - { name: customer, type: record }
";
        let err = MappingDsl::parse(yaml).unwrap().build().unwrap_err();
        assert!(err.to_string().contains("Order.customer"));
    }

    #[test]
    fn test_repeated_rules_register_once() {
        let yaml = r"
name: repeated
rules:
  - { type: field, source: name, target: fullName, transform: { op: trim } }
  - { type: field, source: name, target: fullName, transform: { op: trim } }
  - { type: field, source: name, target: fullName, transform: { op: uppercase } }
  - { type: assemble, sources: [first, last], target: sortName, assembler: { op: concatenate } }
  - { type: assemble, sources: [first, last], target: sortName, assembler: { op: concatenate } }
";
        let mapper = MappingDsl::parse(yaml).unwrap().build().unwrap();
        assert_eq!(mapper.entries().len(), 3);
    }

    #[test]
    fn test_yaml_round_trip_keeps_rules() {
        let mapping = MappingDsl::parse(PERSON).unwrap();
        let yaml = MappingDsl::to_yaml(&mapping).unwrap();
        assert!(!yaml.contains("auto_mapping"));
        assert_eq!(MappingDsl::parse(&yaml).unwrap(), mapping);
    }
}
