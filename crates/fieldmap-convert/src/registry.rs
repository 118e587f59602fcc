//! Converter traits and the conversion registry

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use fieldmap_model::{FieldType, TypeKey, Value};

use crate::transform::Transform;
use crate::{ConversionError, Result};

/// Converts a value of one kind into another
pub trait Converter: Send + Sync {
    /// Convert a single value
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be converted.
    fn convert(&self, value: &Value) -> Result<Value>;

    /// The declarative transform behind this converter, if any. Converters
    /// backed by equal transforms are interchangeable.
    fn as_transform(&self) -> Option<&Transform> {
        None
    }
}

impl<F> Converter for F
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    fn convert(&self, value: &Value) -> Result<Value> {
        self(value)
    }
}

/// Converter that sees the declared target type and the registry it was
/// found in
pub trait GenericConverter: Send + Sync {
    /// Convert a value to the declared target type
    ///
    /// # Errors
    ///
    /// Returns an error when the value cannot be converted.
    fn convert(
        &self,
        value: &Value,
        target: &FieldType,
        registry: &ConversionRegistry,
    ) -> Result<Value>;
}

struct Plain(Arc<dyn Converter>);

impl GenericConverter for Plain {
    fn convert(&self, value: &Value, _target: &FieldType, _registry: &ConversionRegistry) -> Result<Value> {
        self.0.convert(value)
    }
}

type Pair = (TypeKey, TypeKey);

/// Registry of converters keyed by source and target kind
#[derive(Default)]
pub struct ConversionRegistry {
    converters: HashMap<Pair, Arc<dyn GenericConverter>>,
    cache: DashMap<Pair, Option<Arc<dyn GenericConverter>>>,
}

impl ConversionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the default scalar converters
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        crate::defaults::register_defaults(&mut registry);
        registry
    }

    /// Register a converter for a source and target kind pair, replacing
    /// any converter registered for the same pair
    pub fn add_converter(&mut self, from: TypeKey, to: TypeKey, converter: Arc<dyn Converter>) {
        self.add_generic_converter(from, to, Arc::new(Plain(converter)));
    }

    /// Register a generic converter for a source and target kind pair
    pub fn add_generic_converter(
        &mut self,
        from: TypeKey,
        to: TypeKey,
        converter: Arc<dyn GenericConverter>,
    ) {
        tracing::debug!(%from, %to, "Registered converter");
        self.converters.insert((from, to), converter);
        self.cache.clear();
    }

    /// Find the converter for a pair of kinds.
    ///
    /// The exact pair wins, then `record` wildcards for named record kinds,
    /// then converters registered with an `any` source.
    #[must_use]
    pub fn find_converter(&self, from: &TypeKey, to: &TypeKey) -> Option<Arc<dyn GenericConverter>> {
        let key = (from.clone(), to.clone());
        if let Some(hit) = self.cache.get(&key) {
            return hit.value().clone();
        }

        let found = candidates(from, true)
            .iter()
            .flat_map(|source| candidates(to, false).into_iter().map(move |target| (source.clone(), target)))
            .find_map(|pair| self.converters.get(&pair).cloned());

        self.cache.insert(key, found.clone());
        found
    }

    /// Whether a converter exists for the pair
    #[must_use]
    pub fn can_convert(&self, from: &TypeKey, to: &TypeKey) -> bool {
        from == to || *to == TypeKey::Any || self.find_converter(from, to).is_some()
    }

    /// Convert a value so that the declared type accepts it.
    ///
    /// Values the type already accepts, including null, are returned as
    /// they are.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::NoConverter`] when no converter applies,
    /// or the converter's own error.
    pub fn convert(&self, value: Value, target: &FieldType) -> Result<Value> {
        if target.accepts(&value) {
            return Ok(value);
        }

        let from = value.type_key();
        let to = target.type_key();
        match self.find_converter(&from, &to) {
            Some(converter) => {
                tracing::trace!(%from, %to, "Converting value");
                converter.convert(&value, target, self)
            }
            None => Err(ConversionError::NoConverter {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Number of registered converters
    #[must_use]
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pairs: Vec<String> = self
            .converters
            .keys()
            .map(|(from, to)| format!("{from} -> {to}"))
            .collect();
        pairs.sort();
        f.debug_struct("ConversionRegistry")
            .field("converters", &pairs)
            .finish_non_exhaustive()
    }
}

fn candidates(key: &TypeKey, with_any: bool) -> Vec<TypeKey> {
    let mut keys = vec![key.clone()];
    if matches!(key, TypeKey::Record(Some(_))) {
        keys.push(TypeKey::Record(None));
    }
    if with_any && *key != TypeKey::Any {
        keys.push(TypeKey::Any);
    }
    keys
}
