//! Entity serialization.
//!
//! A [`Serializer`] converts an entity snapshot into the flat field set a
//! backend stores, and a merged backend field set back into an entity
//! snapshot. [`MappingSerializer`] drives both directions from the field and
//! parameter mappings of the class:
//!
//! - mapped properties are renamed to their backend field names, recursively
//!   through `object` and `nested` sub-mappings
//! - parameter-mapped properties are moved out of the body into the
//!   document parameters
//! - null values are dropped from the body
//! - unmapped properties are excluded unless explicitly included

use std::fmt::Debug;

use serde_json::{Map, Value};

use crate::error::OdmResult;
use crate::mapping::{ClassMetadata, FieldMapping};

/// Body fields and document parameters produced from one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    /// Body fields keyed by backend field name.
    pub fields: Map<String, Value>,
    /// Document parameters keyed by backend parameter name.
    pub params: Map<String, Value>,
}

/// Converts between entity snapshots and backend field sets.
pub trait Serializer: Send + Sync + Debug {
    /// Serializes an entity snapshot.
    fn serialize(&self, metadata: &ClassMetadata, entity: &Value) -> OdmResult<FieldSet>;

    /// Materializes an entity snapshot from backend-named fields.
    ///
    /// `fields` holds body fields, declared parameters and the identifier,
    /// all under their backend names.
    fn deserialize(&self, metadata: &ClassMetadata, fields: Map<String, Value>) -> OdmResult<Value>;
}

/// Serializer driven by class metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingSerializer {
    include_unmapped: bool,
}

impl MappingSerializer {
    /// Creates a serializer that excludes unmapped properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes unmapped properties through unchanged in both directions.
    pub fn with_unmapped(mut self, include: bool) -> Self {
        self.include_unmapped = include;
        self
    }
}

impl Serializer for MappingSerializer {
    fn serialize(&self, metadata: &ClassMetadata, entity: &Value) -> OdmResult<FieldSet> {
        let object = crate::entity::ensure_object(&metadata.class_name, entity.clone())?;
        let Value::Object(properties) = object else {
            return Ok(FieldSet::default());
        };

        let mut set = FieldSet::default();
        for (property, value) in properties {
            if value.is_null() {
                continue;
            }
            if let Some(param) = metadata
                .parameter_mappings
                .iter()
                .find(|p| p.property == property)
            {
                set.params.insert(param.name.clone(), value);
                continue;
            }
            match metadata.field(&property) {
                Some(mapping) => {
                    let value = to_backend(&value, &mapping.properties);
                    set.fields.insert(mapping.name.clone(), value);
                }
                None if self.include_unmapped => {
                    set.fields.insert(property, value);
                }
                None => {}
            }
        }
        Ok(set)
    }

    fn deserialize(&self, metadata: &ClassMetadata, fields: Map<String, Value>) -> OdmResult<Value> {
        let mut entity = Map::new();
        for (name, value) in fields {
            if let Some(mapping) = metadata.field_by_name(&name) {
                entity.insert(mapping.property.clone(), from_backend(&value, &mapping.properties));
            } else if let Some(param) = metadata.parameter_by_name(&name) {
                entity.insert(param.property.clone(), value);
            } else if name == metadata.identifier || self.include_unmapped {
                entity.insert(name, value);
            }
        }
        Ok(Value::Object(entity))
    }
}

fn to_backend(value: &Value, mappings: &[FieldMapping]) -> Value {
    rename(value, mappings, |m, key| (m.property == key).then(|| m.name.clone()))
}

fn from_backend(value: &Value, mappings: &[FieldMapping]) -> Value {
    rename(value, mappings, |m, key| (m.name == key).then(|| m.property.clone()))
}

fn rename<F>(value: &Value, mappings: &[FieldMapping], target: F) -> Value
where
    F: Fn(&FieldMapping, &str) -> Option<String> + Copy,
{
    if mappings.is_empty() {
        return value.clone();
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rename(item, mappings, target))
                .collect(),
        ),
        Value::Object(object) => {
            let mut renamed = Map::new();
            for (key, inner) in object {
                match mappings.iter().find_map(|m| target(m, key).map(|t| (m, t))) {
                    Some((mapping, name)) => {
                        renamed.insert(name, rename(inner, &mapping.properties, target));
                    }
                    None => {
                        renamed.insert(key.clone(), inner.clone());
                    }
                }
            }
            Value::Object(renamed)
        }
        other => other.clone(),
    }
}
