//! Declarative mapping vocabulary.
//!
//! A [`TypeDeclaration`] is the neutral form of the mapping annotations an
//! entity class carries: class-level annotations naming the index and tuning
//! the type, and property-level annotations marking the identifier, indexed
//! fields and document parameters. Drivers produce declarations from code or
//! mapping files and then call [`TypeDeclaration::apply`] to fill in a blank
//! [`ClassMetadata`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MappingError;

use super::metadata::{ClassMetadata, FieldKind, FieldMapping, ParameterMapping, RootMapping};

/// Class-level mapping annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "annotation", rename_all = "snake_case")]
pub enum ClassAnnotation {
    /// Generic, engine-neutral searchable declaration.
    Searchable {
        /// Target index.
        #[serde(default)]
        index: Option<String>,
        /// Document type.
        #[serde(default, rename = "type")]
        type_name: Option<String>,
    },

    /// Elasticsearch-specific searchable declaration with tuning attributes.
    ElasticSearchable {
        /// Target index.
        #[serde(default)]
        index: Option<String>,
        /// Document type.
        #[serde(default, rename = "type")]
        type_name: Option<String>,
        /// Primary shard count.
        #[serde(default)]
        number_of_shards: Option<u32>,
        /// Replica shard count.
        #[serde(default)]
        number_of_replicas: Option<u32>,
        /// Parent document type.
        #[serde(default)]
        parent: Option<String>,
        /// Default time-to-live, e.g. `"1d"` or `"90m"`.
        #[serde(default)]
        ttl: Option<String>,
        /// Type-level boost.
        #[serde(default)]
        boost: Option<f64>,
        /// Whether the source document is kept.
        #[serde(default)]
        source: Option<bool>,
    },

    /// Index-level template directive.
    ElasticRoot {
        /// The directive.
        mapping: RootMapping,
    },
}

impl ClassAnnotation {
    /// Fixed precedence used when several top-level annotations are declared.
    ///
    /// Lower ranks win.
    pub fn precedence(&self) -> u8 {
        match self {
            ClassAnnotation::Searchable { .. } => 0,
            ClassAnnotation::ElasticSearchable { .. } => 1,
            ClassAnnotation::ElasticRoot { .. } => 2,
        }
    }

    fn is_entity_declaration(&self) -> bool {
        !matches!(self, ClassAnnotation::ElasticRoot { .. })
    }

    /// Creates a generic searchable annotation.
    pub fn searchable(index: impl Into<String>, type_name: impl Into<String>) -> Self {
        ClassAnnotation::Searchable {
            index: Some(index.into()),
            type_name: Some(type_name.into()),
        }
    }

    /// Creates an Elasticsearch annotation without tuning attributes.
    pub fn elastic_searchable(index: impl Into<String>, type_name: impl Into<String>) -> Self {
        ClassAnnotation::ElasticSearchable {
            index: Some(index.into()),
            type_name: Some(type_name.into()),
            number_of_shards: None,
            number_of_replicas: None,
            parent: None,
            ttl: None,
            boost: None,
            source: None,
        }
    }
}

/// Field attributes declared on a property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDeclaration {
    /// Backend field name; defaults to the property name.
    #[serde(default)]
    pub name: Option<String>,

    /// Value kind. Required.
    #[serde(default, rename = "type")]
    pub kind: Option<FieldKind>,

    /// Index mode.
    #[serde(default)]
    pub index: Option<String>,

    /// Analyzer.
    #[serde(default)]
    pub analyzer: Option<String>,

    /// Index-time analyzer.
    #[serde(default)]
    pub index_analyzer: Option<String>,

    /// Search-time analyzer.
    #[serde(default)]
    pub search_analyzer: Option<String>,

    /// Boost.
    #[serde(default)]
    pub boost: Option<f64>,

    /// Stored flag.
    #[serde(default)]
    pub store: Option<bool>,

    /// Null replacement.
    #[serde(default)]
    pub null_value: Option<Value>,

    /// Include-in-all flag.
    #[serde(default)]
    pub include_in_all: Option<bool>,

    /// Date format.
    #[serde(default)]
    pub format: Option<String>,

    /// Sub-properties for `object` and `nested`.
    #[serde(default)]
    pub properties: Vec<NamedField>,

    /// Alternative indexings for `multi_field`.
    #[serde(default)]
    pub fields: Vec<NamedField>,
}

impl FieldDeclaration {
    /// Creates a declaration of the given kind.
    pub fn of(kind: FieldKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }
}

/// A field declaration bound to a property name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedField {
    /// Property name.
    pub property: String,

    /// Field attributes.
    #[serde(flatten)]
    pub field: FieldDeclaration,
}

/// Property-level mapping annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "annotation", rename_all = "snake_case")]
pub enum PropertyAnnotation {
    /// Marks the identifier property.
    Id,
    /// Indexes the property as a document field.
    Field(FieldDeclaration),
    /// Sends the property as a document-level parameter.
    Param {
        /// Backend parameter name, e.g. `_routing`.
        #[serde(default)]
        name: Option<String>,
    },
}

/// All annotations declared on one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDeclaration {
    /// Property name.
    pub name: String,

    /// Annotations in declaration order.
    #[serde(default)]
    pub annotations: Vec<PropertyAnnotation>,
}

impl PropertyDeclaration {
    /// Creates a property declaration without annotations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotations: Vec::new(),
        }
    }

    /// Marks the property as the identifier.
    pub fn id(mut self) -> Self {
        self.annotations.push(PropertyAnnotation::Id);
        self
    }

    /// Indexes the property as a field.
    pub fn field(mut self, field: FieldDeclaration) -> Self {
        self.annotations.push(PropertyAnnotation::Field(field));
        self
    }

    /// Sends the property as a document parameter.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.annotations.push(PropertyAnnotation::Param {
            name: Some(name.into()),
        });
        self
    }
}

/// The full mapping declaration of an entity class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    /// Class-level annotations in declaration order.
    #[serde(default)]
    pub annotations: Vec<ClassAnnotation>,

    /// Property declarations in declaration order.
    #[serde(default)]
    pub properties: Vec<PropertyDeclaration>,
}

impl TypeDeclaration {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class annotation.
    pub fn annotate(mut self, annotation: ClassAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Adds a property declaration.
    pub fn property(mut self, property: PropertyDeclaration) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns true if the declaration carries an entity annotation.
    pub fn is_mapped(&self) -> bool {
        self.annotations.iter().any(|a| a.is_entity_declaration())
    }

    /// Returns the winning entity annotation.
    ///
    /// Candidates are ordered by [`ClassAnnotation::precedence`], ties by
    /// declaration order.
    pub fn entity_annotation(&self) -> Option<&ClassAnnotation> {
        self.annotations
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_entity_declaration())
            .min_by_key(|(position, a)| (a.precedence(), *position))
            .map(|(_, a)| a)
    }

    /// Populates blank class metadata from this declaration.
    pub fn apply(&self, metadata: &mut ClassMetadata) -> Result<(), MappingError> {
        let class_name = metadata.class_name.clone();
        let annotation = self.entity_annotation().ok_or_else(|| {
            MappingError::invalid(&class_name, "no searchable annotation declared")
        })?;

        match annotation {
            ClassAnnotation::Searchable { index, type_name } => {
                metadata.index = required(&class_name, "index", index)?;
                metadata.type_name = required(&class_name, "type", type_name)?;
            }
            ClassAnnotation::ElasticSearchable {
                index,
                type_name,
                number_of_shards,
                number_of_replicas,
                parent,
                ttl,
                boost,
                source,
            } => {
                metadata.index = required(&class_name, "index", index)?;
                metadata.type_name = required(&class_name, "type", type_name)?;
                if let Some(shards) = number_of_shards {
                    metadata.number_of_shards = *shards;
                }
                if let Some(replicas) = number_of_replicas {
                    metadata.number_of_replicas = *replicas;
                }
                metadata.parent = parent.clone();
                metadata.boost = *boost;
                metadata.disable_source = matches!(source, Some(false));
                if let Some(ttl) = ttl {
                    let duration = humantime::parse_duration(ttl).map_err(|e| {
                        MappingError::invalid(&class_name, format!("invalid ttl '{}': {}", ttl, e))
                    })?;
                    let millis = u64::try_from(duration.as_millis()).map_err(|_| {
                        MappingError::invalid(&class_name, format!("ttl '{}' is out of range", ttl))
                    })?;
                    metadata.ttl_millis = Some(millis);
                }
            }
            ClassAnnotation::ElasticRoot { .. } => {
                return Err(MappingError::invalid(
                    &class_name,
                    "root template cannot declare an entity",
                ));
            }
        }

        metadata.root_mappings = self
            .annotations
            .iter()
            .filter_map(|a| match a {
                ClassAnnotation::ElasticRoot { mapping } => Some(mapping.clone()),
                _ => None,
            })
            .collect();

        let mut identifier: Option<&str> = None;
        for property in &self.properties {
            for property_annotation in &property.annotations {
                match property_annotation {
                    PropertyAnnotation::Id => {
                        if let Some(existing) = identifier {
                            return Err(MappingError::invalid(
                                &class_name,
                                format!(
                                    "multiple identifiers declared: {} and {}",
                                    existing, property.name
                                ),
                            ));
                        }
                        identifier = Some(&property.name);
                    }
                    PropertyAnnotation::Field(field) => {
                        let mapping = build_field(&class_name, &property.name, field)?;
                        metadata.field_mappings.push(mapping);
                    }
                    PropertyAnnotation::Param { name } => {
                        let name = name
                            .as_deref()
                            .filter(|n| !n.is_empty())
                            .ok_or_else(|| MappingError::MissingAttribute {
                                class_name: class_name.clone(),
                                property: property.name.clone(),
                                attribute: "name".to_string(),
                            })?;
                        metadata
                            .parameter_mappings
                            .push(ParameterMapping::new(&property.name, name));
                    }
                }
            }
        }

        metadata.identifier = identifier
            .ok_or_else(|| MappingError::invalid(&class_name, "no identifier property declared"))?
            .to_string();

        Ok(())
    }
}

fn required(
    class_name: &str,
    attribute: &str,
    value: &Option<String>,
) -> Result<String, MappingError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| MappingError::invalid(class_name, format!("no {} declared", attribute)))
}

fn build_field(
    class_name: &str,
    property: &str,
    field: &FieldDeclaration,
) -> Result<FieldMapping, MappingError> {
    let missing = |attribute: &str| MappingError::MissingAttribute {
        class_name: class_name.to_string(),
        property: property.to_string(),
        attribute: attribute.to_string(),
    };

    let kind = field.kind.ok_or_else(|| missing("type"))?;
    if kind == FieldKind::MultiField && field.fields.is_empty() {
        return Err(missing("fields"));
    }

    let mut mapping = FieldMapping::new(property, kind);
    if let Some(name) = field.name.as_deref().filter(|n| !n.is_empty()) {
        mapping.name = name.to_string();
    }
    mapping.index = field.index.clone();
    mapping.analyzer = field.analyzer.clone();
    mapping.index_analyzer = field.index_analyzer.clone();
    mapping.search_analyzer = field.search_analyzer.clone();
    mapping.boost = field.boost;
    mapping.store = field.store;
    mapping.null_value = field.null_value.clone();
    mapping.include_in_all = field.include_in_all;
    mapping.format = field.format.clone();

    for sub in &field.properties {
        let nested_property = format!("{}.{}", property, sub.property);
        let mut sub_mapping = build_field(class_name, &nested_property, &sub.field)?;
        sub_mapping.property = sub.property.clone();
        if sub.field.name.is_none() {
            sub_mapping.name = sub.property.clone();
        }
        mapping.properties.push(sub_mapping);
    }
    for sub in &field.fields {
        let alt_property = format!("{}.{}", property, sub.property);
        let mut sub_mapping = build_field(class_name, &alt_property, &sub.field)?;
        sub_mapping.property = sub.property.clone();
        if sub.field.name.is_none() {
            sub_mapping.name = sub.property.clone();
        }
        mapping.fields.push(sub_mapping);
    }

    Ok(mapping)
}
