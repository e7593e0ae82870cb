//! Class metadata.
//!
//! [`ClassMetadata`] describes how one entity class maps onto a search engine
//! index: where its documents live, which property carries the identifier,
//! how each property is indexed and which properties travel as
//! document-level parameters (routing, parent) instead of body fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of value a mapped field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Legacy string type; analyzed unless `index` says otherwise.
    String,
    /// Analyzed full-text.
    Text,
    /// Exact-value string.
    Keyword,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 16-bit integer.
    Short,
    /// 8-bit integer.
    Byte,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Boolean.
    Boolean,
    /// Date or date-time.
    Date,
    /// Base64 encoded binary.
    Binary,
    /// Latitude/longitude pair.
    GeoPoint,
    /// Inner object flattened into the parent document.
    Object,
    /// Inner object indexed as a separate hidden document.
    Nested,
    /// One value indexed several ways.
    MultiField,
}

impl FieldKind {
    /// Returns true for kinds that carry sub-property mappings.
    pub fn is_container(&self) -> bool {
        matches!(self, FieldKind::Object | FieldKind::Nested)
    }

    /// Returns true for the integral numeric kinds.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::Long | FieldKind::Short | FieldKind::Byte
        )
    }

    /// Returns the lowercase name used in mapping declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::Keyword => "keyword",
            FieldKind::Integer => "integer",
            FieldKind::Long => "long",
            FieldKind::Short => "short",
            FieldKind::Byte => "byte",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Binary => "binary",
            FieldKind::GeoPoint => "geo_point",
            FieldKind::Object => "object",
            FieldKind::Nested => "nested",
            FieldKind::MultiField => "multi_field",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping of a single entity property onto a backend field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Property name on the entity.
    pub property: String,

    /// Field name in the backend document.
    pub name: String,

    /// Value kind.
    pub kind: FieldKind,

    /// Index mode (`analyzed`, `not_analyzed`, `no`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,

    /// Analyzer used at both index and search time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,

    /// Analyzer used at index time only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_analyzer: Option<String>,

    /// Analyzer used at search time only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_analyzer: Option<String>,

    /// Query-time boost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f64>,

    /// Whether the field value is stored separately from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,

    /// Value indexed in place of an explicit null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_value: Option<Value>,

    /// Whether the field is copied into the catch-all field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_all: Option<bool>,

    /// Date format pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Sub-properties of `object` and `nested` fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<FieldMapping>,

    /// Alternative indexings of a `multi_field`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldMapping>,
}

impl FieldMapping {
    /// Creates a mapping whose backend name equals the property name.
    pub fn new(property: impl Into<String>, kind: FieldKind) -> Self {
        let property = property.into();
        Self {
            name: property.clone(),
            property,
            kind,
            index: None,
            analyzer: None,
            index_analyzer: None,
            search_analyzer: None,
            boost: None,
            store: None,
            null_value: None,
            include_in_all: None,
            format: None,
            properties: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Sets the backend field name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the index mode.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Sets the analyzer.
    pub fn with_analyzer(mut self, analyzer: impl Into<String>) -> Self {
        self.analyzer = Some(analyzer.into());
        self
    }

    /// Sets the boost.
    pub fn with_boost(mut self, boost: f64) -> Self {
        self.boost = Some(boost);
        self
    }

    /// Sets the stored flag.
    pub fn with_store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the null replacement value.
    pub fn with_null_value(mut self, value: Value) -> Self {
        self.null_value = Some(value);
        self
    }

    /// Sets the include-in-all flag.
    pub fn with_include_in_all(mut self, include: bool) -> Self {
        self.include_in_all = Some(include);
        self
    }

    /// Sets the date format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Adds a sub-property to an `object`/`nested` mapping.
    pub fn with_property(mut self, property: FieldMapping) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds an alternative indexing to a `multi_field` mapping.
    pub fn with_field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }
}

/// Mapping of an entity property onto a document-level parameter.
///
/// Parameter values are not part of the document body; the backend attaches
/// them to the write request (e.g. `_routing`, `_parent`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMapping {
    /// Property name on the entity.
    pub property: String,

    /// Backend parameter name.
    pub name: String,
}

impl ParameterMapping {
    /// Creates a parameter mapping.
    pub fn new(property: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            name: name.into(),
        }
    }
}

/// Index-level directive that is not tied to a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootMapping {
    /// A dynamic template applied to unmapped fields.
    DynamicTemplate {
        /// Template name.
        name: String,
        /// Template body (`match`, `mapping`, ...).
        template: Value,
    },
    /// A type-level setting such as `date_detection` or `dynamic`.
    Setting {
        /// Setting name.
        name: String,
        /// Setting value.
        value: Value,
    },
}

/// Backend parameter names with a special meaning for the mapper.
pub mod params {
    /// Routing key parameter.
    pub const ROUTING: &str = "_routing";
    /// Parent document parameter.
    pub const PARENT: &str = "_parent";
    /// Document version parameter.
    pub const VERSION: &str = "_version";
}

/// Default number of primary shards.
pub const DEFAULT_SHARDS: u32 = 1;

/// Default number of replica shards.
pub const DEFAULT_REPLICAS: u32 = 0;

/// Describes how an entity class is stored in a search engine.
///
/// Built once per class by the [`MetadataFactory`](super::MetadataFactory)
/// and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetadata {
    /// Entity class name.
    pub class_name: String,

    /// Target index.
    pub index: String,

    /// Document type inside the index.
    pub type_name: String,

    /// Property carrying the document identifier.
    pub identifier: String,

    /// Field mappings in declaration order.
    pub field_mappings: Vec<FieldMapping>,

    /// Properties sent as document-level parameters.
    pub parameter_mappings: Vec<ParameterMapping>,

    /// Index-level directives in declaration order.
    pub root_mappings: Vec<RootMapping>,

    /// Primary shard count.
    pub number_of_shards: u32,

    /// Replica shard count.
    pub number_of_replicas: u32,

    /// Parent document type for parent/child linkage.
    pub parent: Option<String>,

    /// Default document time-to-live in milliseconds.
    pub ttl_millis: Option<u64>,

    /// Type-level boost.
    pub boost: Option<f64>,

    /// Whether the original source document is discarded.
    pub disable_source: bool,
}

impl ClassMetadata {
    /// Creates blank metadata for a class, to be populated by a driver.
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            index: String::new(),
            type_name: String::new(),
            identifier: String::new(),
            field_mappings: Vec::new(),
            parameter_mappings: Vec::new(),
            root_mappings: Vec::new(),
            number_of_shards: DEFAULT_SHARDS,
            number_of_replicas: DEFAULT_REPLICAS,
            parent: None,
            ttl_millis: None,
            boost: None,
            disable_source: false,
        }
    }

    /// Returns the field mapping for an entity property.
    pub fn field(&self, property: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|f| f.property == property)
    }

    /// Returns the field mapping for a backend field name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldMapping> {
        self.field_mappings.iter().find(|f| f.name == name)
    }

    /// Returns the parameter mapping for a backend parameter name.
    pub fn parameter_by_name(&self, name: &str) -> Option<&ParameterMapping> {
        self.parameter_mappings.iter().find(|p| p.name == name)
    }

    /// Returns true if the property is sent as a document parameter.
    pub fn is_parameter(&self, property: &str) -> bool {
        self.parameter_mappings.iter().any(|p| p.property == property)
    }

    /// Returns the backend field name for an entity property.
    ///
    /// Unmapped properties keep their own name.
    pub fn backend_field_name<'a>(&'a self, property: &'a str) -> &'a str {
        self.field(property).map(|f| f.name.as_str()).unwrap_or(property)
    }

    /// Returns true if a raw document reported by the backend belongs to this class.
    pub fn matches(&self, index: &str, type_name: &str) -> bool {
        self.index == index && self.type_name == type_name
    }
}
