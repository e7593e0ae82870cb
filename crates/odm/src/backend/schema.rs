//! Index schema translation.
//!
//! Translates [`ClassMetadata`] into the JSON mapping and index settings a
//! search engine understands. The output follows the Elasticsearch mapping
//! format; other engines read the parts they support.
//!
//! Attributes the engine no longer accepts in field mappings (per-field boost,
//! include-in-all) and type-level tuning (ttl, boost, parent) are recorded
//! under `_meta`, so the declared mapping survives a round trip through the
//! engine.

use serde_json::{Map, Value, json};

use crate::mapping::{ClassMetadata, FieldKind, FieldMapping, RootMapping};

/// Returns the index settings derived from class metadata.
pub fn index_settings(metadata: &ClassMetadata) -> Value {
    json!({
        "number_of_shards": metadata.number_of_shards,
        "number_of_replicas": metadata.number_of_replicas,
    })
}

/// Returns the type mapping of a class.
///
/// The mapping includes:
/// - `properties`: one entry per field mapping, nested mappings inlined
/// - `_source`: disabled when the class discards its source
/// - `_routing`: required for child types
/// - `dynamic_templates` and type-level settings from root mappings
/// - `_meta`: class, parent, ttl and boost information
pub fn type_mapping(metadata: &ClassMetadata) -> Value {
    let mut mapping = Map::new();
    let mut meta = Map::new();
    meta.insert("class".to_string(), json!(metadata.class_name));
    meta.insert("type".to_string(), json!(metadata.type_name));

    let mut properties = Map::new();
    let mut boosts = Map::new();
    let mut include_in_all = Vec::new();
    for field in &metadata.field_mappings {
        properties.insert(field.name.clone(), field_mapping(field));
        collect_meta(field, "", &mut boosts, &mut include_in_all);
    }
    mapping.insert("properties".to_string(), Value::Object(properties));

    if metadata.disable_source {
        mapping.insert("_source".to_string(), json!({ "enabled": false }));
    }

    if let Some(parent) = &metadata.parent {
        mapping.insert("_routing".to_string(), json!({ "required": true }));
        meta.insert("parent".to_string(), json!(parent));
    }
    if let Some(ttl) = metadata.ttl_millis {
        meta.insert("ttl_millis".to_string(), json!(ttl));
    }
    if let Some(boost) = metadata.boost {
        meta.insert("boost".to_string(), json!(boost));
    }
    if !boosts.is_empty() {
        meta.insert("field_boosts".to_string(), Value::Object(boosts));
    }
    if !include_in_all.is_empty() {
        meta.insert("include_in_all".to_string(), json!(include_in_all));
    }

    let mut templates = Vec::new();
    for root in &metadata.root_mappings {
        match root {
            RootMapping::DynamicTemplate { name, template } => {
                let mut entry = Map::new();
                entry.insert(name.clone(), template.clone());
                templates.push(Value::Object(entry));
            }
            RootMapping::Setting { name, value } => {
                mapping.insert(name.clone(), value.clone());
            }
        }
    }
    if !templates.is_empty() {
        mapping.insert("dynamic_templates".to_string(), Value::Array(templates));
    }

    mapping.insert("_meta".to_string(), Value::Object(meta));
    Value::Object(mapping)
}

/// Returns the mapping of a single field.
pub fn field_mapping(field: &FieldMapping) -> Value {
    if field.kind == FieldKind::MultiField {
        return multi_field_mapping(field);
    }

    let mut mapping = Map::new();
    mapping.insert("type".to_string(), json!(engine_type(field)));

    if field.index.as_deref() == Some("no") {
        mapping.insert("index".to_string(), json!(false));
    }

    if accepts_analyzer(field) {
        let analyzer = field.analyzer.as_ref().or(field.index_analyzer.as_ref());
        if let Some(analyzer) = analyzer {
            mapping.insert("analyzer".to_string(), json!(analyzer));
        }
        if let Some(search_analyzer) = &field.search_analyzer {
            mapping.insert("search_analyzer".to_string(), json!(search_analyzer));
        }
    }

    if let Some(store) = field.store {
        mapping.insert("store".to_string(), json!(store));
    }
    if let Some(null_value) = &field.null_value {
        mapping.insert("null_value".to_string(), null_value.clone());
    }
    if let Some(format) = &field.format {
        mapping.insert("format".to_string(), json!(format));
    }

    if field.kind.is_container() && !field.properties.is_empty() {
        let properties: Map<String, Value> = field
            .properties
            .iter()
            .map(|sub| (sub.name.clone(), field_mapping(sub)))
            .collect();
        mapping.insert("properties".to_string(), Value::Object(properties));
    }

    Value::Object(mapping)
}

// The alternative sharing the field's own name is the primary indexing; every
// other alternative becomes a sub-field.
fn multi_field_mapping(field: &FieldMapping) -> Value {
    let primary = field
        .fields
        .iter()
        .find(|f| f.name == field.name)
        .or_else(|| field.fields.first());

    let mut mapping = match primary.map(field_mapping) {
        Some(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("type".to_string(), json!("text"));
            map
        }
    };

    let alternatives: Map<String, Value> = field
        .fields
        .iter()
        .filter(|f| Some(f.name.as_str()) != primary.map(|p| p.name.as_str()))
        .map(|f| (f.name.clone(), field_mapping(f)))
        .collect();
    if !alternatives.is_empty() {
        mapping.insert("fields".to_string(), Value::Object(alternatives));
    }

    Value::Object(mapping)
}

fn engine_type(field: &FieldMapping) -> &'static str {
    match field.kind {
        FieldKind::String => match field.index.as_deref() {
            Some("not_analyzed") => "keyword",
            _ => "text",
        },
        FieldKind::Text if field.index.as_deref() == Some("not_analyzed") => "keyword",
        kind => kind.as_str(),
    }
}

fn accepts_analyzer(field: &FieldMapping) -> bool {
    engine_type(field) == "text"
}

fn collect_meta(
    field: &FieldMapping,
    prefix: &str,
    boosts: &mut Map<String, Value>,
    include_in_all: &mut Vec<String>,
) {
    let path = format!("{}{}", prefix, field.name);
    if let Some(boost) = field.boost {
        boosts.insert(path.clone(), json!(boost));
    }
    if field.include_in_all == Some(true) {
        include_in_all.push(path.clone());
    }
    let nested_prefix = format!("{}.", path);
    for sub in &field.properties {
        collect_meta(sub, &nested_prefix, boosts, include_in_all);
    }
}
