//! Index lifecycle and type mappings.

use elasticsearch::indices::{
    IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesPutMappingParts,
    IndicesRefreshParts,
};
use serde_json::{Map, Value, json};

use crate::backend::schema;
use crate::error::{BackendError, OdmResult};
use crate::mapping::ClassMetadata;

use super::backend::{ElasticsearchBackend, ID_FIELD, PARENT_FIELD, TYPE_FIELD, internal_error};

/// Translates a type mapping for a typeless index.
///
/// The reserved keyword fields are added to the properties. `_source` and
/// `_routing` only apply per index and are left out, and `_meta` is keyed by
/// type so types sharing an index keep their own entry.
pub(super) fn typeless_mapping(metadata: &ClassMetadata) -> Value {
    let Value::Object(mut mapping) = schema::type_mapping(metadata) else {
        return json!({});
    };
    mapping.remove("_source");
    mapping.remove("_routing");

    let mut properties = match mapping.remove("properties") {
        Some(Value::Object(properties)) => properties,
        _ => Map::new(),
    };
    for field in [TYPE_FIELD, ID_FIELD, PARENT_FIELD] {
        properties.insert(field.to_string(), json!({ "type": "keyword" }));
    }
    mapping.insert("properties".to_string(), Value::Object(properties));

    if let Some(meta) = mapping.remove("_meta") {
        let mut by_type = Map::new();
        by_type.insert(metadata.type_name.clone(), meta);
        mapping.insert("_meta".to_string(), Value::Object(by_type));
    }
    Value::Object(mapping)
}

impl ElasticsearchBackend {
    pub(super) async fn create_physical_index(&self, index: &str, settings: &Value) -> OdmResult<()> {
        let physical = self.index_name(index);
        let response = self
            .client()
            .indices()
            .create(IndicesCreateParts::Index(&physical))
            .body(json!({ "settings": settings }))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to create index {}: {}", physical, e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to create index {} (status {}): {}",
                physical, status, body
            )));
        }

        tracing::info!("Created Elasticsearch index '{}'", physical);
        Ok(())
    }

    pub(super) async fn delete_physical_index(&self, index: &str) -> OdmResult<()> {
        let physical = self.index_name(index);
        let response = self
            .client()
            .indices()
            .delete(IndicesDeleteParts::Index(&[&physical]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete index {}: {}", physical, e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 404 is OK (index doesn't exist)
            if !body.contains("index_not_found_exception") {
                return Err(internal_error(format!(
                    "Failed to delete index {}: {}",
                    physical, body
                )));
            }
        }

        tracing::debug!("Deleted Elasticsearch index '{}'", physical);
        Ok(())
    }

    pub(super) async fn refresh_physical_index(&self, index: &str) -> OdmResult<()> {
        let physical = self.index_name(index);
        let response = self
            .client()
            .indices()
            .refresh(IndicesRefreshParts::Index(&[&physical]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to refresh index {}: {}", physical, e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(BackendError::IndexNotFound {
                    index: index.to_string(),
                }
                .into());
            }
            return Err(internal_error(format!(
                "Failed to refresh index {} (status {}): {}",
                physical, status, body
            )));
        }
        Ok(())
    }

    pub(super) async fn physical_index_exists(&self, index: &str) -> OdmResult<bool> {
        let physical = self.index_name(index);
        let response = self
            .client()
            .indices()
            .exists(IndicesExistsParts::Index(&[&physical]))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to check index existence: {}", e)))?;
        Ok(response.status_code().is_success())
    }

    pub(super) async fn put_type_mapping(&self, metadata: &ClassMetadata) -> OdmResult<()> {
        let physical = self.index_name(&metadata.index);
        let response = self
            .client()
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[&physical]))
            .body(typeless_mapping(metadata))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to put mapping: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Err(BackendError::IndexNotFound {
                    index: metadata.index.clone(),
                }
                .into());
            }
            return Err(internal_error(format!(
                "Failed to put mapping for {} (status {}): {}",
                metadata.type_name, status, body
            )));
        }

        tracing::debug!(
            "Put mapping of type '{}' on index '{}'",
            metadata.type_name,
            physical
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FieldKind, FieldMapping};

    #[test]
    fn test_typeless_mapping() {
        let mut metadata = ClassMetadata::new("Comment");
        metadata.index = "blog".to_string();
        metadata.type_name = "comment".to_string();
        metadata.identifier = "id".to_string();
        metadata.parent = Some("post".to_string());
        metadata.disable_source = true;
        metadata.field_mappings = vec![FieldMapping::new("body", FieldKind::Text)];

        let mapping = typeless_mapping(&metadata);
        assert_eq!(mapping["properties"]["body"]["type"], "text");
        assert_eq!(mapping["properties"][TYPE_FIELD]["type"], "keyword");
        assert_eq!(mapping["properties"][ID_FIELD]["type"], "keyword");
        assert_eq!(mapping["properties"][PARENT_FIELD]["type"], "keyword");
        assert!(mapping.get("_source").is_none());
        assert!(mapping.get("_routing").is_none());
        assert_eq!(mapping["_meta"]["comment"]["parent"], "post");
    }
}
