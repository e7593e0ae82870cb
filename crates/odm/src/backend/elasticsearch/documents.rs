//! Document reads and writes.

use elasticsearch::http::request::JsonBody;
use elasticsearch::params::{Conflicts, VersionType};
use elasticsearch::{BulkParts, DeleteByQueryParts, DeleteParts, GetParts, IndexParts};
use serde_json::{Map, Value, json};

use crate::backend::{Document, DocumentBatch, FindOptions, RawDocument};
use crate::error::OdmResult;
use crate::mapping::{ClassMetadata, params};

use super::backend::{
    ElasticsearchBackend, ID_FIELD, PARENT_FIELD, TYPE_FIELD, internal_error,
};

/// Builds the stored source of a document: body fields plus reserved fields.
pub(super) fn build_source(metadata: &ClassMetadata, document: &Document) -> Value {
    let mut source = document.fields.clone();
    source.insert(TYPE_FIELD.to_string(), json!(metadata.type_name));
    source.insert(ID_FIELD.to_string(), json!(document.id));
    if let Some(parent) = document.parent() {
        source.insert(PARENT_FIELD.to_string(), json!(parent));
    }
    Value::Object(source)
}

/// Builds the action line of a bulk index operation.
pub(super) fn index_action(index: &str, metadata: &ClassMetadata, document: &Document) -> Value {
    let mut action = Map::new();
    action.insert("_index".to_string(), json!(index));
    action.insert(
        "_id".to_string(),
        json!(ElasticsearchBackend::document_id(&metadata.type_name, &document.id)),
    );
    if let Some(routing) = document.routing() {
        action.insert("routing".to_string(), json!(routing));
    }
    if let Some(version) = document.version {
        action.insert("version".to_string(), json!(version));
        action.insert("version_type".to_string(), json!("external_gte"));
    }
    json!({ "index": action })
}

/// Collects the reasons of failed bulk items.
fn bulk_failures(body: &Value) -> Vec<String> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object()?.values().next())
                .filter_map(|result| {
                    let error = result.get("error")?;
                    let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");
                    let reason = error
                        .get("reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    Some(format!("{}: {}", id, reason))
                })
                .collect()
        })
        .unwrap_or_default()
}

impl ElasticsearchBackend {
    /// Parses a get response or search hit.
    pub(super) fn parse_hit(&self, hit: &Value) -> Option<RawDocument> {
        let physical = hit.get("_index")?.as_str()?;
        let mut source = hit
            .get("_source")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let fields = hit.get("fields");

        let reserved = |name: &str, source: &mut Map<String, Value>| -> Option<String> {
            let stored = source.remove(name);
            stored
                .as_ref()
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| {
                    fields?
                        .get(name)?
                        .get(0)?
                        .as_str()
                        .map(String::from)
                })
        };
        let type_name = reserved(TYPE_FIELD, &mut source)?;
        let parent = reserved(PARENT_FIELD, &mut source);
        let id = match reserved(ID_FIELD, &mut source) {
            Some(id) => id,
            None => {
                let es_id = hit.get("_id")?.as_str()?;
                es_id
                    .strip_prefix(&format!("{}_", type_name))
                    .unwrap_or(es_id)
                    .to_string()
            }
        };

        let mut doc_params = Map::new();
        if let Some(routing) = hit.get("_routing").and_then(Value::as_str) {
            doc_params.insert(params::ROUTING.to_string(), json!(routing));
        }
        if let Some(parent) = parent {
            doc_params.insert(params::PARENT.to_string(), json!(parent));
        }

        Some(RawDocument {
            index: self.logical_index(physical).to_string(),
            type_name,
            id,
            version: hit.get("_version").and_then(Value::as_u64),
            score: hit.get("_score").and_then(Value::as_f64),
            source,
            params: doc_params,
        })
    }

    /// Reads a single document by identifier.
    pub(super) async fn get_document(
        &self,
        metadata: &ClassMetadata,
        id: &str,
        options: &FindOptions,
    ) -> OdmResult<Option<RawDocument>> {
        let index = self.index_name(&metadata.index);
        let doc_id = Self::document_id(&metadata.type_name, id);

        let mut request = self.client().get(GetParts::IndexId(&index, &doc_id));
        if let Some(routing) = options.routing.as_deref() {
            request = request.routing(routing);
        }
        let response = request
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to get document: {}", e)))?;

        let status = response.status_code();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to get document (status {}): {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse ES response: {}", e)))?;
        if !body.get("found").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(self.parse_hit(&body))
    }

    /// Writes a batch of documents, using a single index call for one document.
    pub(super) async fn index_documents(
        &self,
        metadata: &ClassMetadata,
        documents: &DocumentBatch,
    ) -> OdmResult<()> {
        let index = self.index_name(&metadata.index);

        if documents.len() == 1 {
            if let Some(document) = documents.values().next() {
                return self.index_single(&index, metadata, document).await;
            }
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents.values() {
            body.push(index_action(&index, metadata, document).into());
            body.push(build_source(metadata, document).into());
        }
        self.send_bulk(body).await?;

        tracing::debug!(
            "Bulk indexed {} {} document(s) into '{}'",
            documents.len(),
            metadata.type_name,
            index
        );
        Ok(())
    }

    async fn index_single(
        &self,
        index: &str,
        metadata: &ClassMetadata,
        document: &Document,
    ) -> OdmResult<()> {
        let doc_id = Self::document_id(&metadata.type_name, &document.id);
        let mut request = self.client().index(IndexParts::IndexId(index, &doc_id));
        if let Some(routing) = document.routing() {
            request = request.routing(routing);
        }
        if let Some(version) = document.version {
            request = request
                .version(version as i64)
                .version_type(VersionType::ExternalGte);
        }

        let response = request
            .body(build_source(metadata, document))
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to index document: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Failed to index document (status {}): {}",
                status, body
            )));
        }

        tracing::debug!("Indexed {} '{}' into '{}'", metadata.type_name, document.id, index);
        Ok(())
    }

    /// Deletes documents by identifier.
    ///
    /// Child types are deleted by query, since their routing is unknown here.
    pub(super) async fn delete_documents(
        &self,
        metadata: &ClassMetadata,
        ids: &[String],
    ) -> OdmResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        if metadata.parent.is_some() {
            let query = json!({ "terms": { ID_FIELD: ids } });
            return self.delete_matching(metadata, Some(&query)).await;
        }

        let index = self.index_name(&metadata.index);
        if let [id] = ids {
            let doc_id = Self::document_id(&metadata.type_name, id);
            let response = self
                .client()
                .delete(DeleteParts::IndexId(&index, &doc_id))
                .send()
                .await
                .map_err(|e| internal_error(format!("Failed to delete document: {}", e)))?;

            let status = response.status_code();
            // A missing document is already gone.
            if !status.is_success() && status.as_u16() != 404 {
                let body = response.text().await.unwrap_or_default();
                return Err(internal_error(format!(
                    "Failed to delete document (status {}): {}",
                    status, body
                )));
            }
            return Ok(());
        }

        let body: Vec<JsonBody<Value>> = ids
            .iter()
            .map(|id| {
                json!({
                    "delete": {
                        "_index": index,
                        "_id": Self::document_id(&metadata.type_name, id),
                    }
                })
                .into()
            })
            .collect();
        self.send_bulk(body).await?;

        tracing::debug!(
            "Bulk deleted {} {} document(s) from '{}'",
            ids.len(),
            metadata.type_name,
            index
        );
        Ok(())
    }

    /// Deletes every document of a type matching a query.
    pub(super) async fn delete_matching(
        &self,
        metadata: &ClassMetadata,
        query: Option<&Value>,
    ) -> OdmResult<()> {
        let index = self.index_name(&metadata.index);
        let query = query.cloned().unwrap_or_else(|| json!({ "match_all": {} }));
        let body = json!({
            "query": {
                "bool": {
                    "must": [query],
                    "filter": [{ "term": { TYPE_FIELD: metadata.type_name } }]
                }
            }
        });

        let response = self
            .client()
            .delete_by_query(DeleteByQueryParts::Index(&[&index]))
            .conflicts(Conflicts::Proceed)
            .body(body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Failed to delete by query: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if body.contains("index_not_found_exception") {
                return Ok(());
            }
            return Err(internal_error(format!(
                "Failed to delete by query (status {}): {}",
                status, body
            )));
        }

        let body: Value = response.json().await.unwrap_or_default();
        tracing::debug!(
            "Deleted {} {} document(s) from '{}' by query",
            body.get("deleted").and_then(Value::as_u64).unwrap_or(0),
            metadata.type_name,
            index
        );
        Ok(())
    }

    async fn send_bulk(&self, body: Vec<JsonBody<Value>>) -> OdmResult<()> {
        let response = self
            .client()
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| internal_error(format!("Bulk request failed: {}", e)))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!(
                "Bulk request failed (status {}): {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| internal_error(format!("Failed to parse bulk response: {}", e)))?;
        if body.get("errors").and_then(Value::as_bool).unwrap_or(false) {
            let failures = bulk_failures(&body);
            if !failures.is_empty() {
                return Err(internal_error(format!(
                    "{} bulk item(s) failed: {}",
                    failures.len(),
                    failures.join("; ")
                )));
            }
        }
        Ok(())
    }
}
