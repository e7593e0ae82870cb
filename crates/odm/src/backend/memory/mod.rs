//! In-process search backend.
//!
//! [`MemoryBackend`] keeps every index in memory and mimics the
//! near-real-time behaviour of Elasticsearch: a get by id always sees the
//! latest write, while searches only see documents as of the last refresh of
//! their index. Enable [`MemoryBackend::with_auto_refresh`] to make every write
//! immediately searchable.
//!
//! # Example
//!
//! ```
//! use helios_odm::backend::{BackendKind, MemoryBackend, SearchClient};
//!
//! let backend = MemoryBackend::new().with_auto_refresh(true);
//! assert_eq!(backend.kind(), BackendKind::Memory);
//! ```

mod query;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};

use crate::error::{BackendError, OdmResult};
use crate::mapping::ClassMetadata;

use self::query::{DocView, SearchRequest};
use super::{BackendKind, DocumentBatch, FindOptions, RawDocument, SearchClient, SearchResults};

const BACKEND_NAME: &str = "memory";

/// Documents are keyed by (type, id) inside an index.
type DocKey = (String, String);

#[derive(Debug, Clone)]
struct StoredDocument {
    source: Map<String, Value>,
    params: Map<String, Value>,
    version: u64,
}

#[derive(Debug, Clone, Default)]
struct MemoryIndex {
    settings: Value,
    mappings: BTreeMap<String, Value>,
    live: BTreeMap<DocKey, StoredDocument>,
    searchable: BTreeMap<DocKey, StoredDocument>,
}

impl MemoryIndex {
    fn refresh(&mut self) {
        self.searchable = self.live.clone();
    }
}

/// In-memory search engine.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    indices: RwLock<BTreeMap<String, MemoryIndex>>,
    auto_refresh: bool,
}

impl MemoryBackend {
    /// Creates an empty backend with near-real-time search visibility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write immediately visible to search.
    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    /// Returns the names of all indices.
    pub fn index_names(&self) -> Vec<String> {
        self.indices.read().keys().cloned().collect()
    }

    /// Returns the number of documents in an index, including unrefreshed ones.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .map(|i| i.live.len())
            .unwrap_or(0)
    }

    /// Returns the mapping installed for a type.
    pub fn mapping(&self, index: &str, type_name: &str) -> Option<Value> {
        self.indices
            .read()
            .get(index)
            .and_then(|i| i.mappings.get(type_name).cloned())
    }

    /// Returns the settings an index was created with.
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indices.read().get(index).map(|i| i.settings.clone())
    }

    fn raw_document(
        index: &str,
        key: &DocKey,
        document: &StoredDocument,
        score: Option<f64>,
    ) -> RawDocument {
        RawDocument {
            index: index.to_string(),
            type_name: key.0.clone(),
            id: key.1.clone(),
            version: Some(document.version),
            score,
            source: document.source.clone(),
            params: document.params.clone(),
        }
    }
}

fn doc_view<'a>(candidate: &(&'a str, &'a DocKey, &'a StoredDocument)) -> DocView<'a> {
    let (_, key, doc) = *candidate;
    DocView {
        id: &key.1,
        source: &doc.source,
    }
}

#[async_trait]
impl SearchClient for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find(
        &self,
        metadata: &ClassMetadata,
        id: &str,
        _options: &FindOptions,
    ) -> OdmResult<Option<RawDocument>> {
        let indices = self.indices.read();
        let Some(index) = indices.get(&metadata.index) else {
            return Ok(None);
        };
        let key = (metadata.type_name.clone(), id.to_string());
        Ok(index
            .live
            .get(&key)
            .map(|doc| Self::raw_document(&metadata.index, &key, doc, None)))
    }

    async fn find_one_by(
        &self,
        metadata: &ClassMetadata,
        field: &str,
        value: &Value,
    ) -> OdmResult<Option<RawDocument>> {
        let body = json!({
            "query": { "term": { field: value } },
            "size": 1
        });
        let results = self
            .search(&body, &[Arc::new(metadata.clone())])
            .await?;
        Ok(results.hits.into_iter().next())
    }

    async fn search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<SearchResults> {
        let request = SearchRequest::parse(query)?;
        let targets: HashSet<(&str, &str)> = metadata
            .iter()
            .map(|m| (m.index.as_str(), m.type_name.as_str()))
            .collect();

        let indices = self.indices.read();
        let mut candidates: Vec<(&str, &DocKey, &StoredDocument)> = Vec::new();
        for (name, index) in indices.iter() {
            for (key, doc) in &index.searchable {
                if targets.contains(&(name.as_str(), key.0.as_str())) {
                    candidates.push((name.as_str(), key, doc));
                }
            }
        }

        let mut matched = Vec::new();
        for candidate in candidates {
            if query::matches(&request.query, &doc_view(&candidate))? {
                matched.push(candidate);
            }
        }

        let views: Vec<DocView<'_>> = matched.iter().map(doc_view).collect();
        let facets = request.facets(&views);
        matched.sort_by(|a, b| request.compare(&doc_view(a), &doc_view(b)));

        let total_hits = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .map(|(index, key, doc)| {
                let mut raw = Self::raw_document(index, key, doc, Some(1.0));
                raw.source = request.source.apply(&doc.source);
                raw
            })
            .collect();

        tracing::debug!(
            "Memory search over {} type(s) matched {} document(s)",
            targets.len(),
            total_hits
        );

        Ok(SearchResults {
            total_hits,
            facets,
            hits,
        })
    }

    async fn add_documents(
        &self,
        metadata: &ClassMetadata,
        documents: &DocumentBatch,
    ) -> OdmResult<()> {
        let mut indices = self.indices.write();
        let index = indices.entry(metadata.index.clone()).or_default();

        for (id, document) in documents {
            let key = (metadata.type_name.clone(), id.clone());
            let version = index.live.get(&key).map(|d| d.version + 1).unwrap_or(1);
            index.live.insert(
                key,
                StoredDocument {
                    source: document.fields.clone(),
                    params: document.params.clone(),
                    version,
                },
            );
        }
        if self.auto_refresh {
            index.refresh();
        }

        tracing::debug!(
            "Indexed {} {} document(s) into '{}'",
            documents.len(),
            metadata.type_name,
            metadata.index
        );
        Ok(())
    }

    async fn remove_documents(&self, metadata: &ClassMetadata, ids: &[String]) -> OdmResult<()> {
        let mut indices = self.indices.write();
        let Some(index) = indices.get_mut(&metadata.index) else {
            return Ok(());
        };
        for id in ids {
            index.live.remove(&(metadata.type_name.clone(), id.clone()));
        }
        if self.auto_refresh {
            index.refresh();
        }
        Ok(())
    }

    async fn remove_all(&self, metadata: &ClassMetadata, query: Option<&Value>) -> OdmResult<()> {
        let mut indices = self.indices.write();
        let Some(index) = indices.get_mut(&metadata.index) else {
            return Ok(());
        };

        let mut doomed = Vec::new();
        for (key, doc) in &index.live {
            if key.0 != metadata.type_name {
                continue;
            }
            let hit = match query {
                None => true,
                Some(query) => query::matches(
                    query,
                    &DocView {
                        id: &key.1,
                        source: &doc.source,
                    },
                )?,
            };
            if hit {
                doomed.push(key.clone());
            }
        }
        for key in &doomed {
            index.live.remove(key);
        }
        if self.auto_refresh {
            index.refresh();
        }

        tracing::debug!(
            "Removed {} {} document(s) from '{}'",
            doomed.len(),
            metadata.type_name,
            metadata.index
        );
        Ok(())
    }

    async fn create_index(&self, index: &str, settings: &Value) -> OdmResult<()> {
        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(BackendError::internal(
                BACKEND_NAME,
                format!("index '{}' already exists", index),
            )
            .into());
        }
        indices.insert(
            index.to_string(),
            MemoryIndex {
                settings: settings.clone(),
                ..Default::default()
            },
        );
        tracing::debug!("Created memory index '{}'", index);
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> OdmResult<()> {
        if self.indices.write().remove(index).is_some() {
            tracing::debug!("Deleted memory index '{}'", index);
        }
        Ok(())
    }

    async fn refresh_index(&self, index: &str) -> OdmResult<()> {
        let mut indices = self.indices.write();
        let target = indices
            .get_mut(index)
            .ok_or_else(|| BackendError::IndexNotFound {
                index: index.to_string(),
            })?;
        target.refresh();
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> OdmResult<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn create_type(&self, metadata: &ClassMetadata) -> OdmResult<()> {
        let mut indices = self.indices.write();
        let index = indices
            .get_mut(&metadata.index)
            .ok_or_else(|| BackendError::IndexNotFound {
                index: metadata.index.clone(),
            })?;
        index.mappings.insert(
            metadata.type_name.clone(),
            super::schema::type_mapping(metadata),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Document;
    use crate::error::OdmError;

    fn user_metadata() -> ClassMetadata {
        let mut metadata = ClassMetadata::new("User");
        metadata.index = "users".to_string();
        metadata.type_name = "user".to_string();
        metadata.identifier = "id".to_string();
        metadata
    }

    fn batch(docs: Vec<(&str, Value)>) -> DocumentBatch {
        docs.into_iter()
            .map(|(id, fields)| {
                let fields = fields.as_object().cloned().unwrap_or_default();
                (id.to_string(), Document::new(id, fields))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_get_is_realtime_search_is_not() {
        let backend = MemoryBackend::new();
        let metadata = user_metadata();
        backend
            .add_documents(&metadata, &batch(vec![("u1", json!({"username": "mrhash"}))]))
            .await
            .unwrap();

        let found = backend
            .find(&metadata, "u1", &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(found.unwrap().version, Some(1));

        let results = backend
            .search(&json!({}), &[Arc::new(metadata.clone())])
            .await
            .unwrap();
        assert_eq!(results.total_hits, 0);

        backend.refresh_index("users").await.unwrap();
        let results = backend
            .search(&json!({}), &[Arc::new(metadata)])
            .await
            .unwrap();
        assert_eq!(results.total_hits, 1);
    }

    #[tokio::test]
    async fn test_overwrite_bumps_version() {
        let backend = MemoryBackend::new();
        let metadata = user_metadata();
        let docs = batch(vec![("u1", json!({"name": "a"}))]);
        backend.add_documents(&metadata, &docs).await.unwrap();
        backend.add_documents(&metadata, &docs).await.unwrap();

        let found = backend
            .find(&metadata, "u1", &FindOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version, Some(2));
        assert_eq!(backend.document_count("users"), 1);
    }

    #[tokio::test]
    async fn test_find_one_by_field() {
        let backend = MemoryBackend::new().with_auto_refresh(true);
        let metadata = user_metadata();
        backend
            .add_documents(
                &metadata,
                &batch(vec![
                    ("u1", json!({"username": "mrhash"})),
                    ("u2", json!({"username": "other"})),
                ]),
            )
            .await
            .unwrap();

        let found = backend
            .find_one_by(&metadata, "username", &json!("mrhash"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "u1");
        assert!(
            backend
                .find_one_by(&metadata, "username", &json!("nobody"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_search_sort_paging_and_types() {
        let backend = MemoryBackend::new().with_auto_refresh(true);
        let users = user_metadata();
        let mut comments = ClassMetadata::new("Comment");
        comments.index = "users".to_string();
        comments.type_name = "comment".to_string();

        backend
            .add_documents(
                &users,
                &batch(vec![
                    ("u1", json!({"age": 30})),
                    ("u2", json!({"age": 20})),
                    ("u3", json!({"age": 40})),
                ]),
            )
            .await
            .unwrap();
        backend
            .add_documents(&comments, &batch(vec![("c1", json!({"age": 99}))]))
            .await
            .unwrap();

        let users = Arc::new(users);
        let results = backend
            .search(
                &json!({"sort": [{"age": "desc"}], "from": 1, "size": 1}),
                &[Arc::clone(&users)],
            )
            .await
            .unwrap();
        assert_eq!(results.total_hits, 3);
        assert_eq!(results.ids(), vec!["u1"]);

        let both = backend
            .search(&json!({}), &[users, Arc::new(comments)])
            .await
            .unwrap();
        assert_eq!(both.total_hits, 4);
    }

    #[tokio::test]
    async fn test_remove_documents_and_remove_all() {
        let backend = MemoryBackend::new().with_auto_refresh(true);
        let metadata = user_metadata();
        backend
            .add_documents(
                &metadata,
                &batch(vec![
                    ("u1", json!({"active": true})),
                    ("u2", json!({"active": false})),
                    ("u3", json!({"active": false})),
                ]),
            )
            .await
            .unwrap();

        backend
            .remove_documents(&metadata, &["u1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(backend.document_count("users"), 2);

        backend
            .remove_all(&metadata, Some(&json!({"term": {"active": false}})))
            .await
            .unwrap();
        assert_eq!(backend.document_count("users"), 0);
    }

    #[tokio::test]
    async fn test_index_lifecycle() {
        let backend = MemoryBackend::new();
        let metadata = user_metadata();

        let err = backend.create_type(&metadata).await.unwrap_err();
        assert!(matches!(
            err,
            OdmError::Backend(BackendError::IndexNotFound { .. })
        ));

        backend
            .create_index("users", &json!({"number_of_shards": 1}))
            .await
            .unwrap();
        assert!(backend.index_exists("users").await.unwrap());
        assert!(backend.create_index("users", &json!({})).await.is_err());

        backend.create_type(&metadata).await.unwrap();
        assert!(backend.mapping("users", "user").is_some());
        assert_eq!(backend.settings("users").unwrap()["number_of_shards"], 1);

        backend.delete_index("users").await.unwrap();
        backend.delete_index("users").await.unwrap();
        assert!(!backend.index_exists("users").await.unwrap());
        assert!(backend.refresh_index("users").await.is_err());
    }
}
