//! Search engine backends.
//!
//! The [`SearchClient`] trait is the contract between the mapper core and a
//! concrete search engine. The core never speaks a wire protocol itself; it
//! hands [`Document`]s to the client and receives [`RawDocument`]s back.
//!
//! # Available Backends
//!
//! | Backend | Feature | Notes |
//! |---------|---------|-------|
//! | [`MemoryBackend`] | (always) | In-process engine with near-real-time refresh |
//! | `ElasticsearchBackend` | `elasticsearch` | Elasticsearch 8 over HTTP |

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OdmResult;
use crate::mapping::{ClassMetadata, params};

pub mod memory;
pub mod schema;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

pub use memory::MemoryBackend;

#[cfg(feature = "elasticsearch")]
pub use self::elasticsearch::{ElasticsearchAuth, ElasticsearchBackend, ElasticsearchConfig};

/// Identifies the type of search engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Elasticsearch.
    Elasticsearch,
    /// Apache Solr.
    Solr,
    /// Lucene index files.
    Lucene,
    /// In-process engine.
    Memory,
    /// Custom or unknown engine.
    Custom(&'static str),
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Elasticsearch => write!(f, "elasticsearch"),
            BackendKind::Solr => write!(f, "solr"),
            BackendKind::Lucene => write!(f, "lucene"),
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A document ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier.
    pub id: String,

    /// Body fields keyed by backend field name.
    pub fields: Map<String, Value>,

    /// Document-level parameters (`_routing`, `_parent`, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,

    /// Expected version, if the entity carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Document {
    /// Creates a document without parameters.
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            params: Map::new(),
            version: None,
        }
    }

    /// Returns a string parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_str)
    }

    /// Returns the parent document id.
    pub fn parent(&self) -> Option<&str> {
        self.param(params::PARENT)
    }

    /// Returns the routing key: explicit routing, else the parent id.
    pub fn routing(&self) -> Option<&str> {
        self.param(params::ROUTING).or_else(|| self.parent())
    }
}

/// Documents of one class keyed by identifier.
pub type DocumentBatch = BTreeMap<String, Document>;

/// A document as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    /// Index the document lives in.
    pub index: String,

    /// Document type.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Document identifier.
    pub id: String,

    /// Current version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    /// Relevance score of a search hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Body fields keyed by backend field name.
    pub source: Map<String, Value>,

    /// Document-level parameters reported with the hit.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

/// Result envelope of a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Total number of matching documents, independent of paging.
    pub total_hits: u64,

    /// Facet results keyed by facet name.
    #[serde(default)]
    pub facets: Map<String, Value>,

    /// Hits of the requested page, in ranking order.
    pub hits: Vec<RawDocument>,
}

impl SearchResults {
    /// Returns the identifiers of all hits, in result order.
    pub fn ids(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.id.clone()).collect()
    }

    /// Returns true if the page holds no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Options of a single-document lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Routing key; required for child documents on sharded engines.
    pub routing: Option<String>,

    /// Look the document up by this field instead of its identifier.
    pub field: Option<String>,
}

impl FindOptions {
    /// Lookup by identifier with routing.
    pub fn routed(routing: impl Into<String>) -> Self {
        Self {
            routing: Some(routing.into()),
            field: None,
        }
    }

    /// Lookup by field value.
    pub fn by_field(field: impl Into<String>) -> Self {
        Self {
            routing: None,
            field: Some(field.into()),
        }
    }
}

/// Contract every search engine client implements.
///
/// Implementations must be thread-safe. Transport failures are returned as
/// [`BackendError`](crate::error::BackendError) and are never retried by the
/// mapper.
#[async_trait]
pub trait SearchClient: Send + Sync + Debug {
    /// Returns the engine kind.
    fn kind(&self) -> BackendKind;

    /// Returns a human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Fetches a document by id; `None` if it does not exist.
    async fn find(
        &self,
        metadata: &ClassMetadata,
        id: &str,
        options: &FindOptions,
    ) -> OdmResult<Option<RawDocument>>;

    /// Fetches the first document whose backend field equals `value`.
    async fn find_one_by(
        &self,
        metadata: &ClassMetadata,
        field: &str,
        value: &Value,
    ) -> OdmResult<Option<RawDocument>>;

    /// Executes a native query against the indices/types of all given classes.
    async fn search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<SearchResults>;

    /// Writes (creates or overwrites) documents of one class.
    ///
    /// A batch holding exactly one document may be sent as a single-document
    /// request; the outcome must be identical.
    async fn add_documents(
        &self,
        metadata: &ClassMetadata,
        documents: &DocumentBatch,
    ) -> OdmResult<()>;

    /// Deletes documents of one class by id. Missing ids are ignored.
    async fn remove_documents(&self, metadata: &ClassMetadata, ids: &[String]) -> OdmResult<()>;

    /// Deletes every document of a class, or those matching `query`.
    async fn remove_all(&self, metadata: &ClassMetadata, query: Option<&Value>) -> OdmResult<()>;

    /// Creates an index with the given settings.
    async fn create_index(&self, index: &str, settings: &Value) -> OdmResult<()>;

    /// Deletes an index. Deleting a missing index is not an error.
    async fn delete_index(&self, index: &str) -> OdmResult<()>;

    /// Makes all writes to an index visible to search.
    async fn refresh_index(&self, index: &str) -> OdmResult<()>;

    /// Returns true if the index exists.
    async fn index_exists(&self, index: &str) -> OdmResult<bool>;

    /// Installs the mapping of a class into its index.
    async fn create_type(&self, metadata: &ClassMetadata) -> OdmResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
        assert_eq!(BackendKind::Custom("typesense").to_string(), "typesense");
    }

    #[test]
    fn test_document_routing_falls_back_to_parent() {
        let mut doc = Document::new("c1", Map::new());
        assert_eq!(doc.routing(), None);

        doc.params.insert(params::PARENT.to_string(), json!("p1"));
        assert_eq!(doc.parent(), Some("p1"));
        assert_eq!(doc.routing(), Some("p1"));

        doc.params.insert(params::ROUTING.to_string(), json!("shard-7"));
        assert_eq!(doc.routing(), Some("shard-7"));
    }

    #[test]
    fn test_search_results_ids_keep_order() {
        let hit = |id: &str| RawDocument {
            index: "users".to_string(),
            type_name: "user".to_string(),
            id: id.to_string(),
            version: None,
            score: None,
            source: Map::new(),
            params: Map::new(),
        };
        let results = SearchResults {
            total_hits: 10,
            facets: Map::new(),
            hits: vec![hit("b"), hit("a")],
        };
        assert_eq!(results.ids(), vec!["b", "a"]);
        assert!(!results.is_empty());
    }
}
