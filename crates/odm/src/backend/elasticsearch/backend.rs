//! Elasticsearch backend implementation.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{
    BackendKind, DocumentBatch, FindOptions, RawDocument, SearchClient, SearchResults,
};
use crate::error::{BackendError, OdmError, OdmResult};
use crate::mapping::ClassMetadata;

pub(super) const BACKEND_NAME: &str = "elasticsearch";

/// Discriminator field holding the mapped type name.
pub(super) const TYPE_FIELD: &str = "doc_type";

/// Field holding the entity identifier.
pub(super) const ID_FIELD: &str = "doc_id";

/// Field holding the parent identifier of child documents.
pub(super) const PARENT_FIELD: &str = "doc_parent";

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the Elasticsearch backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    pub nodes: Vec<String>,

    /// Prefix prepended to every index name (default: none).
    /// Physical indices are named `{prefix}{index}`.
    #[serde(default)]
    pub index_prefix: String,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            index_prefix: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

/// Elasticsearch search client.
pub struct ElasticsearchBackend {
    /// The Elasticsearch client.
    client: Elasticsearch,
    /// Configuration.
    config: ElasticsearchConfig,
}

impl Debug for ElasticsearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchBackend {
    /// Creates a new Elasticsearch backend with the given configuration.
    pub fn new(config: ElasticsearchConfig) -> OdmResult<Self> {
        let client = Self::build_client(&config)?;
        tracing::info!(
            "Elasticsearch backend configured for {:?} with index prefix '{}'",
            config.nodes.first(),
            config.index_prefix
        );
        Ok(Self { client, config })
    }

    /// Builds the Elasticsearch client from configuration.
    fn build_client(config: &ElasticsearchConfig) -> OdmResult<Elasticsearch> {
        let url = config
            .nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());

        let parsed_url: elasticsearch::http::Url = url.parse().map_err(|e| {
            OdmError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            })
        })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder.build().map_err(|e| {
            OdmError::Backend(BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Failed to build transport: {}", e),
            })
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Returns the Elasticsearch client.
    pub(super) fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Returns the physical name of a logical index.
    pub fn index_name(&self, index: &str) -> String {
        format!("{}{}", self.config.index_prefix, index)
    }

    /// Returns the logical name of a physical index.
    pub(super) fn logical_index<'a>(&self, physical: &'a str) -> &'a str {
        physical
            .strip_prefix(self.config.index_prefix.as_str())
            .unwrap_or(physical)
    }

    /// Returns the ES document ID for an entity.
    pub(super) fn document_id(type_name: &str, id: &str) -> String {
        format!("{}_{}", type_name, id)
    }
}

/// Builds an internal backend error.
pub(super) fn internal_error(message: impl Into<String>) -> OdmError {
    OdmError::Backend(BackendError::internal(BACKEND_NAME, message))
}

#[async_trait]
impl SearchClient for ElasticsearchBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn find(
        &self,
        metadata: &ClassMetadata,
        id: &str,
        options: &FindOptions,
    ) -> OdmResult<Option<RawDocument>> {
        self.get_document(metadata, id, options).await
    }

    async fn find_one_by(
        &self,
        metadata: &ClassMetadata,
        field: &str,
        value: &Value,
    ) -> OdmResult<Option<RawDocument>> {
        let body = serde_json::json!({
            "query": { "term": { field: value } },
            "size": 1
        });
        let results = self
            .run_search(&body, &[Arc::new(metadata.clone())])
            .await?;
        Ok(results.hits.into_iter().next())
    }

    async fn search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<SearchResults> {
        self.run_search(query, metadata).await
    }

    async fn add_documents(
        &self,
        metadata: &ClassMetadata,
        documents: &DocumentBatch,
    ) -> OdmResult<()> {
        self.index_documents(metadata, documents).await
    }

    async fn remove_documents(&self, metadata: &ClassMetadata, ids: &[String]) -> OdmResult<()> {
        self.delete_documents(metadata, ids).await
    }

    async fn remove_all(&self, metadata: &ClassMetadata, query: Option<&Value>) -> OdmResult<()> {
        self.delete_matching(metadata, query).await
    }

    async fn create_index(&self, index: &str, settings: &Value) -> OdmResult<()> {
        self.create_physical_index(index, settings).await
    }

    async fn delete_index(&self, index: &str) -> OdmResult<()> {
        self.delete_physical_index(index).await
    }

    async fn refresh_index(&self, index: &str) -> OdmResult<()> {
        self.refresh_physical_index(index).await
    }

    async fn index_exists(&self, index: &str) -> OdmResult<bool> {
        self.physical_index_exists(index).await
    }

    async fn create_type(&self, metadata: &ClassMetadata) -> OdmResult<()> {
        self.put_type_mapping(metadata).await
    }
}
