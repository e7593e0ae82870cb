//! Recording search client.
//!
//! [`RecordingClient`] forwards every call to a [`MemoryBackend`] and keeps a
//! log of the calls it saw. Failures and stalls can be injected per type to
//! exercise partial commits and cancellation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use helios_odm::backend::{
    BackendKind, DocumentBatch, FindOptions, MemoryBackend, RawDocument, SearchClient,
    SearchResults,
};
use helios_odm::error::{BackendError, OdmResult};
use helios_odm::mapping::ClassMetadata;

/// A call observed by the recording client.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Find { type_name: String, id: String },
    FindOneBy { type_name: String, field: String },
    Search { types: Vec<String> },
    Add { type_name: String, ids: Vec<String> },
    Remove { type_name: String, ids: Vec<String> },
    RemoveAll { type_name: String },
    CreateIndex(String),
    DeleteIndex(String),
    Refresh(String),
    CreateType(String),
}

/// Wraps the in-memory backend, recording calls and injecting faults.
#[derive(Debug)]
pub struct RecordingClient {
    inner: Arc<MemoryBackend>,
    calls: RwLock<Vec<Call>>,
    failing_types: RwLock<HashSet<String>>,
    stalled_types: RwLock<HashSet<String>>,
}

impl RecordingClient {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner: Arc::new(inner),
            calls: RwLock::new(Vec::new()),
            failing_types: RwLock::new(HashSet::new()),
            stalled_types: RwLock::new(HashSet::new()),
        }
    }

    /// Returns the wrapped backend.
    pub fn backend(&self) -> &MemoryBackend {
        &self.inner
    }

    /// Returns every call seen so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.read().clone()
    }

    /// Returns the write calls (add and remove) seen so far.
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add { .. } | Call::Remove { .. }))
            .collect()
    }

    /// Returns the indices refreshed so far.
    pub fn refreshes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Refresh(index) => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn reset(&self) {
        self.calls.write().clear();
    }

    /// Makes every write of a type fail.
    pub fn fail_writes_for(&self, type_name: &str) {
        self.failing_types.write().insert(type_name.to_string());
    }

    /// Makes every write of a type wait forever.
    pub fn stall_writes_for(&self, type_name: &str) {
        self.stalled_types.write().insert(type_name.to_string());
    }

    /// Removes injected faults.
    pub fn heal(&self) {
        self.failing_types.write().clear();
        self.stalled_types.write().clear();
    }

    fn record(&self, call: Call) {
        self.calls.write().push(call);
    }

    async fn check_write(&self, metadata: &ClassMetadata) -> OdmResult<()> {
        if self.failing_types.read().contains(&metadata.type_name) {
            return Err(BackendError::Unavailable {
                backend_name: "recording".to_string(),
                message: format!("injected failure for {}", metadata.type_name),
            }
            .into());
        }
        let stalled = self.stalled_types.read().contains(&metadata.type_name);
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[async_trait]
impl SearchClient for RecordingClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Custom("recording")
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn find(
        &self,
        metadata: &ClassMetadata,
        id: &str,
        options: &FindOptions,
    ) -> OdmResult<Option<RawDocument>> {
        self.record(Call::Find {
            type_name: metadata.type_name.clone(),
            id: id.to_string(),
        });
        self.inner.find(metadata, id, options).await
    }

    async fn find_one_by(
        &self,
        metadata: &ClassMetadata,
        field: &str,
        value: &Value,
    ) -> OdmResult<Option<RawDocument>> {
        self.record(Call::FindOneBy {
            type_name: metadata.type_name.clone(),
            field: field.to_string(),
        });
        self.inner.find_one_by(metadata, field, value).await
    }

    async fn search(
        &self,
        query: &Value,
        metadata: &[Arc<ClassMetadata>],
    ) -> OdmResult<SearchResults> {
        self.record(Call::Search {
            types: metadata.iter().map(|m| m.type_name.clone()).collect(),
        });
        self.inner.search(query, metadata).await
    }

    async fn add_documents(
        &self,
        metadata: &ClassMetadata,
        documents: &DocumentBatch,
    ) -> OdmResult<()> {
        self.record(Call::Add {
            type_name: metadata.type_name.clone(),
            ids: documents.keys().cloned().collect(),
        });
        self.check_write(metadata).await?;
        self.inner.add_documents(metadata, documents).await
    }

    async fn remove_documents(&self, metadata: &ClassMetadata, ids: &[String]) -> OdmResult<()> {
        self.record(Call::Remove {
            type_name: metadata.type_name.clone(),
            ids: ids.to_vec(),
        });
        self.check_write(metadata).await?;
        self.inner.remove_documents(metadata, ids).await
    }

    async fn remove_all(&self, metadata: &ClassMetadata, query: Option<&Value>) -> OdmResult<()> {
        self.record(Call::RemoveAll {
            type_name: metadata.type_name.clone(),
        });
        self.inner.remove_all(metadata, query).await
    }

    async fn create_index(&self, index: &str, settings: &Value) -> OdmResult<()> {
        self.record(Call::CreateIndex(index.to_string()));
        self.inner.create_index(index, settings).await
    }

    async fn delete_index(&self, index: &str) -> OdmResult<()> {
        self.record(Call::DeleteIndex(index.to_string()));
        self.inner.delete_index(index).await
    }

    async fn refresh_index(&self, index: &str) -> OdmResult<()> {
        self.record(Call::Refresh(index.to_string()));
        self.inner.refresh_index(index).await
    }

    async fn index_exists(&self, index: &str) -> OdmResult<bool> {
        self.inner.index_exists(index).await
    }

    async fn create_type(&self, metadata: &ClassMetadata) -> OdmResult<()> {
        self.record(Call::CreateType(metadata.type_name.clone()));
        self.inner.create_type(metadata).await
    }
}
