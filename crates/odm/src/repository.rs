//! Per-class repositories.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::entity::Entity;
use crate::error::OdmResult;
use crate::manager::SearchManager;
use crate::mapping::ClassMetadata;
use crate::query::NativeQuery;

/// Read and delete operations scoped to one entity class.
///
/// Obtained from [`SearchManager::get_repository`].
#[derive(Debug)]
pub struct Repository<'m, T: Entity> {
    manager: &'m SearchManager,
    metadata: Arc<ClassMetadata>,
    _entity: PhantomData<fn() -> T>,
}

impl<'m, T: Entity> Repository<'m, T> {
    pub(crate) fn new(manager: &'m SearchManager) -> OdmResult<Self> {
        let metadata = manager.get_class_metadata(T::CLASS_NAME)?;
        Ok(Self {
            manager,
            metadata,
            _entity: PhantomData,
        })
    }

    /// Returns the entity class name.
    pub fn get_class_name(&self) -> &str {
        &self.metadata.class_name
    }

    /// Returns the class metadata.
    pub fn get_class_metadata(&self) -> &Arc<ClassMetadata> {
        &self.metadata
    }

    /// Loads an entity by identifier.
    pub async fn find(&self, id: &str) -> OdmResult<T> {
        self.manager.find(id).await
    }

    /// Loads the single entity whose property equals `value`.
    pub async fn find_one_by(&self, field: &str, value: impl Into<Value>) -> OdmResult<T> {
        self.manager.find_by_field(field, value).await
    }

    /// Runs a native query against this class and hydrates the hits.
    pub async fn search(&self, query: impl NativeQuery + 'static) -> OdmResult<Vec<T>> {
        let mut search = self.manager.create_query();
        search.add_from::<T>().search_with(query);
        search.get_entities().await
    }

    /// Deletes the documents matching a query, or every document of the class.
    pub async fn delete(&self, query: Option<&Value>) -> OdmResult<()> {
        tracing::debug!(
            "Deleting {} documents from '{}'",
            self.metadata.class_name,
            self.metadata.index
        );
        self.manager
            .client()
            .remove_all(&self.metadata, query)
            .await
    }
}
