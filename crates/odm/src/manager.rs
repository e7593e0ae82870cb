//! Search manager.
//!
//! [`SearchManager`] is the entry point of the mapper. It owns the event
//! manager, the metadata factory and the unit of work, and turns typed
//! entities into the JSON snapshots the core works with.
//!
//! ```
//! # async fn demo() -> helios_odm::OdmResult<()> {
//! use std::sync::Arc;
//! use helios_odm::backend::MemoryBackend;
//! use helios_odm::mapping::{
//!     ClassAnnotation, FieldDeclaration, FieldKind, PropertyDeclaration, StaticDriver,
//!     TypeDeclaration,
//! };
//! use helios_odm::{Entity, OdmConfig, SearchManager};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     username: String,
//! }
//!
//! impl Entity for User {
//!     const CLASS_NAME: &'static str = "User";
//! }
//!
//! let driver = StaticDriver::new().with(
//!     "User",
//!     TypeDeclaration::new()
//!         .annotate(ClassAnnotation::elastic_searchable("users", "user"))
//!         .property(PropertyDeclaration::new("id").id())
//!         .property(
//!             PropertyDeclaration::new("username").field(FieldDeclaration::of(FieldKind::Keyword)),
//!         ),
//! );
//! let mut manager = SearchManager::new(
//!     OdmConfig::default(),
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(driver),
//! )?;
//!
//! manager.persist(&User { id: "u1".into(), username: "mrhash".into() })?;
//! manager.flush().await?;
//!
//! let user: User = manager.find("u1").await?;
//! assert_eq!(user.username, "mrhash");
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::backend::{FindOptions, SearchClient, schema};
use crate::config::OdmConfig;
use crate::entity::{Entity, from_snapshot, to_snapshot};
use crate::error::OdmResult;
use crate::events::EventManager;
use crate::mapping::{ClassMetadata, MappingDriver, MetadataFactory};
use crate::query::Query;
use crate::repository::Repository;
use crate::serializer::{MappingSerializer, Serializer};
use crate::unit_of_work::{StageKey, UnitOfWork};

/// Facade composing metadata, unit of work, queries and repositories.
pub struct SearchManager {
    config: OdmConfig,
    client: Arc<dyn SearchClient>,
    events: Arc<EventManager>,
    metadata_factory: Arc<MetadataFactory>,
    unit_of_work: UnitOfWork,
}

impl fmt::Debug for SearchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchManager")
            .field("config", &self.config)
            .field("client", &self.client.name())
            .field("unit_of_work", &self.unit_of_work)
            .finish_non_exhaustive()
    }
}

impl SearchManager {
    /// Creates a manager with the default [`MappingSerializer`].
    pub fn new(
        config: OdmConfig,
        client: Arc<dyn SearchClient>,
        driver: Arc<dyn MappingDriver>,
    ) -> OdmResult<Self> {
        Self::with_serializer(config, client, driver, Arc::new(MappingSerializer::new()))
    }

    /// Creates a manager with a custom serializer.
    ///
    /// # Errors
    ///
    /// * `MappingError::InvalidPattern` - if the configured index name pattern is invalid
    pub fn with_serializer(
        config: OdmConfig,
        client: Arc<dyn SearchClient>,
        driver: Arc<dyn MappingDriver>,
        serializer: Arc<dyn Serializer>,
    ) -> OdmResult<Self> {
        let events = Arc::new(EventManager::new());
        let metadata_factory = Arc::new(MetadataFactory::new(
            driver,
            Arc::clone(&events),
            &config,
        )?);
        let unit_of_work = UnitOfWork::new(
            Arc::clone(&metadata_factory),
            Arc::clone(&client),
            serializer,
            Arc::clone(&events),
        );

        tracing::info!(
            "Search manager initialized with {} backend",
            client.kind()
        );
        Ok(Self {
            config,
            client,
            events,
            metadata_factory,
            unit_of_work,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OdmConfig {
        &self.config
    }

    /// Returns the backend client.
    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    /// Returns the listener registry.
    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// Returns the metadata factory.
    pub fn metadata_factory(&self) -> &Arc<MetadataFactory> {
        &self.metadata_factory
    }

    /// Returns the unit of work.
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.unit_of_work
    }

    /// Returns the metadata of a class.
    pub fn get_class_metadata(&self, class_name: &str) -> OdmResult<Arc<ClassMetadata>> {
        self.metadata_factory.get_metadata_for(class_name)
    }

    /// Stages an entity for persistence.
    pub fn persist<T: Entity>(&mut self, entity: &T) -> OdmResult<StageKey> {
        let snapshot = to_snapshot(entity)?;
        self.unit_of_work.persist(T::CLASS_NAME, snapshot)
    }

    /// Stages an entity snapshot for persistence.
    pub fn persist_value(&mut self, class_name: &str, entity: Value) -> OdmResult<StageKey> {
        self.unit_of_work.persist(class_name, entity)
    }

    /// Stages an entity for removal.
    pub fn remove<T: Entity>(&mut self, entity: &T) -> OdmResult<StageKey> {
        let snapshot = to_snapshot(entity)?;
        self.unit_of_work.remove(T::CLASS_NAME, snapshot)
    }

    /// Stages an entity snapshot for removal.
    pub fn remove_value(&mut self, class_name: &str, entity: Value) -> OdmResult<StageKey> {
        self.unit_of_work.remove(class_name, entity)
    }

    /// Commits staged operations, refreshing if configured to.
    pub async fn flush(&mut self) -> OdmResult<()> {
        let force_refresh = self.config.force_refresh_on_flush;
        self.unit_of_work.commit(force_refresh).await
    }

    /// Commits staged operations with an explicit refresh choice.
    pub async fn flush_with_refresh(&mut self, force_refresh: bool) -> OdmResult<()> {
        self.unit_of_work.commit(force_refresh).await
    }

    /// Discards staged operations, either all or those of one class.
    pub fn clear(&mut self, class_name: Option<&str>) -> OdmResult<()> {
        self.unit_of_work.clear(class_name)
    }

    /// Loads an entity by identifier.
    ///
    /// # Errors
    ///
    /// * `OdmError::NoResult` - if the document does not exist
    pub async fn find<T: Entity>(&self, id: &str) -> OdmResult<T> {
        self.find_with_options(id, &FindOptions::default()).await
    }

    /// Loads an entity by identifier with lookup options such as routing.
    pub async fn find_with_options<T: Entity>(
        &self,
        id: &str,
        options: &FindOptions,
    ) -> OdmResult<T> {
        let metadata = self.metadata_factory.get_metadata_for(T::CLASS_NAME)?;
        let snapshot = self
            .unit_of_work
            .load(&metadata, &Value::String(id.to_string()), options)
            .await?;
        from_snapshot(snapshot)
    }

    /// Loads the single entity whose property equals `value`.
    ///
    /// # Errors
    ///
    /// * `OdmError::NoResult` - if nothing matches
    pub async fn find_by_field<T: Entity>(
        &self,
        field: &str,
        value: impl Into<Value>,
    ) -> OdmResult<T> {
        let metadata = self.metadata_factory.get_metadata_for(T::CLASS_NAME)?;
        let snapshot = self
            .unit_of_work
            .load(&metadata, &value.into(), &FindOptions::by_field(field))
            .await?;
        from_snapshot(snapshot)
    }

    /// Returns the repository of an entity class.
    pub fn get_repository<T: Entity>(&self) -> OdmResult<Repository<'_, T>> {
        Repository::new(self)
    }

    /// Creates a query bound to this manager.
    pub fn create_query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Creates the index and type mapping of an entity class.
    pub async fn create_index_for<T: Entity>(&self) -> OdmResult<()> {
        self.create_index_for_class(T::CLASS_NAME).await
    }

    /// Creates the index of a class if missing, then registers its type mapping.
    pub async fn create_index_for_class(&self, class_name: &str) -> OdmResult<()> {
        let metadata = self.metadata_factory.get_metadata_for(class_name)?;
        if !self.client.index_exists(&metadata.index).await? {
            self.client
                .create_index(&metadata.index, &schema::index_settings(&metadata))
                .await?;
        }
        self.client.create_type(&metadata).await?;
        tracing::info!(
            "Created index '{}' with type '{}' for {}",
            metadata.index,
            metadata.type_name,
            class_name
        );
        Ok(())
    }

    /// Deletes the index of an entity class.
    pub async fn drop_index_for<T: Entity>(&self) -> OdmResult<()> {
        let metadata = self.metadata_factory.get_metadata_for(T::CLASS_NAME)?;
        self.client.delete_index(&metadata.index).await
    }

    /// Makes recent writes to the index of an entity class searchable.
    pub async fn refresh<T: Entity>(&self) -> OdmResult<()> {
        let metadata = self.metadata_factory.get_metadata_for(T::CLASS_NAME)?;
        self.client.refresh_index(&metadata.index).await
    }
}
