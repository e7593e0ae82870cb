//! Metadata factory.
//!
//! The factory is the only owner of [`ClassMetadata`]. Metadata is built
//! lazily on first request, handed to `LoadClassMetadata` listeners for
//! adjustment, validated and then cached for the lifetime of the factory
//! (or until [`MetadataFactory::clear_cache`]).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;

use crate::config::OdmConfig;
use crate::error::{MappingError, OdmResult};
use crate::events::{EventArgs, EventManager, Events};

use super::driver::MappingDriver;
use super::metadata::ClassMetadata;

/// Builds and caches class metadata.
#[derive(Debug)]
pub struct MetadataFactory {
    driver: Arc<dyn MappingDriver>,
    events: Arc<EventManager>,
    cache: RwLock<HashMap<String, Arc<ClassMetadata>>>,
    cache_enabled: bool,
    index_pattern: Regex,
}

impl MetadataFactory {
    /// Creates a factory over a mapping driver.
    pub fn new(
        driver: Arc<dyn MappingDriver>,
        events: Arc<EventManager>,
        config: &OdmConfig,
    ) -> Result<Self, MappingError> {
        let index_pattern =
            Regex::new(&config.index_name_pattern).map_err(|e| MappingError::InvalidPattern {
                pattern: config.index_name_pattern.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            driver,
            events,
            cache: RwLock::new(HashMap::new()),
            cache_enabled: config.metadata_cache_enabled,
            index_pattern,
        })
    }

    /// Returns the mapping driver.
    pub fn driver(&self) -> &Arc<dyn MappingDriver> {
        &self.driver
    }

    /// Returns the metadata of a class, loading it on first request.
    ///
    /// # Errors
    ///
    /// * `MappingError::InvalidMapping` - if the class has no usable declaration
    /// * `MappingError::MissingAttribute` - if a field lacks a required attribute
    /// * `MappingError::InvalidIndexName` - if the declared index is unusable
    pub fn get_metadata_for(&self, class_name: &str) -> OdmResult<Arc<ClassMetadata>> {
        if let Some(metadata) = self.cache.read().get(class_name) {
            return Ok(Arc::clone(metadata));
        }

        let metadata = Arc::new(self.load(class_name)?);
        if !self.cache_enabled {
            return Ok(metadata);
        }

        // A concurrent load may have won the race; keep the first instance.
        let mut cache = self.cache.write();
        let cached = cache
            .entry(class_name.to_string())
            .or_insert_with(|| Arc::clone(&metadata));
        Ok(Arc::clone(cached))
    }

    /// Returns true if metadata for the class is already cached.
    pub fn has_metadata_for(&self, class_name: &str) -> bool {
        self.cache.read().contains_key(class_name)
    }

    /// Returns true if the driver does not map the class.
    pub fn is_transient(&self, class_name: &str) -> bool {
        self.driver.is_transient(class_name)
    }

    /// Loads the metadata of every class the driver maps.
    pub fn get_all_metadata(&self) -> OdmResult<Vec<Arc<ClassMetadata>>> {
        self.driver
            .get_all_class_names()
            .iter()
            .filter(|name| !self.driver.is_transient(name))
            .map(|name| self.get_metadata_for(name))
            .collect()
    }

    /// Drops every cached entry.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        tracing::debug!("Clearing {} cached class metadata entries", cache.len());
        cache.clear();
    }

    /// Returns a copy of every cached entry, e.g. to persist it externally.
    pub fn export_cache(&self) -> Vec<ClassMetadata> {
        let mut entries: Vec<ClassMetadata> = self
            .cache
            .read()
            .values()
            .map(|m| ClassMetadata::clone(m))
            .collect();
        entries.sort_by(|a, b| a.class_name.cmp(&b.class_name));
        entries
    }

    /// Seeds the cache with previously exported metadata.
    ///
    /// Seeded entries bypass the driver and `LoadClassMetadata` listeners.
    pub fn warm_cache(&self, entries: Vec<ClassMetadata>) {
        let mut cache = self.cache.write();
        for metadata in entries {
            cache.insert(metadata.class_name.clone(), Arc::new(metadata));
        }
    }

    fn load(&self, class_name: &str) -> OdmResult<ClassMetadata> {
        let mut metadata = ClassMetadata::new(class_name);
        self.driver.load_metadata_for_class(class_name, &mut metadata)?;

        self.events.dispatch(
            Events::LoadClassMetadata,
            &mut EventArgs::LoadClassMetadata {
                metadata: &mut metadata,
            },
        )?;

        self.validate(&metadata)?;

        tracing::debug!(
            "Loaded metadata for {} (index: {}, type: {}, {} fields)",
            class_name,
            metadata.index,
            metadata.type_name,
            metadata.field_mappings.len()
        );
        Ok(metadata)
    }

    fn validate(&self, metadata: &ClassMetadata) -> Result<(), MappingError> {
        let class_name = &metadata.class_name;
        if metadata.identifier.is_empty() {
            return Err(MappingError::invalid(class_name, "no identifier property declared"));
        }
        if metadata.type_name.is_empty() {
            return Err(MappingError::invalid(class_name, "no type declared"));
        }
        if !self.index_pattern.is_match(&metadata.index) {
            return Err(MappingError::InvalidIndexName {
                class_name: class_name.clone(),
                index: metadata.index.clone(),
            });
        }
        Ok(())
    }
}
