//! Mapping drivers.
//!
//! A [`MappingDriver`] knows where the mapping declarations of entity classes
//! live and fills a blank [`ClassMetadata`] from them. Two drivers ship with
//! the crate:
//!
//! - [`StaticDriver`] - declarations registered in code at startup
//! - [`JsonDriver`] - declarations read from JSON mapping documents
//!
//! # Example
//!
//! ```
//! use helios_odm::mapping::{
//!     ClassAnnotation, FieldDeclaration, FieldKind, MappingDriver, PropertyDeclaration,
//!     StaticDriver, TypeDeclaration,
//! };
//!
//! let driver = StaticDriver::new();
//! driver.register(
//!     "User",
//!     TypeDeclaration::new()
//!         .annotate(ClassAnnotation::elastic_searchable("users", "user"))
//!         .property(PropertyDeclaration::new("id").id())
//!         .property(PropertyDeclaration::new("name").field(FieldDeclaration::of(FieldKind::Text))),
//! );
//!
//! assert!(!driver.is_transient("User"));
//! assert_eq!(driver.get_all_class_names(), vec!["User".to_string()]);
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

use parking_lot::RwLock;

use crate::entity::Entity;
use crate::error::MappingError;

use super::declaration::TypeDeclaration;
use super::metadata::ClassMetadata;

/// Source of mapping declarations for entity classes.
pub trait MappingDriver: Send + Sync + Debug {
    /// Populates blank metadata for the given class.
    ///
    /// # Errors
    ///
    /// * `MappingError::InvalidMapping` - if the class has no usable declaration
    /// * `MappingError::MissingAttribute` - if a field lacks a required attribute
    fn load_metadata_for_class(
        &self,
        class_name: &str,
        metadata: &mut ClassMetadata,
    ) -> Result<(), MappingError>;

    /// Returns true if the class is not mapped to any index.
    fn is_transient(&self, class_name: &str) -> bool;

    /// Returns the names of all classes this driver knows about.
    fn get_all_class_names(&self) -> Vec<String>;
}

/// Driver for declarations registered in code.
#[derive(Debug, Default)]
pub struct StaticDriver {
    declarations: RwLock<HashMap<String, TypeDeclaration>>,
}

impl StaticDriver {
    /// Creates an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the declaration of a class.
    pub fn register(&self, class_name: impl Into<String>, declaration: TypeDeclaration) {
        self.declarations.write().insert(class_name.into(), declaration);
    }

    /// Registers the declaration of an entity type.
    pub fn register_entity<T: Entity>(&self, declaration: TypeDeclaration) {
        self.register(T::CLASS_NAME, declaration);
    }

    /// Builder-style registration.
    pub fn with(self, class_name: impl Into<String>, declaration: TypeDeclaration) -> Self {
        self.register(class_name, declaration);
        self
    }

    /// Returns the number of registered classes.
    pub fn len(&self) -> usize {
        self.declarations.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.declarations.read().is_empty()
    }
}

impl MappingDriver for StaticDriver {
    fn load_metadata_for_class(
        &self,
        class_name: &str,
        metadata: &mut ClassMetadata,
    ) -> Result<(), MappingError> {
        let declarations = self.declarations.read();
        let declaration = declarations
            .get(class_name)
            .ok_or_else(|| MappingError::invalid(class_name, "no mapping declared"))?;
        declaration.apply(metadata)
    }

    fn is_transient(&self, class_name: &str) -> bool {
        self.declarations
            .read()
            .get(class_name)
            .map(|d| !d.is_mapped())
            .unwrap_or(true)
    }

    fn get_all_class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.declarations.read().keys().cloned().collect();
        names.sort();
        names
    }
}

/// Driver for declarations stored as JSON mapping documents.
///
/// A mapping document is a JSON object keyed by class name:
///
/// ```json
/// {
///   "User": {
///     "annotations": [{"annotation": "elastic_searchable", "index": "users", "type": "user"}],
///     "properties": [
///       {"name": "id", "annotations": [{"annotation": "id"}]},
///       {"name": "username", "annotations": [{"annotation": "field", "type": "keyword"}]}
///     ]
///   }
/// }
/// ```
#[derive(Debug, Default)]
pub struct JsonDriver {
    inner: StaticDriver,
}

impl JsonDriver {
    /// Creates an empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver from a single mapping document.
    pub fn from_json_str(document: &str) -> Result<Self, MappingError> {
        let driver = Self::new();
        driver.load_document("<inline>", document)?;
        Ok(driver)
    }

    /// Creates a driver from every `*.json` file in a directory.
    ///
    /// Files are read in name order; a class declared twice keeps the last
    /// declaration read.
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        let load_failed = |message: String| MappingError::LoadFailed {
            source_name: path.display().to_string(),
            message,
        };

        let mut files: Vec<_> = std::fs::read_dir(path)
            .map_err(|e| load_failed(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        let driver = Self::new();
        for file in files {
            let content = std::fs::read_to_string(&file).map_err(|e| MappingError::LoadFailed {
                source_name: file.display().to_string(),
                message: e.to_string(),
            })?;
            driver.load_document(&file.display().to_string(), &content)?;
        }

        tracing::debug!(
            "Loaded {} mapping declarations from {}",
            driver.inner.len(),
            path.display()
        );
        Ok(driver)
    }

    /// Adds the declarations of a mapping document.
    pub fn load_document(&self, source_name: &str, document: &str) -> Result<(), MappingError> {
        let declarations: HashMap<String, TypeDeclaration> = serde_json::from_str(document)
            .map_err(|e| MappingError::LoadFailed {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;
        for (class_name, declaration) in declarations {
            self.inner.register(class_name, declaration);
        }
        Ok(())
    }
}

impl MappingDriver for JsonDriver {
    fn load_metadata_for_class(
        &self,
        class_name: &str,
        metadata: &mut ClassMetadata,
    ) -> Result<(), MappingError> {
        self.inner.load_metadata_for_class(class_name, metadata)
    }

    fn is_transient(&self, class_name: &str) -> bool {
        self.inner.is_transient(class_name)
    }

    fn get_all_class_names(&self) -> Vec<String> {
        self.inner.get_all_class_names()
    }
}
