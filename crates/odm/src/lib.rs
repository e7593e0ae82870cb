//! Helios Object-Document Mapper
//!
//! This crate persists application entities to search engine backends and
//! hydrates search hits back into typed entities. The mapping of an entity
//! onto an index is declared separately from the entity type and turned into
//! [`ClassMetadata`](mapping::ClassMetadata) by a pluggable mapping driver.
//!
//! # Features
//!
//! - **Declarative Mapping**: field, parameter and root mappings with nested,
//!   object and multi-field sub-mappings
//! - **Unit of Work**: staged persists and removals, committed in per-class
//!   bulk calls with removals first
//! - **Queries**: backend-native query objects with bypass, internal and
//!   secondary-datastore hydration
//! - **Lifecycle Events**: ordered listeners for persist, remove, flush,
//!   clear, metadata load and post-load hooks
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! helios-odm = { version = "0.1", features = ["elasticsearch"] }
//! ```
//!
//! - `elasticsearch` - Elasticsearch 8 through the official client
//!
//! The in-process [`MemoryBackend`](backend::MemoryBackend) is always
//! available.
//!
//! # Architecture
//!
//! - [`mapping`] - Declarations, drivers, class metadata and the metadata factory
//! - [`backend`] - The search client contract, schema translation and backends
//! - [`serializer`] - Entity snapshot to document conversion
//! - [`unit_of_work`] - Staging, commit protocol and hydration
//! - [`query`] - Query builder and hydration modes
//! - [`events`] - Listener registry
//! - [`manager`] / [`repository`] - Typed facade
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helios_odm::backend::MemoryBackend;
//! use helios_odm::mapping::JsonDriver;
//! use helios_odm::{Entity, OdmConfig, SearchManager};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//!     username: String,
//! }
//!
//! impl Entity for User {
//!     const CLASS_NAME: &'static str = "User";
//! }
//!
//! # async fn run() -> helios_odm::OdmResult<()> {
//! let driver = JsonDriver::from_directory("mappings")?;
//! let mut manager = SearchManager::new(
//!     OdmConfig::default().with_force_refresh(true),
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(driver),
//! )?;
//!
//! manager.persist(&User {
//!     id: "u1".to_string(),
//!     name: "Hash".to_string(),
//!     username: "mrhash".to_string(),
//! })?;
//! manager.flush().await?;
//!
//! let user: User = manager.find_by_field("username", "mrhash").await?;
//! assert_eq!(user.name, "Hash");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod manager;
pub mod mapping;
pub mod query;
pub mod repository;
pub mod serializer;
pub mod unit_of_work;

// Re-export commonly used types at crate root
pub use config::OdmConfig;
pub use entity::Entity;
pub use error::{OdmError, OdmResult};
pub use manager::SearchManager;
pub use repository::Repository;

// Re-export core traits
pub use backend::SearchClient;
pub use mapping::MappingDriver;
pub use query::{HydrationQuery, NativeQuery};
pub use serializer::Serializer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
