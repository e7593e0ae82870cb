//! Elasticsearch backend implementation.
//!
//! Talks to Elasticsearch 8 through the official `elasticsearch` client.
//!
//! # Index Structure
//!
//! Elasticsearch indices no longer carry mapping types, so several entity
//! types may share one index only through a discriminator. Every document is
//! stored with three reserved keyword fields:
//!
//! - `doc_type`: the mapped type name
//! - `doc_id`: the entity identifier
//! - `doc_parent`: the parent identifier of child types
//!
//! The Elasticsearch `_id` is `{type}_{id}`, so equal identifiers of
//! different types never collide. Searches filter on the `(_index, doc_type)`
//! pairs of the targeted classes. A parent identifier doubles as the routing
//! key unless an explicit `_routing` parameter is given.
//!
//! Physical index names carry the configured prefix; every result reports the
//! logical (unprefixed) name so it can be matched against class metadata.
//!
//! # Example
//!
//! ```ignore
//! use helios_odm::backend::{ElasticsearchBackend, ElasticsearchConfig};
//!
//! let config = ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let backend = ElasticsearchBackend::new(config)?;
//! ```

mod backend;
mod documents;
mod indices;
mod search;

pub use backend::{ElasticsearchAuth, ElasticsearchBackend, ElasticsearchConfig};
