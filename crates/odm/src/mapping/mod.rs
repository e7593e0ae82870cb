//! Mapping metadata.
//!
//! This module turns mapping declarations into [`ClassMetadata`]:
//!
//! - [`declaration`] - the annotation vocabulary
//! - [`driver`] - where declarations come from
//! - [`factory`] - loading, validation and caching of metadata
//! - [`metadata`] - the resulting per-class description

pub mod declaration;
pub mod driver;
pub mod factory;
pub mod metadata;

pub use declaration::{
    ClassAnnotation, FieldDeclaration, NamedField, PropertyAnnotation, PropertyDeclaration,
    TypeDeclaration,
};
pub use driver::{JsonDriver, MappingDriver, StaticDriver};
pub use factory::MetadataFactory;
pub use metadata::{
    ClassMetadata, DEFAULT_REPLICAS, DEFAULT_SHARDS, FieldKind, FieldMapping, ParameterMapping,
    RootMapping, params,
};
