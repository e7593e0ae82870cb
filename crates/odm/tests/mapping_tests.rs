//! Mapping integration tests.
//!
//! Covers metadata caching through the manager, declarations loaded from
//! mapping files, and index/type creation from metadata.

mod common;

use std::sync::Arc;

use common::{Comment, Post, User, create_manager};
use helios_odm::backend::{MemoryBackend, SearchClient};
use helios_odm::error::MappingError;
use helios_odm::events::{EventArgs, Events};
use helios_odm::mapping::{JsonDriver, MappingDriver};
use helios_odm::{OdmConfig, OdmError, SearchManager};

const USER_MAPPING: &str = r#"{
    "User": {
        "annotations": [{"annotation": "elastic_searchable", "index": "accounts", "type": "account"}],
        "properties": [
            {"name": "id", "annotations": [{"annotation": "id"}]},
            {"name": "name", "annotations": [{"annotation": "field", "type": "text"}]},
            {"name": "username", "annotations": [{"annotation": "field", "type": "keyword", "name": "login"}]}
        ]
    }
}"#;

const DRAFT_MAPPING: &str = r#"{
    "Draft": {
        "annotations": [],
        "properties": [
            {"name": "id", "annotations": [{"annotation": "id"}]}
        ]
    }
}"#;

fn memory_manager(config: OdmConfig) -> (SearchManager, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new().with_auto_refresh(true));
    let manager = create_manager(config, Arc::clone(&backend) as Arc<dyn SearchClient>);
    (manager, backend)
}

// ============================================================================
// Metadata factory
// ============================================================================

#[test]
fn test_metadata_is_cached_per_manager() {
    let (manager, _backend) = memory_manager(OdmConfig::default());

    let first = manager.get_class_metadata("User").unwrap();
    let second = manager.get_class_metadata("User").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.index, "users");
    assert_eq!(first.type_name, "user");
    assert_eq!(first.identifier, "id");

    manager.metadata_factory().clear_cache();
    let reloaded = manager.get_class_metadata("User").unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(*first, *reloaded);
}

#[test]
fn test_metadata_cache_can_be_disabled() {
    let (manager, _backend) = memory_manager(OdmConfig::default().with_metadata_cache(false));

    let first = manager.get_class_metadata("User").unwrap();
    let second = manager.get_class_metadata("User").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_unmapped_class_is_invalid_mapping() {
    let (manager, _backend) = memory_manager(OdmConfig::default());

    let err = manager.get_class_metadata("Ghost").unwrap_err();
    assert!(matches!(
        err,
        OdmError::Mapping(MappingError::InvalidMapping { .. })
    ));
}

#[test]
fn test_load_class_metadata_listener_runs_once() {
    let (manager, _backend) = memory_manager(OdmConfig::default());
    manager
        .event_manager()
        .add_listener_fn(Events::LoadClassMetadata, |args| {
            if let EventArgs::LoadClassMetadata { metadata } = args {
                metadata.number_of_replicas = 2;
            }
            Ok(())
        });

    let metadata = manager.get_class_metadata("Post").unwrap();
    assert_eq!(metadata.number_of_replicas, 2);
    assert!(metadata.parent.is_none());

    let comment = manager.get_class_metadata("Comment").unwrap();
    assert_eq!(comment.parent.as_deref(), Some("post"));
}

// ============================================================================
// Mapping files
// ============================================================================

#[test]
fn test_json_driver_reads_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("users.json"), USER_MAPPING).unwrap();
    std::fs::write(dir.path().join("drafts.json"), DRAFT_MAPPING).unwrap();
    std::fs::write(dir.path().join("README.txt"), "not a mapping").unwrap();

    let driver = JsonDriver::from_directory(dir.path()).unwrap();
    assert_eq!(driver.get_all_class_names(), vec!["Draft", "User"]);
    assert!(driver.is_transient("Draft"));
    assert!(!driver.is_transient("User"));
}

#[test]
fn test_json_driver_rejects_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

    let err = JsonDriver::from_directory(dir.path()).unwrap_err();
    assert!(matches!(err, MappingError::LoadFailed { .. }));
}

#[test]
fn test_json_driver_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nowhere");

    let err = JsonDriver::from_directory(&missing).unwrap_err();
    assert!(matches!(err, MappingError::LoadFailed { .. }));
}

#[tokio::test]
async fn test_json_mapping_drives_persistence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("users.json"), USER_MAPPING).unwrap();
    let driver = JsonDriver::from_directory(dir.path()).unwrap();

    let backend = Arc::new(MemoryBackend::new().with_auto_refresh(true));
    let mut manager = SearchManager::new(
        OdmConfig::default(),
        Arc::clone(&backend) as Arc<dyn SearchClient>,
        Arc::new(driver),
    )
    .unwrap();

    manager.persist(&User::new("u1", "Hash", "mrhash")).unwrap();
    manager.flush().await.unwrap();

    assert_eq!(backend.document_count("accounts"), 1);
    let user: User = manager.find_by_field("username", "mrhash").await.unwrap();
    assert_eq!(user.name, "Hash");

    // Transient classes cannot be staged.
    let err = manager.get_class_metadata("Draft").unwrap_err();
    assert!(matches!(err, OdmError::Mapping(_)));
}

// ============================================================================
// Index lifecycle
// ============================================================================

#[tokio::test]
async fn test_create_index_installs_type_mappings() {
    let (manager, backend) = memory_manager(OdmConfig::default());

    manager.create_index_for::<Post>().await.unwrap();
    manager.create_index_for::<Comment>().await.unwrap();

    assert!(backend.index_exists("blog").await.unwrap());
    let settings = backend.settings("blog").unwrap();
    assert!(settings.get("number_of_shards").is_some());

    let post = backend.mapping("blog", "post").unwrap();
    assert_eq!(post["properties"]["title"]["type"], "text");

    let comment = backend.mapping("blog", "comment").unwrap();
    assert_eq!(comment["properties"]["author_name"]["type"], "keyword");
    assert_eq!(comment["_routing"]["required"], true);
    assert_eq!(comment["_meta"]["parent"], "post");
}

#[tokio::test]
async fn test_drop_index_removes_documents() {
    let (mut manager, backend) = memory_manager(OdmConfig::default());

    manager.create_index_for::<User>().await.unwrap();
    manager.persist(&User::new("u1", "Hash", "mrhash")).unwrap();
    manager.flush().await.unwrap();
    assert_eq!(backend.document_count("users"), 1);

    manager.drop_index_for::<User>().await.unwrap();
    assert!(!backend.index_exists("users").await.unwrap());
    assert!(manager.find::<User>("u1").await.unwrap_err().is_no_result());

    // Dropping twice is not an error.
    manager.drop_index_for::<User>().await.unwrap();
}
