//! Unit of work.
//!
//! The [`UnitOfWork`] collects persist and remove operations and applies them
//! to the backend in one commit. Operations are staged under a [`StageKey`]:
//! the entity's class and identifier once it has one, otherwise an ephemeral
//! handle assigned at staging time. Staging the same key again replaces the
//! earlier operation, so the last call wins.
//!
//! # Commit protocol
//!
//! 1. `PreFlush` fires.
//! 2. Removals are sent, one `remove_documents` call per class.
//! 3. Persists are serialized and sent, one `add_documents` call per class.
//! 4. With `force_refresh`, every touched index is refreshed once.
//! 5. The stage is cleared and `PostFlush` fires.
//!
//! Removals run first so that removing and re-persisting an identifier in the
//! same cycle leaves the document in place. Each class group leaves the stage
//! as soon as the backend accepted it; when a later group fails, the commit
//! stops and only the unprocessed groups remain staged. Applied groups are not
//! rolled back.
//!
//! # States
//!
//! ```text
//! Idle --persist/remove--> Staged --commit--> Committing --> Idle
//!                            ^                    |
//!                            +------ failure -----+
//! ```
//!
//! `commit` takes `&mut self`, so no operation can be staged while a commit is
//! in flight. Dropping an unfinished commit future returns the unit of work to
//! `Staged` with the unprocessed groups intact.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::backend::{Document, DocumentBatch, FindOptions, RawDocument, SearchClient, SearchResults};
use crate::entity::ensure_object;
use crate::error::{BackendError, OdmError, OdmResult, QueryError, UnitOfWorkError};
use crate::events::{EventArgs, EventManager, Events, LifecycleEventArgs};
use crate::mapping::{ClassMetadata, FieldKind, MetadataFactory, params};
use crate::serializer::Serializer;

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Nothing staged.
    Idle,
    /// At least one operation staged.
    Staged,
    /// A commit is in progress.
    Committing,
}

/// Identity under which an operation is staged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StageKey {
    /// An entity with a resolvable identifier.
    Identified {
        /// Entity class.
        class_name: String,
        /// Identifier value.
        id: String,
    },
    /// An entity without identifier, keyed by a handle unique to this unit of work.
    Ephemeral(u64),
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKey::Identified { class_name, id } => write!(f, "{}#{}", class_name, id),
            StageKey::Ephemeral(handle) => write!(f, "<unidentified {}>", handle),
        }
    }
}

/// Kind of a staged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Write the entity.
    Persist,
    /// Delete the entity.
    Remove,
}

#[derive(Debug, Clone)]
struct StagedOperation {
    metadata: Arc<ClassMetadata>,
    entity: Value,
    operation: Operation,
    sequence: u64,
}

#[derive(Debug)]
struct Group {
    metadata: Arc<ClassMetadata>,
    keys: Vec<StageKey>,
}

/// Tracks pending writes and hydrates backend documents.
pub struct UnitOfWork {
    metadata_factory: Arc<MetadataFactory>,
    client: Arc<dyn SearchClient>,
    serializer: Arc<dyn Serializer>,
    events: Arc<EventManager>,
    staged: HashMap<StageKey, StagedOperation>,
    state: UnitOfWorkState,
    next_sequence: u64,
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("client", &self.client.name())
            .field("state", &self.state)
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

/// Restores a consistent state if a commit stops early.
struct CommitGuard<'a> {
    uow: &'a mut UnitOfWork,
    finished: bool,
}

impl Drop for CommitGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.uow.state = if self.uow.staged.is_empty() {
                UnitOfWorkState::Idle
            } else {
                UnitOfWorkState::Staged
            };
        }
    }
}

impl UnitOfWork {
    /// Creates an idle unit of work.
    pub fn new(
        metadata_factory: Arc<MetadataFactory>,
        client: Arc<dyn SearchClient>,
        serializer: Arc<dyn Serializer>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            metadata_factory,
            client,
            serializer,
            events,
            staged: HashMap::new(),
            state: UnitOfWorkState::Idle,
            next_sequence: 0,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Returns the number of staged operations.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Returns the operation staged under a key.
    pub fn staged_operation(&self, key: &StageKey) -> Option<Operation> {
        self.staged.get(key).map(|op| op.operation)
    }

    /// Returns the backend client.
    pub fn client(&self) -> &Arc<dyn SearchClient> {
        &self.client
    }

    /// Stages an entity for persistence.
    ///
    /// `PrePersist` listeners run before the stage key is computed and may
    /// assign an identifier.
    pub fn persist(&mut self, class_name: &str, entity: Value) -> OdmResult<StageKey> {
        self.stage(class_name, entity, Operation::Persist)
    }

    /// Stages an entity for removal.
    pub fn remove(&mut self, class_name: &str, entity: Value) -> OdmResult<StageKey> {
        self.stage(class_name, entity, Operation::Remove)
    }

    fn stage(
        &mut self,
        class_name: &str,
        entity: Value,
        operation: Operation,
    ) -> OdmResult<StageKey> {
        let metadata = self.metadata_factory.get_metadata_for(class_name)?;
        let mut entity = ensure_object(class_name, entity)?;

        let (pre, post) = match operation {
            Operation::Persist => (Events::PrePersist, Events::PostPersist),
            Operation::Remove => (Events::PreRemove, Events::PostRemove),
        };
        self.dispatch_lifecycle(pre, &metadata, &mut entity)?;

        let key = match identifier_of(&metadata, &entity) {
            Some(id) => StageKey::Identified {
                class_name: metadata.class_name.clone(),
                id,
            },
            None => StageKey::Ephemeral(self.next_sequence),
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut snapshot = entity.clone();
        let replaced = self.staged.insert(
            key.clone(),
            StagedOperation {
                metadata: Arc::clone(&metadata),
                entity,
                operation,
                sequence,
            },
        );
        self.state = UnitOfWorkState::Staged;

        if let Some(previous) = replaced {
            tracing::debug!(
                "Restaged {} as {:?} (was {:?})",
                key,
                operation,
                previous.operation
            );
        }

        self.dispatch_lifecycle(post, &metadata, &mut snapshot)?;
        Ok(key)
    }

    /// Drops staged operations, either all of them or those of one class.
    pub fn clear(&mut self, class_name: Option<&str>) -> OdmResult<()> {
        match class_name {
            None => self.staged.clear(),
            Some(class_name) => self
                .staged
                .retain(|_, op| op.metadata.class_name != class_name),
        }
        if self.staged.is_empty() {
            self.state = UnitOfWorkState::Idle;
        }

        tracing::debug!(
            "Cleared staged operations for {}",
            class_name.unwrap_or("all classes")
        );
        self.events
            .dispatch(Events::OnClear, &mut EventArgs::Clear { class_name })
    }

    /// Applies every staged operation to the backend.
    ///
    /// # Errors
    ///
    /// * `UnitOfWorkError::MissingIdentifier` - if a staged entity has no identifier
    /// * Backend errors, passed through unchanged
    ///
    /// On error the groups that were not yet sent remain staged.
    pub async fn commit(&mut self, force_refresh: bool) -> OdmResult<()> {
        self.events.dispatch(Events::PreFlush, &mut EventArgs::Flush)?;

        self.state = UnitOfWorkState::Committing;
        let mut guard = CommitGuard {
            uow: self,
            finished: false,
        };
        let uow = &mut *guard.uow;

        let mut touched: Vec<String> = Vec::new();
        let mut removed = 0usize;
        let mut written = 0usize;

        for group in uow.groups(Operation::Remove) {
            let metadata = &group.metadata;
            let ids = group
                .keys
                .iter()
                .map(|key| uow.staged_identifier(key, metadata))
                .collect::<OdmResult<Vec<_>>>()?;

            tracing::debug!(
                "Removing {} {} document(s) from '{}'",
                ids.len(),
                metadata.class_name,
                metadata.index
            );
            uow.client.remove_documents(metadata, &ids).await?;

            removed += ids.len();
            touch(&mut touched, &metadata.index);
            for key in &group.keys {
                uow.staged.remove(key);
            }
        }

        for group in uow.groups(Operation::Persist) {
            let metadata = &group.metadata;
            let mut batch = DocumentBatch::new();
            for key in &group.keys {
                let document = uow.build_document(key, metadata)?;
                batch.insert(document.id.clone(), document);
            }

            tracing::debug!(
                "Writing {} {} document(s) to '{}'",
                batch.len(),
                metadata.class_name,
                metadata.index
            );
            uow.client.add_documents(metadata, &batch).await?;

            written += batch.len();
            touch(&mut touched, &metadata.index);
            for key in &group.keys {
                uow.staged.remove(key);
            }
        }

        // A removal against an index that never existed still touches it.
        if force_refresh {
            for index in &touched {
                match uow.client.refresh_index(index).await {
                    Ok(()) => {}
                    Err(OdmError::Backend(BackendError::IndexNotFound { .. })) => {
                        tracing::debug!("Skipping refresh of missing index '{}'", index);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        uow.staged.clear();
        uow.state = UnitOfWorkState::Idle;
        guard.finished = true;
        drop(guard);

        tracing::debug!(
            "Committed {} removal(s) and {} write(s) across {} index(es)",
            removed,
            written,
            touched.len()
        );
        self.events.dispatch(Events::PostFlush, &mut EventArgs::Flush)
    }

    /// Loads and hydrates a single document.
    ///
    /// With `options.field` set, `value` is matched against that property;
    /// otherwise `value` is the identifier.
    ///
    /// # Errors
    ///
    /// * `OdmError::NoResult` - if nothing matches
    pub async fn load(
        &self,
        metadata: &ClassMetadata,
        value: &Value,
        options: &FindOptions,
    ) -> OdmResult<Value> {
        let raw = match &options.field {
            Some(field) => {
                let backend_field = metadata.backend_field_name(field);
                self.client
                    .find_one_by(metadata, backend_field, value)
                    .await?
                    .ok_or_else(|| {
                        OdmError::no_result(&metadata.class_name, format!("{}={}", field, value))
                    })?
            }
            None => {
                let id = id_from_value(&metadata.class_name, value)?;
                self.client
                    .find(metadata, &id, options)
                    .await?
                    .ok_or_else(|| OdmError::no_result(&metadata.class_name, format!("id={}", id)))?
            }
        };
        self.hydrate(metadata, raw)
    }

    /// Searches across several classes and hydrates every hit.
    pub async fn load_collection(
        &self,
        metadata: &[Arc<ClassMetadata>],
        query: &Value,
    ) -> OdmResult<Vec<Value>> {
        let results = self.client.search(query, metadata).await?;
        self.hydrate_results(metadata, &results)
    }

    /// Hydrates the hits of a search result.
    ///
    /// Each hit is hydrated with the candidate whose index and type match the
    /// ones the backend reported for it.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnexpectedResultType` - if no candidate matches a hit
    pub fn hydrate_results(
        &self,
        candidates: &[Arc<ClassMetadata>],
        results: &SearchResults,
    ) -> OdmResult<Vec<Value>> {
        results
            .hits
            .iter()
            .map(|raw| {
                let metadata = candidates
                    .iter()
                    .find(|m| m.matches(&raw.index, &raw.type_name))
                    .ok_or_else(|| QueryError::UnexpectedResultType {
                        message: format!(
                            "document '{}' from {}/{} matches none of the queried classes",
                            raw.id, raw.index, raw.type_name
                        ),
                    })?;
                self.hydrate(metadata, raw.clone())
            })
            .collect()
    }

    /// Turns a raw backend document into an entity snapshot.
    pub fn hydrate(&self, metadata: &ClassMetadata, raw: RawDocument) -> OdmResult<Value> {
        let mut fields: Map<String, Value> = raw.source;
        for (name, value) in raw.params {
            if metadata.parameter_by_name(&name).is_some() {
                fields.insert(name, value);
            }
        }
        if let Some(version) = raw.version {
            fields.insert(params::VERSION.to_string(), Value::from(version));
        }
        let id_field = metadata.backend_field_name(&metadata.identifier).to_string();
        if fields.get(&id_field).is_none_or(Value::is_null) {
            fields.insert(id_field, typed_identifier(metadata, raw.id));
        }

        let mut entity = self.serializer.deserialize(metadata, fields)?;
        self.dispatch_lifecycle(Events::PostLoad, metadata, &mut entity)?;
        Ok(entity)
    }

    fn dispatch_lifecycle(
        &self,
        event: Events,
        metadata: &ClassMetadata,
        entity: &mut Value,
    ) -> OdmResult<()> {
        self.events.dispatch(
            event,
            &mut EventArgs::Lifecycle(LifecycleEventArgs { metadata, entity }),
        )
    }

    // Groups keep the order in which their first operation was staged.
    fn groups(&self, operation: Operation) -> Vec<Group> {
        let mut staged: Vec<(&StageKey, &StagedOperation)> = self
            .staged
            .iter()
            .filter(|(_, op)| op.operation == operation)
            .collect();
        staged.sort_by_key(|(_, op)| op.sequence);

        let mut groups: Vec<Group> = Vec::new();
        for (key, op) in staged {
            match groups
                .iter_mut()
                .find(|g| g.metadata.class_name == op.metadata.class_name)
            {
                Some(group) => group.keys.push(key.clone()),
                None => groups.push(Group {
                    metadata: Arc::clone(&op.metadata),
                    keys: vec![key.clone()],
                }),
            }
        }
        groups
    }

    fn staged_identifier(&self, key: &StageKey, metadata: &ClassMetadata) -> OdmResult<String> {
        self.staged
            .get(key)
            .and_then(|op| identifier_of(metadata, &op.entity))
            .ok_or_else(|| missing_identifier(metadata))
    }

    fn build_document(&self, key: &StageKey, metadata: &ClassMetadata) -> OdmResult<Document> {
        let op = self
            .staged
            .get(key)
            .ok_or_else(|| missing_identifier(metadata))?;
        let mut fields = self.serializer.serialize(metadata, &op.entity)?;
        let id = identifier_of(metadata, &op.entity).ok_or_else(|| missing_identifier(metadata))?;
        // Backend ids are strings; numeric identifiers travel in the body too.
        if let Some(number @ Value::Number(_)) = op.entity.get(&metadata.identifier) {
            let id_field = metadata.backend_field_name(&metadata.identifier);
            if !fields.fields.contains_key(id_field) && !metadata.is_parameter(&metadata.identifier) {
                fields.fields.insert(id_field.to_string(), number.clone());
            }
        }
        let version = fields
            .params
            .remove(params::VERSION)
            .and_then(|v| v.as_u64());

        Ok(Document {
            id,
            fields: fields.fields,
            params: fields.params,
            version,
        })
    }
}

fn touch(touched: &mut Vec<String>, index: &str) {
    if !touched.iter().any(|t| t == index) {
        touched.push(index.to_string());
    }
}

fn missing_identifier(metadata: &ClassMetadata) -> OdmError {
    UnitOfWorkError::MissingIdentifier {
        class_name: metadata.class_name.clone(),
    }
    .into()
}

/// Returns the identifier of an entity snapshot, if it has a non-empty one.
pub(crate) fn identifier_of(metadata: &ClassMetadata, entity: &Value) -> Option<String> {
    match entity.get(&metadata.identifier)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

// Restores a numeric identifier declared with a numeric field kind.
fn typed_identifier(metadata: &ClassMetadata, id: String) -> Value {
    let kind = metadata.field(&metadata.identifier).map(|f| f.kind);
    match kind {
        Some(kind) if kind.is_integer() => {
            if let Ok(n) = id.parse::<u64>() {
                return Value::from(n);
            }
            if let Ok(n) = id.parse::<i64>() {
                return Value::from(n);
            }
        }
        Some(FieldKind::Float | FieldKind::Double) => {
            if let Some(n) = id.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                return Value::Number(n);
            }
        }
        _ => {}
    }
    Value::String(id)
}

fn id_from_value(class_name: &str, value: &Value) -> OdmResult<String> {
    match value {
        Value::String(id) => Ok(id.clone()),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(UnitOfWorkError::UnexpectedArgumentType {
            class_name: class_name.to_string(),
            found: other.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::OdmConfig;
    use crate::mapping::{
        ClassAnnotation, FieldDeclaration, FieldKind, FieldMapping, PropertyDeclaration,
        StaticDriver, TypeDeclaration,
    };
    use crate::serializer::MappingSerializer;
    use serde_json::json;

    fn driver() -> StaticDriver {
        StaticDriver::new()
            .with(
                "User",
                TypeDeclaration::new()
                    .annotate(ClassAnnotation::elastic_searchable("users", "user"))
                    .property(PropertyDeclaration::new("id").id())
                    .property(
                        PropertyDeclaration::new("username")
                            .field(FieldDeclaration::of(FieldKind::Keyword)),
                    ),
            )
            .with(
                "Comment",
                TypeDeclaration::new()
                    .annotate(ClassAnnotation::elastic_searchable("blog", "comment"))
                    .property(PropertyDeclaration::new("id").id())
                    .property(
                        PropertyDeclaration::new("body").field(FieldDeclaration::of(FieldKind::Text)),
                    ),
            )
    }

    fn unit_of_work(backend: Arc<MemoryBackend>) -> UnitOfWork {
        let events = Arc::new(EventManager::new());
        let factory = Arc::new(
            MetadataFactory::new(Arc::new(driver()), Arc::clone(&events), &OdmConfig::default())
                .unwrap(),
        );
        UnitOfWork::new(factory, backend, Arc::new(MappingSerializer::new()), events)
    }

    #[test]
    fn test_stage_key_uses_identifier() {
        let mut uow = unit_of_work(Arc::new(MemoryBackend::new()));
        assert_eq!(uow.state(), UnitOfWorkState::Idle);

        let first = uow.persist("User", json!({"id": "u1"})).unwrap();
        let second = uow.remove("User", json!({"id": "u1"})).unwrap();
        assert_eq!(first, second);
        assert_eq!(uow.len(), 1);
        assert_eq!(uow.staged_operation(&first), Some(Operation::Remove));
        assert_eq!(uow.state(), UnitOfWorkState::Staged);
    }

    #[test]
    fn test_unidentified_entities_get_distinct_handles() {
        let mut uow = unit_of_work(Arc::new(MemoryBackend::new()));
        let a = uow.persist("User", json!({"username": "a"})).unwrap();
        let b = uow.persist("User", json!({"username": "a"})).unwrap();
        assert!(matches!(a, StageKey::Ephemeral(_)));
        assert_ne!(a, b);
        assert_eq!(uow.len(), 2);
    }

    #[test]
    fn test_non_object_rejected() {
        let mut uow = unit_of_work(Arc::new(MemoryBackend::new()));
        let err = uow.persist("User", json!(["u1"])).unwrap_err();
        assert!(matches!(
            err,
            OdmError::UnitOfWork(UnitOfWorkError::UnexpectedArgumentType { .. })
        ));
        assert!(uow.is_empty());
    }

    #[test]
    fn test_partial_clear() {
        let mut uow = unit_of_work(Arc::new(MemoryBackend::new()));
        uow.persist("User", json!({"id": "u1"})).unwrap();
        uow.persist("Comment", json!({"id": "c1"})).unwrap();

        uow.clear(Some("User")).unwrap();
        assert_eq!(uow.len(), 1);
        assert_eq!(uow.state(), UnitOfWorkState::Staged);

        uow.clear(None).unwrap();
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn test_commit_missing_identifier_keeps_stage() {
        let backend = Arc::new(MemoryBackend::new());
        let mut uow = unit_of_work(Arc::clone(&backend));
        uow.persist("User", json!({"username": "ghost"})).unwrap();

        let err = uow.commit(false).await.unwrap_err();
        assert!(matches!(
            err,
            OdmError::UnitOfWork(UnitOfWorkError::MissingIdentifier { .. })
        ));
        assert_eq!(uow.state(), UnitOfWorkState::Staged);
        assert_eq!(uow.len(), 1);
        assert_eq!(backend.document_count("users"), 0);
    }

    #[tokio::test]
    async fn test_remove_then_persist_same_id() {
        let backend = Arc::new(MemoryBackend::new());
        let mut uow = unit_of_work(Arc::clone(&backend));
        uow.persist("User", json!({"id": "u1", "username": "old"}))
            .unwrap();
        uow.commit(false).await.unwrap();

        uow.remove("User", json!({"id": "u1"})).unwrap();
        uow.persist("User", json!({"id": "u1", "username": "new"}))
            .unwrap();
        uow.commit(false).await.unwrap();

        let metadata = uow.metadata_factory.get_metadata_for("User").unwrap();
        let user = uow
            .load(&metadata, &json!("u1"), &FindOptions::default())
            .await
            .unwrap();
        assert_eq!(user["username"], "new");
        assert_eq!(uow.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn test_load_missing_is_no_result() {
        let mut uow = unit_of_work(Arc::new(MemoryBackend::new()));
        uow.persist("User", json!({"id": "u1", "username": "mrhash"}))
            .unwrap();
        uow.commit(true).await.unwrap();

        let metadata = uow.metadata_factory.get_metadata_for("User").unwrap();
        let err = uow
            .load(&metadata, &json!("u2"), &FindOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_no_result());

        let err = uow
            .load(&metadata, &json!("nobody"), &FindOptions::by_field("username"))
            .await
            .unwrap_err();
        assert!(err.is_no_result());

        let user = uow
            .load(&metadata, &json!("mrhash"), &FindOptions::by_field("username"))
            .await
            .unwrap();
        assert_eq!(user["id"], "u1");
    }

    #[test]
    fn test_hydrate_rejects_unknown_index_and_type() {
        let uow = unit_of_work(Arc::new(MemoryBackend::new()));
        let users = uow.metadata_factory.get_metadata_for("User").unwrap();
        let results = SearchResults {
            total_hits: 1,
            facets: Map::new(),
            hits: vec![RawDocument {
                index: "archive".to_string(),
                type_name: "user".to_string(),
                id: "u1".to_string(),
                version: None,
                score: None,
                source: Map::new(),
                params: Map::new(),
            }],
        };
        let err = uow.hydrate_results(&[users], &results).unwrap_err();
        assert!(matches!(
            err,
            OdmError::Query(QueryError::UnexpectedResultType { .. })
        ));
    }

    #[test]
    fn test_identifier_of() {
        let mut metadata = ClassMetadata::new("User");
        metadata.identifier = "id".to_string();
        assert_eq!(identifier_of(&metadata, &json!({"id": "u1"})), Some("u1".to_string()));
        assert_eq!(identifier_of(&metadata, &json!({"id": 7})), Some("7".to_string()));
        assert_eq!(identifier_of(&metadata, &json!({"id": ""})), None);
        assert_eq!(identifier_of(&metadata, &json!({"id": null})), None);
        assert_eq!(identifier_of(&metadata, &json!({})), None);
    }

    #[test]
    fn test_typed_identifier_follows_field_kind() {
        let mut metadata = ClassMetadata::new("Ticket");
        metadata.identifier = "id".to_string();
        assert_eq!(typed_identifier(&metadata, "7".to_string()), json!("7"));

        metadata.field_mappings = vec![FieldMapping::new("id", FieldKind::Long)];
        assert_eq!(typed_identifier(&metadata, "7".to_string()), json!(7));
        assert_eq!(typed_identifier(&metadata, "-7".to_string()), json!(-7));
        assert_eq!(typed_identifier(&metadata, "t7".to_string()), json!("t7"));

        metadata.field_mappings = vec![FieldMapping::new("id", FieldKind::Double)];
        assert_eq!(typed_identifier(&metadata, "1.5".to_string()), json!(1.5));
    }

    #[test]
    fn test_hydrate_keeps_identifier_from_body() {
        let uow = unit_of_work(Arc::new(MemoryBackend::new()));
        let users = uow.metadata_factory.get_metadata_for("User").unwrap();
        let mut source = Map::new();
        source.insert("id".to_string(), json!(42));
        source.insert("username".to_string(), json!("mrhash"));

        let user = uow
            .hydrate(
                &users,
                RawDocument {
                    index: "users".to_string(),
                    type_name: "user".to_string(),
                    id: "42".to_string(),
                    version: None,
                    score: None,
                    source,
                    params: Map::new(),
                },
            )
            .unwrap();
        assert_eq!(user["id"], json!(42));
        assert_eq!(user["username"], "mrhash");
    }
}
