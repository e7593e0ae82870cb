//! Lifecycle events.
//!
//! The [`EventManager`] keeps an ordered list of listeners per [`Events`]
//! hook. Listeners run synchronously in registration order; the first error a
//! listener returns aborts the operation that fired the event.
//!
//! # Example
//!
//! ```
//! use helios_odm::events::{EventArgs, EventManager, Events};
//!
//! let events = EventManager::new();
//! events.add_listener_fn(Events::PrePersist, |args| {
//!     if let EventArgs::Lifecycle(lifecycle) = args {
//!         lifecycle.entity["indexed"] = serde_json::json!(true);
//!     }
//!     Ok(())
//! });
//! assert!(events.has_listeners(Events::PrePersist));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::OdmResult;
use crate::mapping::ClassMetadata;

/// Named extension hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Events {
    /// Before an entity is staged for persistence.
    PrePersist,
    /// After an entity was staged for persistence.
    PostPersist,
    /// Before an entity is staged for removal.
    PreRemove,
    /// After an entity was staged for removal.
    PostRemove,
    /// Before a commit starts.
    PreFlush,
    /// After a commit finished.
    PostFlush,
    /// After staged operations were discarded.
    OnClear,
    /// After a driver populated class metadata, before it is cached.
    LoadClassMetadata,
    /// After a document was hydrated into an entity.
    PostLoad,
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Events::PrePersist => "prePersist",
            Events::PostPersist => "postPersist",
            Events::PreRemove => "preRemove",
            Events::PostRemove => "postRemove",
            Events::PreFlush => "preFlush",
            Events::PostFlush => "postFlush",
            Events::OnClear => "onClear",
            Events::LoadClassMetadata => "loadClassMetadata",
            Events::PostLoad => "postLoad",
        };
        f.write_str(name)
    }
}

/// Arguments of entity lifecycle events.
#[derive(Debug)]
pub struct LifecycleEventArgs<'a> {
    /// Metadata of the entity class.
    pub metadata: &'a ClassMetadata,
    /// The entity snapshot. Changes made by `PrePersist` listeners are staged.
    pub entity: &'a mut Value,
}

/// Payload passed to listeners.
#[derive(Debug)]
pub enum EventArgs<'a> {
    /// `PrePersist`, `PostPersist`, `PreRemove`, `PostRemove`, `PostLoad`.
    Lifecycle(LifecycleEventArgs<'a>),
    /// `PreFlush`, `PostFlush`.
    Flush,
    /// `OnClear`; `None` means every class was cleared.
    Clear {
        /// The cleared class, if the clear was partial.
        class_name: Option<&'a str>,
    },
    /// `LoadClassMetadata`.
    LoadClassMetadata {
        /// The freshly populated metadata.
        metadata: &'a mut ClassMetadata,
    },
}

/// A listener attached to one or more hooks.
pub trait EventListener: Send + Sync {
    /// Handles an event.
    fn handle(&self, event: Events, args: &mut EventArgs<'_>) -> OdmResult<()>;
}

struct FnListener<F>(F);

impl<F> EventListener for FnListener<F>
where
    F: Fn(&mut EventArgs<'_>) -> OdmResult<()> + Send + Sync,
{
    fn handle(&self, _event: Events, args: &mut EventArgs<'_>) -> OdmResult<()> {
        (self.0)(args)
    }
}

/// Registry of listeners, one ordered list per hook.
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<HashMap<Events, Vec<Arc<dyn EventListener>>>>,
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<String, usize> = listeners
            .iter()
            .map(|(event, list)| (event.to_string(), list.len()))
            .collect();
        f.debug_struct("EventManager")
            .field("listeners", &counts)
            .finish()
    }
}

impl EventManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener to the given hooks.
    pub fn add_listener(&self, events: &[Events], listener: Arc<dyn EventListener>) {
        let mut listeners = self.listeners.write();
        for event in events {
            listeners
                .entry(*event)
                .or_default()
                .push(Arc::clone(&listener));
        }
    }

    /// Appends a closure listener to one hook.
    pub fn add_listener_fn<F>(&self, event: Events, listener: F)
    where
        F: Fn(&mut EventArgs<'_>) -> OdmResult<()> + Send + Sync + 'static,
    {
        self.add_listener(&[event], Arc::new(FnListener(listener)));
    }

    /// Removes every listener of a hook.
    pub fn remove_listeners(&self, event: Events) {
        self.listeners.write().remove(&event);
    }

    /// Returns true if the hook has listeners.
    pub fn has_listeners(&self, event: Events) -> bool {
        self.listeners
            .read()
            .get(&event)
            .map(|l| !l.is_empty())
            .unwrap_or(false)
    }

    /// Fires an event.
    ///
    /// The listener list is snapshotted first, so listeners may register
    /// further listeners without deadlocking.
    pub fn dispatch(&self, event: Events, args: &mut EventArgs<'_>) -> OdmResult<()> {
        let listeners: Vec<Arc<dyn EventListener>> = match self.listeners.read().get(&event) {
            Some(list) => list.clone(),
            None => return Ok(()),
        };

        for listener in listeners {
            listener.handle(event, args)?;
        }
        Ok(())
    }
}

/// Assigns a random UUID to entities persisted without an identifier.
///
/// Register it for [`Events::PrePersist`]:
///
/// ```
/// use std::sync::Arc;
/// use helios_odm::events::{AssignUuidIdentifiers, EventManager, Events};
///
/// let events = EventManager::new();
/// events.add_listener(&[Events::PrePersist], Arc::new(AssignUuidIdentifiers));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignUuidIdentifiers;

impl EventListener for AssignUuidIdentifiers {
    fn handle(&self, _event: Events, args: &mut EventArgs<'_>) -> OdmResult<()> {
        let EventArgs::Lifecycle(lifecycle) = args else {
            return Ok(());
        };
        let Some(object) = lifecycle.entity.as_object_mut() else {
            return Ok(());
        };

        let identifier = &lifecycle.metadata.identifier;
        let missing = match object.get(identifier) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };
        if missing {
            let id = uuid::Uuid::new_v4().to_string();
            tracing::debug!(
                "Assigned identifier {} to new {} entity",
                id,
                lifecycle.metadata.class_name
            );
            object.insert(identifier.clone(), Value::String(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OdmError, QueryError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metadata() -> ClassMetadata {
        let mut metadata = ClassMetadata::new("User");
        metadata.identifier = "id".to_string();
        metadata
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let events = EventManager::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            events.add_listener_fn(Events::PreFlush, move |_| {
                order.write().push(n);
                Ok(())
            });
        }

        events
            .dispatch(Events::PreFlush, &mut EventArgs::Flush)
            .unwrap();
        assert_eq!(*order.read(), vec![0, 1, 2]);
    }

    #[test]
    fn test_dispatch_only_reaches_registered_hook() {
        let events = EventManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        events.add_listener_fn(Events::PostFlush, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        events
            .dispatch(Events::PreFlush, &mut EventArgs::Flush)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        events
            .dispatch(Events::PostFlush, &mut EventArgs::Flush)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_error_stops_dispatch() {
        let events = EventManager::new();
        let calls = Arc::new(AtomicUsize::new(0));
        events.add_listener_fn(Events::PreFlush, |_| Err(QueryError::NoQueryBound.into()));
        let counter = Arc::clone(&calls);
        events.add_listener_fn(Events::PreFlush, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let result = events.dispatch(Events::PreFlush, &mut EventArgs::Flush);
        assert!(matches!(result, Err(OdmError::Query(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_assign_uuid_identifiers() {
        let metadata = metadata();
        let mut entity = json!({"name": "Hash"});
        let mut args = EventArgs::Lifecycle(LifecycleEventArgs {
            metadata: &metadata,
            entity: &mut entity,
        });
        AssignUuidIdentifiers
            .handle(Events::PrePersist, &mut args)
            .unwrap();

        let id = entity["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn test_assign_uuid_keeps_existing_identifier() {
        let metadata = metadata();
        let mut entity = json!({"id": "u1"});
        let mut args = EventArgs::Lifecycle(LifecycleEventArgs {
            metadata: &metadata,
            entity: &mut entity,
        });
        AssignUuidIdentifiers
            .handle(Events::PrePersist, &mut args)
            .unwrap();
        assert_eq!(entity["id"], "u1");
    }

    #[test]
    fn test_events_display() {
        assert_eq!(Events::LoadClassMetadata.to_string(), "loadClassMetadata");
        assert_eq!(Events::OnClear.to_string(), "onClear");
    }
}
