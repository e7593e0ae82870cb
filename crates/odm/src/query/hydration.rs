//! Secondary hydration.
//!
//! In [`HydrationMode::Normal`](super::HydrationMode::Normal) a query only
//! uses the search engine to find identifiers. The entities themselves are
//! loaded by a [`HydrationQuery`] against another datastore, with the hit
//! identifiers bound to a named parameter in result order.

use std::collections::HashMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::OdmResult;

/// Result cache settings passed to a hydration query.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultCacheSettings {
    /// Whether results may be served from cache.
    pub enabled: bool,
    /// Lifetime of cached results.
    pub ttl: Duration,
    /// Explicit cache key; derived from the parameter and ids when absent.
    pub key: Option<String>,
}

impl Default for ResultCacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(300),
            key: None,
        }
    }
}

impl ResultCacheSettings {
    /// Returns the key results are cached under.
    pub fn cache_key(&self, parameter: &str, ids: &[String]) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{}:{}", parameter, ids.join(",")),
        }
    }
}

/// Query against a secondary datastore that loads entities by identifier.
#[async_trait]
pub trait HydrationQuery: Send + Sync + Debug {
    /// Loads the entities whose identifiers are bound to `parameter`.
    ///
    /// `ids` is in search result order and may be empty; implementations
    /// return an empty list rather than failing in that case.
    async fn execute(
        &self,
        parameter: &str,
        ids: &[String],
        cache: &ResultCacheSettings,
    ) -> OdmResult<Vec<Value>>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    stored_at: Instant,
    ttl: Duration,
    values: Vec<Value>,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() < self.ttl
    }
}

/// Wraps a hydration query with an in-process result cache.
///
/// The cache is consulted only when the settings passed to
/// [`execute`](HydrationQuery::execute) enable it.
#[derive(Debug)]
pub struct CachingHydrationQuery<Q> {
    inner: Q,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl<Q: HydrationQuery> CachingHydrationQuery<Q> {
    /// Wraps a hydration query.
    pub fn new(inner: Q) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the wrapped query.
    pub fn inner(&self) -> &Q {
        &self.inner
    }

    /// Drops one cached result.
    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Drops every cached result.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Returns the number of fresh cached results.
    pub fn len(&self) -> usize {
        self.entries.read().values().filter(|e| e.is_fresh()).count()
    }

    /// Returns true if no fresh result is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<Q: HydrationQuery> HydrationQuery for CachingHydrationQuery<Q> {
    async fn execute(
        &self,
        parameter: &str,
        ids: &[String],
        cache: &ResultCacheSettings,
    ) -> OdmResult<Vec<Value>> {
        if !cache.enabled {
            return self.inner.execute(parameter, ids, cache).await;
        }

        let key = cache.cache_key(parameter, ids);
        if let Some(entry) = self.entries.read().get(&key).filter(|e| e.is_fresh()) {
            tracing::debug!("Hydration cache hit for '{}'", key);
            return Ok(entry.values.clone());
        }

        let values = self.inner.execute(parameter, ids, cache).await?;
        let mut entries = self.entries.write();
        entries.retain(|_, entry| entry.is_fresh());
        entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                ttl: cache.ttl,
                values: values.clone(),
            },
        );
        drop(entries);
        Ok(values)
    }
}
