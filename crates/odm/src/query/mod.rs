//! Query builder and executor.
//!
//! A [`Query`] is bound to one [`SearchManager`]. It targets one or more
//! entity classes, carries a backend-native query object and decides how the
//! hits are turned into results:
//!
//! | mode                        | result                                    |
//! |-----------------------------|-------------------------------------------|
//! | [`HydrationMode::Bypass`]   | the raw result envelope                   |
//! | [`HydrationMode::Internal`] | entities hydrated by the unit of work      |
//! | [`HydrationMode::Normal`]   | entities loaded by a secondary datastore   |
//!
//! ```
//! # async fn demo(manager: &helios_odm::SearchManager) -> helios_odm::OdmResult<()> {
//! use helios_odm::query::{HydrationMode, JsonQuery};
//! use serde_json::json;
//!
//! let mut query = manager.create_query();
//! query
//!     .from(&["User", "Comment"])
//!     .search_with(JsonQuery::new().query(json!({"match_all": {}})));
//! let result = query.get_result(Some(HydrationMode::Bypass)).await?;
//! assert_eq!(query.count()?, result.raw().map(|r| r.total_hits).unwrap_or(0));
//! # Ok(())
//! # }
//! ```

pub mod hydration;
pub mod native;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backend::SearchResults;
use crate::entity::{Entity, from_snapshot};
use crate::error::{OdmResult, QueryError};
use crate::manager::SearchManager;
use crate::mapping::ClassMetadata;

pub use hydration::{CachingHydrationQuery, HydrationQuery, ResultCacheSettings};
pub use native::{JsonQuery, NativeQuery, RawBody};

/// How query hits are turned into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HydrationMode {
    /// Load entities through a secondary datastore query.
    Normal,
    /// Return the raw result envelope.
    Bypass,
    /// Hydrate entities through the unit of work.
    #[default]
    Internal,
}

/// A builder call.
///
/// Calls the mapper understands have their own variant; anything else is
/// sent to the bound native query as [`QueryCall::Raw`].
pub enum QueryCall {
    /// Sets the target entity classes.
    From(Vec<String>),
    /// Binds the native query object.
    SearchWith(Box<dyn NativeQuery>),
    /// Configures the secondary hydration query and its id parameter.
    HydrateWith {
        /// The secondary query.
        query: Arc<dyn HydrationQuery>,
        /// Name of the parameter the ids are bound to.
        parameter: String,
    },
    /// Configures the hydration result cache.
    UseResultCache {
        /// Enables or disables the cache.
        enabled: bool,
        /// Lifetime of cached results; the configured default when absent.
        ttl: Option<Duration>,
        /// Explicit cache key.
        key: Option<String>,
    },
    /// Sets the default hydration mode of this query.
    HydrationMode(HydrationMode),
    /// A call forwarded to the native query.
    Raw {
        /// Call name.
        name: String,
        /// Call arguments.
        args: Vec<Value>,
    },
}

impl fmt::Debug for QueryCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryCall::From(classes) => f.debug_tuple("From").field(classes).finish(),
            QueryCall::SearchWith(query) => f.debug_tuple("SearchWith").field(query).finish(),
            QueryCall::HydrateWith { query, parameter } => f
                .debug_struct("HydrateWith")
                .field("query", query)
                .field("parameter", parameter)
                .finish(),
            QueryCall::UseResultCache { enabled, ttl, key } => f
                .debug_struct("UseResultCache")
                .field("enabled", enabled)
                .field("ttl", ttl)
                .field("key", key)
                .finish(),
            QueryCall::HydrationMode(mode) => f.debug_tuple("HydrationMode").field(mode).finish(),
            QueryCall::Raw { name, args } => f
                .debug_struct("Raw")
                .field("name", name)
                .field("args", args)
                .finish(),
        }
    }
}

/// Result of [`Query::get_result`].
#[derive(Debug, Clone)]
pub enum QueryResult {
    /// Raw envelope, returned in bypass mode.
    Raw(SearchResults),
    /// Entity snapshots hydrated by the unit of work, in hit order.
    Entities(Vec<Value>),
    /// Whatever the secondary hydration query returned.
    Hydrated(Vec<Value>),
}

impl QueryResult {
    /// Returns the raw envelope of a bypass result.
    pub fn raw(&self) -> Option<&SearchResults> {
        match self {
            QueryResult::Raw(results) => Some(results),
            _ => None,
        }
    }

    /// Returns the entity snapshots of a hydrated result.
    pub fn values(&self) -> Option<&[Value]> {
        match self {
            QueryResult::Entities(values) | QueryResult::Hydrated(values) => Some(values),
            QueryResult::Raw(_) => None,
        }
    }

    /// Returns the number of results.
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Raw(results) => results.hits.len(),
            QueryResult::Entities(values) | QueryResult::Hydrated(values) => values.len(),
        }
    }

    /// Returns true if there are no results.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts hydrated results into typed entities.
    ///
    /// # Errors
    ///
    /// * `QueryError::UnexpectedResultType` - for a raw result
    pub fn into_entities<T: Entity>(self) -> OdmResult<Vec<T>> {
        match self {
            QueryResult::Entities(values) | QueryResult::Hydrated(values) => {
                values.into_iter().map(from_snapshot).collect()
            }
            QueryResult::Raw(_) => Err(QueryError::UnexpectedResultType {
                message: "a raw result envelope cannot be converted into entities".to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone)]
struct Hydration {
    query: Arc<dyn HydrationQuery>,
    parameter: String,
}

/// Stateful query bound to a [`SearchManager`].
pub struct Query<'m> {
    manager: &'m SearchManager,
    classes: Vec<String>,
    native: Option<Box<dyn NativeQuery>>,
    hydration_mode: HydrationMode,
    hydration: Option<Hydration>,
    result_cache: ResultCacheSettings,
    total_hits: Option<u64>,
    facets: Option<Map<String, Value>>,
}

impl fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("classes", &self.classes)
            .field("native", &self.native)
            .field("hydration_mode", &self.hydration_mode)
            .field("hydration", &self.hydration)
            .field("result_cache", &self.result_cache)
            .field("total_hits", &self.total_hits)
            .finish_non_exhaustive()
    }
}

impl<'m> Query<'m> {
    pub(crate) fn new(manager: &'m SearchManager) -> Self {
        let config = manager.config();
        Self {
            manager,
            classes: Vec::new(),
            native: None,
            hydration_mode: config.default_hydration_mode,
            hydration: None,
            result_cache: ResultCacheSettings {
                ttl: config.result_cache_ttl,
                ..Default::default()
            },
            total_hits: None,
            facets: None,
        }
    }

    /// Applies a builder call.
    ///
    /// # Errors
    ///
    /// * `QueryError::NoQueryBound` - for a raw call before `search_with`
    /// * Errors of the native query for raw calls
    pub fn call(&mut self, call: QueryCall) -> OdmResult<&mut Self> {
        match call {
            QueryCall::From(classes) => self.classes = classes,
            QueryCall::SearchWith(native) => self.native = Some(native),
            QueryCall::HydrateWith { query, parameter } => {
                self.hydration = Some(Hydration { query, parameter })
            }
            QueryCall::UseResultCache { enabled, ttl, key } => {
                self.result_cache.enabled = enabled;
                if let Some(ttl) = ttl {
                    self.result_cache.ttl = ttl;
                }
                self.result_cache.key = key;
            }
            QueryCall::HydrationMode(mode) => self.hydration_mode = mode,
            QueryCall::Raw { name, args } => {
                let native = self.native.as_mut().ok_or(QueryError::NoQueryBound)?;
                native.call(&name, &args)?;
            }
        }
        Ok(self)
    }

    /// Targets entity classes by name.
    pub fn from(&mut self, classes: &[&str]) -> &mut Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Adds a typed entity class to the targets.
    pub fn add_from<T: Entity>(&mut self) -> &mut Self {
        if !self.classes.iter().any(|c| c == T::CLASS_NAME) {
            self.classes.push(T::CLASS_NAME.to_string());
        }
        self
    }

    /// Binds the native query object.
    pub fn search_with(&mut self, native: impl NativeQuery + 'static) -> &mut Self {
        self.native = Some(Box::new(native));
        self
    }

    /// Configures normal-mode hydration.
    pub fn hydrate_with(
        &mut self,
        query: Arc<dyn HydrationQuery>,
        parameter: impl Into<String>,
    ) -> &mut Self {
        self.hydration = Some(Hydration {
            query,
            parameter: parameter.into(),
        });
        self
    }

    /// Configures the hydration result cache.
    pub fn use_result_cache(
        &mut self,
        enabled: bool,
        ttl: Option<Duration>,
        key: Option<String>,
    ) -> &mut Self {
        self.result_cache.enabled = enabled;
        if let Some(ttl) = ttl {
            self.result_cache.ttl = ttl;
        }
        self.result_cache.key = key;
        self
    }

    /// Sets the default hydration mode of this query.
    pub fn set_hydration_mode(&mut self, mode: HydrationMode) -> &mut Self {
        self.hydration_mode = mode;
        self
    }

    /// Returns the default hydration mode of this query.
    pub fn hydration_mode(&self) -> HydrationMode {
        self.hydration_mode
    }

    /// Forwards a call to the native query.
    pub fn raw(&mut self, name: &str, args: Vec<Value>) -> OdmResult<&mut Self> {
        self.call(QueryCall::Raw {
            name: name.to_string(),
            args,
        })
    }

    /// Returns the targeted entity classes.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Executes the query.
    ///
    /// `mode` overrides the query's hydration mode for this execution.
    ///
    /// # Errors
    ///
    /// * `QueryError::NoQueryBound` - if no native query was bound
    /// * `QueryError::InvalidArgument` - if no entity class is targeted
    /// * `QueryError::NoHydrationQuery` - in normal mode without a hydration query
    /// * `QueryError::UnexpectedResultType` - if a hit belongs to no targeted class
    pub async fn get_result(&mut self, mode: Option<HydrationMode>) -> OdmResult<QueryResult> {
        let native = self.native.as_ref().ok_or(QueryError::NoQueryBound)?;
        if self.classes.is_empty() {
            return Err(QueryError::InvalidArgument {
                call: "from".to_string(),
                message: "no entity class targeted".to_string(),
            }
            .into());
        }

        let factory = self.manager.metadata_factory();
        let metadata = self
            .classes
            .iter()
            .map(|class| factory.get_metadata_for(class))
            .collect::<OdmResult<Vec<Arc<ClassMetadata>>>>()?;
        let body = native.to_body()?;
        let mode = mode.unwrap_or(self.hydration_mode);

        tracing::debug!(
            "Executing query over {:?} with {:?} hydration",
            self.classes,
            mode
        );
        let unit_of_work = self.manager.unit_of_work();
        let results = unit_of_work.client().search(&body, &metadata).await?;
        self.total_hits = Some(results.total_hits);
        self.facets = Some(results.facets.clone());

        match mode {
            HydrationMode::Bypass => Ok(QueryResult::Raw(results)),
            HydrationMode::Internal => Ok(QueryResult::Entities(
                unit_of_work.hydrate_results(&metadata, &results)?,
            )),
            HydrationMode::Normal => {
                let hydration = self
                    .hydration
                    .as_ref()
                    .ok_or(QueryError::NoHydrationQuery)?;
                let ids = results.ids();
                let values = hydration
                    .query
                    .execute(&hydration.parameter, &ids, &self.result_cache)
                    .await?;
                Ok(QueryResult::Hydrated(values))
            }
        }
    }

    /// Executes the query and returns typed entities of one class.
    pub async fn get_entities<T: Entity>(&mut self) -> OdmResult<Vec<T>> {
        self.get_result(Some(HydrationMode::Internal))
            .await?
            .into_entities()
    }

    /// Returns the total hit count of the last execution.
    ///
    /// # Errors
    ///
    /// * `QueryError::NotExecuted` - before the first execution
    pub fn count(&self) -> OdmResult<u64> {
        self.total_hits.ok_or_else(|| QueryError::NotExecuted.into())
    }

    /// Returns the facets of the last execution.
    ///
    /// # Errors
    ///
    /// * `QueryError::NotExecuted` - before the first execution
    pub fn facets(&self) -> OdmResult<&Map<String, Value>> {
        self.facets
            .as_ref()
            .ok_or_else(|| QueryError::NotExecuted.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hydration_mode_default_and_serde() {
        assert_eq!(HydrationMode::default(), HydrationMode::Internal);
        assert_eq!(
            serde_json::to_string(&HydrationMode::Bypass).unwrap(),
            "\"bypass\""
        );
        let mode: HydrationMode = serde_json::from_str("\"normal\"").unwrap();
        assert_eq!(mode, HydrationMode::Normal);
    }

    #[test]
    fn test_query_result_accessors() {
        let raw = QueryResult::Raw(SearchResults::default());
        assert!(raw.raw().is_some());
        assert!(raw.values().is_none());
        assert!(raw.is_empty());

        let entities = QueryResult::Entities(vec![serde_json::json!({"id": "u1"})]);
        assert_eq!(entities.len(), 1);
        assert!(entities.raw().is_none());
    }

    #[test]
    fn test_raw_result_is_not_entities() {
        #[derive(Debug, Serialize, Deserialize)]
        struct User {
            id: String,
        }
        impl Entity for User {
            const CLASS_NAME: &'static str = "User";
        }

        let err = QueryResult::Raw(SearchResults::default())
            .into_entities::<User>()
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OdmError::Query(QueryError::UnexpectedResultType { .. })
        ));
    }
}
