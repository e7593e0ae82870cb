//! Mapper configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::query::HydrationMode;

/// Configuration for a [`SearchManager`](crate::SearchManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OdmConfig {
    /// Refresh every touched index after each flush (default: false).
    ///
    /// Makes written documents searchable immediately at the cost of write
    /// throughput.
    #[serde(default)]
    pub force_refresh_on_flush: bool,

    /// Cache class metadata for the lifetime of the manager (default: true).
    #[serde(default = "default_true")]
    pub metadata_cache_enabled: bool,

    /// Pattern every declared index name must match.
    #[serde(default = "default_index_name_pattern")]
    pub index_name_pattern: String,

    /// Hydration mode used by new queries (default: internal).
    #[serde(default)]
    pub default_hydration_mode: HydrationMode,

    /// Lifetime of cached secondary hydration results (default: 5m).
    #[serde(with = "humantime_serde", default = "default_result_cache_ttl")]
    pub result_cache_ttl: Duration,
}

fn default_true() -> bool {
    true
}

fn default_index_name_pattern() -> String {
    r"^[a-z0-9][a-z0-9_.\-+]*$".to_string()
}

fn default_result_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            force_refresh_on_flush: false,
            metadata_cache_enabled: default_true(),
            index_name_pattern: default_index_name_pattern(),
            default_hydration_mode: HydrationMode::default(),
            result_cache_ttl: default_result_cache_ttl(),
        }
    }
}

impl OdmConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables refresh after flush.
    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh_on_flush = force;
        self
    }

    /// Enables or disables the metadata cache.
    pub fn with_metadata_cache(mut self, enabled: bool) -> Self {
        self.metadata_cache_enabled = enabled;
        self
    }

    /// Sets the default hydration mode of new queries.
    pub fn with_hydration_mode(mut self, mode: HydrationMode) -> Self {
        self.default_hydration_mode = mode;
        self
    }

    /// Sets the lifetime of cached hydration results.
    pub fn with_result_cache_ttl(mut self, ttl: Duration) -> Self {
        self.result_cache_ttl = ttl;
        self
    }
}

/// Serde module for Duration with humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
