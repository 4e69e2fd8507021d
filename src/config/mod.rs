//! Configuration module for the caching layer.
//!
//! Defaults can be overridden in code through the builder setters, or
//! loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default cache key prefix.
pub const DEFAULT_PREFIX: &str = "cacher";

/// Default entry time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default number of keys requested per SCAN call.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Configuration shared by the fetcher, the invalidator and the facade.
#[derive(Debug, Clone)]
pub struct CacherConfig {
    /// Prefix of every key this instance writes.
    pub prefix: String,

    /// Expiry of cached entries. `None` means entries never expire.
    pub ttl: Option<Duration>,

    /// COUNT hint passed to each SCAN call during invalidation.
    pub scan_count: usize,

    /// Maximum keys sent in a single DELETE.
    pub delete_batch: usize,

    /// Serialize concurrent misses for the same key so only one of them
    /// reaches the data source.
    pub coalesce_misses: bool,

    /// Capacity of the in-process store, when one is used.
    pub memory_capacity: u64,
}

impl Default for CacherConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            ttl: Some(DEFAULT_TTL),
            scan_count: DEFAULT_SCAN_COUNT,
            delete_batch: 500,
            coalesce_misses: true,
            memory_capacity: 100_000,
        }
    }
}

impl CacherConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CACHER_PREFIX` | `cacher` |
    /// | `CACHER_TTL_SECS` | `30` (`0` disables expiry) |
    /// | `CACHER_SCAN_COUNT` | `100` |
    /// | `CACHER_DELETE_BATCH` | `500` |
    /// | `CACHER_COALESCE` | `true` |
    /// | `CACHER_CAPACITY` | `100000` |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let prefix = env::var("CACHER_PREFIX")
            .ok()
            .map(|s| s.trim().trim_end_matches(':').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.prefix);

        let ttl = match parse_var::<u64>("CACHER_TTL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.ttl,
        };

        Self {
            prefix,
            ttl,
            scan_count: parse_var("CACHER_SCAN_COUNT")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.scan_count),
            delete_batch: parse_var("CACHER_DELETE_BATCH")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.delete_batch),
            coalesce_misses: parse_var("CACHER_COALESCE").unwrap_or(defaults.coalesce_misses),
            memory_capacity: parse_var("CACHER_CAPACITY").unwrap_or(defaults.memory_capacity),
        }
    }

    /// Set the key prefix (builder pattern).
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the entry TTL in seconds.
    #[must_use]
    pub fn ttl_secs(mut self, secs: u64) -> Self {
        self.ttl = Some(Duration::from_secs(secs));
        self
    }

    /// Set the entry TTL.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable expiry (entries live until evicted or invalidated).
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    /// Set the SCAN count hint.
    #[must_use]
    pub fn scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Set the maximum keys per DELETE.
    #[must_use]
    pub fn delete_batch(mut self, batch: usize) -> Self {
        self.delete_batch = batch.max(1);
        self
    }

    /// Enable or disable miss coalescing.
    #[must_use]
    pub fn coalesce_misses(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Set the in-process store capacity.
    #[must_use]
    pub fn memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = capacity;
        self
    }
}

/// Settings for the demo binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cacher: CacherConfig,

    /// Redis connection string. Uses the in-process store when unset.
    pub redis_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            cacher: CacherConfig::from_env(),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
