//! Cache store module - Abstract key-value capability.
//!
//! The caching layer only needs four operations from its backing store:
//! GET, SET with expiry, cursor SCAN and DELETE. Anything that can provide
//! them implements [`CacheStore`].
//!
//! ## Adapters
//!
//! - `MemoryStore` - in-process store built on Moka, per-entry TTL
//! - `RedisStore` - Redis over a multiplexed connection (feature `redis`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = MemoryStore::new(10_000);
//! store.set("cacher:users:find:abc", "[]", Some(Duration::from_secs(30))).await?;
//!
//! let page = store.scan(0, "cacher:*users*", 100).await?;
//! store.delete(&page.keys).await?;
//! ```

mod memory;
mod pattern;
#[cfg(feature = "redis")]
mod redis;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use pattern::glob_match;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Boxed error coming out of a store backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The store operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Connect,
    Get,
    Set,
    Scan,
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Connect => "CONNECT",
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Scan => "SCAN",
            Self::Delete => "DELETE",
        };
        f.write_str(op)
    }
}

/// I/O failure against the cache store.
#[derive(Debug, Error)]
#[error("cache store {op} failed: {source}")]
pub struct StoreError {
    pub op: StoreOp,
    #[source]
    pub source: BoxError,
}

impl StoreError {
    pub fn new(op: StoreOp, source: impl Into<BoxError>) -> Self {
        Self {
            op,
            source: source.into(),
        }
    }
}

/// One page of a cursor scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call; `0` means the sweep is complete.
    pub cursor: u64,
    /// Keys matched in this page.
    pub keys: Vec<String>,
}

impl ScanPage {
    /// Whether this page ends the sweep.
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// Key-value store backing the cache.
///
/// Implementations must be safe for concurrent use; every call may come
/// from a different task.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get the raw payload stored at `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` at `key`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Scan the keyspace from `cursor` for keys matching a glob `pattern`.
    ///
    /// `count` is a hint for how much work one call should do.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Delete `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Short name of the backend, for logging.
    fn provider_name(&self) -> &'static str;
}
