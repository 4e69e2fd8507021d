//! Cacher - Cache-aside query layer
//!
//! Sits between application code and a data source. Reads go through a
//! key-value store first and fall back to the source on a miss. Writers
//! invalidate entries by pattern.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `error` - Error types shared by every component
//! - `query` - Query descriptors, methods and option trees
//! - `key` - Deterministic cache key derivation
//! - `store` - Key-value store abstraction (in-process Moka, Redis)
//! - `source` - Data source abstraction (models and raw query runners)
//! - `fetch` - The read-through protocol with miss coalescing
//! - `invalidate` - Pattern invalidation with duplicate-scan suppression
//! - `facade` - The `Cacher` configure-then-query surface
//!
//! ## Usage
//!
//! ```rust,ignore
//! let store = Arc::new(MemoryStore::new(10_000));
//! let cacher = Cacher::new(store).with_model(users).with_ttl(60);
//!
//! let page = cacher.find_all(Some(QueryValue::map([("limit", 10)])), &[]).await?;
//! cacher.invalidate("users");
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod fetch;
pub mod invalidate;
pub mod key;
pub mod query;
pub mod source;
pub mod store;

pub use config::{AppConfig, CacherConfig};
pub use error::{CacherError, Result};
pub use facade::Cacher;
pub use fetch::{Cached, Fetcher};
pub use invalidate::{InvalidationOutcome, Invalidator};
pub use key::{FlattenHook, KeyDeriver};
pub use query::{Field, Marker, Method, Op, QueryDescriptor, QueryType, QueryValue, RawOptions};
pub use source::{Fetched, Model, QueryRunner, Record, TableModel};
pub use store::{CacheStore, MemoryStore};
