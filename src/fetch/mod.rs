//! Fetch module - The cache-aside protocol.
//!
//! Every read goes through the same steps:
//!
//! 1. Derive the key and GET it from the store
//! 2. Hit: decode the payload and return it, flagged as a cache hit
//! 3. Miss: call the data source, normalize the result, SET it with the
//!    configured TTL and return it
//!
//! Store and source failures abort the call. Nothing is cached unless the
//! source call succeeded. A payload that fails to decode is reported and
//! left in the store untouched.
//!
//! Concurrent misses on the same key are coalesced: the first caller loads
//! from the source while the others wait, then find the fresh entry.

mod in_flight;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CacherConfig;
use crate::error::{CacherError, Result};
use crate::key::KeyDeriver;
use crate::query::{QueryDescriptor, RawOptions};
use crate::source::{Fetched, Model, QueryRunner};
use crate::store::CacheStore;

use in_flight::InFlight;

/// Result of a single cached read.
///
/// `cache_hit` belongs to this call only; concurrent callers each get
/// their own flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached {
    /// Key the value was read from or written to.
    pub key: String,
    /// The plain result value.
    pub value: Value,
    /// Whether the value came from the store rather than the source.
    pub cache_hit: bool,
}

impl Cached {
    /// Decode the value into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.value)
    }
}

/// Runs the cache-aside protocol against one store.
///
/// Cloning is cheap; clones share the store and the in-flight table.
#[derive(Clone)]
pub struct Fetcher {
    store: Arc<dyn CacheStore>,
    keys: KeyDeriver,
    ttl: Option<Duration>,
    in_flight: Option<InFlight>,
}

impl Fetcher {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacherConfig) -> Self {
        Self {
            store,
            keys: KeyDeriver::new(config.prefix.as_str()),
            ttl: config.ttl,
            in_flight: config.coalesce_misses.then(InFlight::default),
        }
    }

    /// Replace the key deriver (prefix and flatten hook).
    #[must_use]
    pub fn with_keys(mut self, keys: KeyDeriver) -> Self {
        self.keys = keys;
        self
    }

    /// Replace the TTL applied to new entries.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Read a structured query through the cache.
    ///
    /// Fails with [`CacherError::InvalidMethod`] before any I/O when the
    /// model can't answer the descriptor's method.
    pub async fn fetch(&self, descriptor: &QueryDescriptor, model: &dyn Model) -> Result<Cached> {
        let method = descriptor.method();
        if !model.supports(method) {
            return Err(CacherError::InvalidMethod(format!("{}.{}", model.name(), method)));
        }

        let key = self.keys.derive_key(descriptor);
        self.read_through(key, || model.retrieve(method, descriptor.options()))
            .await
    }

    /// Read a raw SQL query through the cache.
    ///
    /// Without options the query runs as a plain `SELECT`.
    pub async fn fetch_raw(
        &self,
        sql: &str,
        options: Option<&RawOptions>,
        runner: &dyn QueryRunner,
    ) -> Result<Cached> {
        let key_options = options.map(RawOptions::to_value);
        let key = self.keys.derive_raw_key(sql, key_options.as_ref());

        let defaults = RawOptions::default();
        let options = options.unwrap_or(&defaults);
        self.read_through(key, || runner.query(sql, options)).await
    }

    async fn read_through<F, Fut>(&self, key: String, load: F) -> Result<Cached>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Fetched>>,
    {
        if let Some(hit) = self.lookup(&key).await? {
            return Ok(hit);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.populate(key, load).await;
        };

        // Whoever held the slot before us may have filled the entry
        let _slot = in_flight.acquire(&key).await;
        if let Some(hit) = self.lookup(&key).await? {
            debug!("Coalesced miss for {}", key);
            return Ok(hit);
        }
        self.populate(key, load).await
    }

    async fn lookup(&self, key: &str) -> Result<Option<Cached>> {
        let Some(payload) = self.store.get(key).await? else {
            debug!("Cache miss for {}", key);
            return Ok(None);
        };

        let value = serde_json::from_str(&payload).map_err(|source| {
            warn!("Undecodable cache entry at {}: {}", key, source);
            CacherError::Deserialize {
                key: key.to_string(),
                source,
            }
        })?;

        debug!("Cache hit for {}", key);
        Ok(Some(Cached {
            key: key.to_string(),
            value,
            cache_hit: true,
        }))
    }

    async fn populate<F, Fut>(&self, key: String, load: F) -> Result<Cached>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Fetched>>,
    {
        let value = load().await.map_err(CacherError::Source)?.normalize();
        let payload = serde_json::to_string(&value).map_err(CacherError::Serialize)?;

        self.store.set(&key, &payload, self.ttl).await?;
        debug!("Cached {} ({} bytes, ttl {:?})", key, payload.len(), self.ttl);

        Ok(Cached {
            key,
            value,
            cache_hit: false,
        })
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("store", &self.store.provider_name())
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .field("coalesce_misses", &self.in_flight.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::query::{Method, QueryType, QueryValue};
    use crate::source::TableModel;
    use crate::store::{MemoryStore, ScanPage, StoreError, StoreOp, StoreResult};

    fn counting_users(calls: Arc<AtomicUsize>) -> TableModel {
        TableModel::new("users").with_method(Method::FindAll, move |_options| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Fetched::Rows(vec![json!({"id": 1}), json!({"id": 2})]))
            }
        })
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::new(StoreOp::Get, "connection reset"))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> StoreResult<()> {
            Err(StoreError::new(StoreOp::Set, "connection reset"))
        }

        async fn scan(&self, _cursor: u64, _pattern: &str, _count: usize) -> StoreResult<ScanPage> {
            Err(StoreError::new(StoreOp::Scan, "connection reset"))
        }

        async fn delete(&self, _keys: &[String]) -> StoreResult<u64> {
            Err(StoreError::new(StoreOp::Delete, "connection reset"))
        }

        fn provider_name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store.clone(), &CacherConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let users = counting_users(calls.clone());
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", Some(QueryValue::map([("limit", 2)])));

        let first = fetcher.fetch(&descriptor, &users).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(first.value, json!([{"id": 1}, {"id": 2}]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.contains(&first.key));

        let second = fetcher.fetch(&descriptor, &users).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.value, first.value);
        assert_eq!(second.key, first.key);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_method_is_rejected_before_io() {
        let fetcher = Fetcher::new(Arc::new(BrokenStore), &CacherConfig::default());
        let users = TableModel::new("users");
        let descriptor = QueryDescriptor::new(Method::Max, "users", None);

        let err = fetcher.fetch(&descriptor, &users).await.unwrap_err();
        assert!(matches!(err, CacherError::InvalidMethod(_)));
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let fetcher = Fetcher::new(Arc::new(BrokenStore), &CacherConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let users = counting_users(calls.clone());
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", None);

        let err = fetcher.fetch(&descriptor, &users).await.unwrap_err();
        assert!(matches!(err, CacherError::Store(ref e) if e.op == StoreOp::Get));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_error_caches_nothing() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store.clone(), &CacherConfig::default());
        let users = TableModel::new("users")
            .with_method(Method::Count, |_| async { Err(anyhow::anyhow!("relation does not exist")) });
        let descriptor = QueryDescriptor::new(Method::Count, "users", None);

        let err = fetcher.fetch(&descriptor, &users).await.unwrap_err();
        assert!(matches!(err, CacherError::Source(_)));
        assert_eq!(err.to_string(), "relation does not exist");
        assert!(!store.contains(&fetcher.keys().derive_key(&descriptor)));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported_and_kept() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store.clone(), &CacherConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let users = counting_users(calls.clone());
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", None);
        let key = fetcher.keys().derive_key(&descriptor);

        store.set(&key, "{not json", None).await.unwrap();

        let err = fetcher.fetch(&descriptor, &users).await.unwrap_err();
        assert!(matches!(err, CacherError::Deserialize { key: ref k, .. } if *k == key));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("{not json"));
    }

    #[tokio::test]
    async fn test_absent_result_is_cached_as_null() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store.clone(), &CacherConfig::default());
        let users = TableModel::new("users").with_method(Method::FindOne, |_| async { Ok(Fetched::Absent) });
        let descriptor = QueryDescriptor::new(Method::FindOne, "users", None);

        let first = fetcher.fetch(&descriptor, &users).await.unwrap();
        assert_eq!(first.value, Value::Null);

        let second = fetcher.fetch(&descriptor, &users).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.value, Value::Null);
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store, &CacherConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let users = Arc::new(TableModel::new("users").with_method(Method::FindAll, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Fetched::Rows(vec![json!({"id": 1})]))
            }
        }));
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", None);

        let (a, b) = tokio::join!(
            fetcher.fetch(&descriptor, users.as_ref()),
            fetcher.fetch(&descriptor, users.as_ref())
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.value, b.value);
        assert!(a.cache_hit != b.cache_hit);
    }

    #[tokio::test]
    async fn test_without_coalescing_both_load() {
        let store = Arc::new(MemoryStore::new(100));
        let config = CacherConfig::default().coalesce_misses(false);
        let fetcher = Fetcher::new(store, &config);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let users = TableModel::new("users").with_method(Method::FindAll, move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(Fetched::Rows(vec![]))
            }
        });
        let descriptor = QueryDescriptor::new(Method::FindAll, "users", None);

        let (a, b) = tokio::join!(fetcher.fetch(&descriptor, &users), fetcher.fetch(&descriptor, &users));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct EchoRunner;

    #[async_trait]
    impl QueryRunner for EchoRunner {
        async fn query(&self, sql: &str, options: &RawOptions) -> anyhow::Result<Fetched> {
            Ok(Fetched::from(json!({ "sql": sql, "type": options.query_type.as_str() })))
        }
    }

    #[tokio::test]
    async fn test_raw_query_defaults_to_select() {
        let store = Arc::new(MemoryStore::new(100));
        let fetcher = Fetcher::new(store, &CacherConfig::default());

        let first = fetcher.fetch_raw("SELECT 1", None, &EchoRunner).await.unwrap();
        assert!(first.key.starts_with("cacher:__raw__:query:"));
        assert_eq!(first.value, json!({ "sql": "SELECT 1", "type": "SELECT" }));

        let second = fetcher.fetch_raw("SELECT 1", None, &EchoRunner).await.unwrap();
        assert!(second.cache_hit);

        let options = RawOptions::new(QueryType::Raw);
        let raw = fetcher.fetch_raw("SELECT 1", Some(&options), &EchoRunner).await.unwrap();
        assert!(!raw.cache_hit);
        assert_ne!(raw.key, first.key);
        assert_eq!(raw.value["type"], "RAW");
    }

    #[tokio::test]
    async fn test_decode_into_type() {
        #[derive(serde::Deserialize)]
        struct Row {
            id: i64,
        }

        let cached = Cached {
            key: "k".into(),
            value: json!([{"id": 3}]),
            cache_hit: true,
        };
        let rows: Vec<Row> = cached.decode().unwrap();
        assert_eq!(rows[0].id, 3);
    }
}
