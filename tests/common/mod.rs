//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use cacher::store::{CacheStore, ScanPage, StoreResult};
use cacher::{Fetched, MemoryStore, Method, TableModel};

/// Memory store counting every call that reaches it.
pub struct CountingStore {
    inner: MemoryStore,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub scans: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(10_000),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.scans.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains(key)
    }
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl).await
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.inner.scan(cursor, pattern, count).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(keys).await
    }

    fn provider_name(&self) -> &'static str {
        "counting"
    }
}

/// Collection answering `findAll` and `count`, counting source calls.
pub fn collection(name: &str, calls: Arc<AtomicUsize>) -> TableModel {
    let rows = calls.clone();
    TableModel::new(name)
        .with_method(Method::FindAll, move |_options| {
            let rows = rows.clone();
            async move {
                rows.fetch_add(1, Ordering::SeqCst);
                Ok(Fetched::Rows(vec![json!({"id": 1}), json!({"id": 2})]))
            }
        })
        .with_method(Method::Count, move |_options| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Fetched::from(json!(2)))
            }
        })
}
