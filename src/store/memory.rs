//! In-process cache store backed by Moka.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use tracing::debug;

use super::{CacheStore, ScanPage, StoreResult, glob_match};

/// Stored payload together with the TTL it was written with.
#[derive(Debug, Clone)]
struct Stored {
    payload: Arc<str>,
    ttl: Option<Duration>,
}

/// Expire each entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, Stored> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Stored, _created_at: Instant) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Stored,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Idle time after which an abandoned sweep's snapshot is dropped.
const SWEEP_IDLE: Duration = Duration::from_secs(300);

/// Sweeps whose snapshots are kept at once.
const MAX_SWEEPS: u64 = 1_024;

/// Low cursor bits holding the offset into a sweep's snapshot.
const OFFSET_BITS: u32 = 32;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;

/// A [`CacheStore`] living in process memory.
///
/// The first page of a scan takes a sorted snapshot of the keyspace and
/// registers it under a sweep id. Later pages walk that snapshot; the
/// cursor packs the sweep id with the offset of the next key. Keys present
/// for the whole sweep are always returned, whatever is removed between
/// pages. Keys written mid-sweep may be missed, the same guarantee Redis
/// gives.
///
/// Cloning is cheap and shares the same underlying cache.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Cache<String, Stored>,
    sweeps: Cache<u64, Arc<[String]>>,
    next_sweep: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create a store holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        let sweeps = Cache::builder()
            .max_capacity(MAX_SWEEPS)
            .time_to_idle(SWEEP_IDLE)
            .build();

        debug!("Memory store created (capacity {})", max_capacity);
        Self {
            inner,
            sweeps,
            next_sweep: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Approximate number of live entries.
    ///
    /// Note: This may lag behind recent writes until Moka runs its
    /// pending maintenance tasks.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Whether `key` is currently stored and not expired.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Start a sweep over the current keyspace, returning its id and snapshot.
    fn begin_sweep(&self) -> (u64, Arc<[String]>) {
        let mut keys: Vec<String> = self.inner.iter().map(|(k, _)| k.as_ref().clone()).collect();
        keys.sort_unstable();

        // Ids wrap within the high cursor bits and are never zero
        let id = loop {
            let id = self.next_sweep.fetch_add(1, Ordering::Relaxed) & (u64::MAX >> OFFSET_BITS);
            if id != 0 {
                break id;
            }
        };
        let snapshot: Arc<[String]> = keys.into();
        self.sweeps.insert(id, Arc::clone(&snapshot));
        (id, snapshot)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.inner.get(key).map(|stored| stored.payload.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.insert(
            key.to_string(),
            Stored {
                payload: Arc::from(value),
                ttl,
            },
        );
        Ok(())
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let (id, start, snapshot) = if cursor == 0 {
            let (id, snapshot) = self.begin_sweep();
            (id, 0, snapshot)
        } else {
            let id = cursor >> OFFSET_BITS;
            let Some(snapshot) = self.sweeps.get(&id) else {
                debug!("Unknown or expired scan cursor {}, ending sweep", cursor);
                return Ok(ScanPage::default());
            };
            (id, (cursor & OFFSET_MASK) as usize, snapshot)
        };

        let start = start.min(snapshot.len());
        let end = start.saturating_add(count.max(1)).min(snapshot.len());

        let matched = snapshot[start..end]
            .iter()
            .filter(|key| glob_match(pattern, key) && self.inner.contains_key(key.as_str()))
            .cloned()
            .collect();

        let next = if end >= snapshot.len() {
            self.sweeps.invalidate(&id);
            0
        } else {
            (id << OFFSET_BITS) | end as u64
        };
        Ok(ScanPage {
            cursor: next,
            keys: matched,
        })
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut removed = 0;
        for key in keys {
            if self.inner.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}
