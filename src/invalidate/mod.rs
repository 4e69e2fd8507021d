//! Invalidate module - Pattern invalidation with duplicate-scan suppression.
//!
//! Invalidating a pattern sweeps the store with a cursor SCAN over
//! `prefix:*pattern*`, collects every matching key and deletes them in
//! scan order.
//!
//! Only one sweep per pattern runs at a time. A request for a pattern that
//! is already being swept is dropped. The pending entry is removed when the
//! sweep ends, whichever way it ends.
//!
//! Failures are logged and never surfaced: invalidation is fire-and-forget.
//! Callers wanting to know when a sweep finished can await the returned
//! handle, or use [`Invalidator::run`].

mod pending;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacherConfig;
use crate::key::KeyDeriver;
use crate::store::CacheStore;

use pending::Pending;

/// How a single invalidation request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// A sweep for the same pattern was already running; nothing was done.
    Duplicate,
    /// The sweep completed.
    Completed {
        /// Keys the scan matched.
        matched: usize,
        /// Keys the store reported as deleted.
        deleted: u64,
    },
    /// The sweep failed part way and was abandoned.
    Aborted,
}

/// Sweeps and deletes keys by pattern.
///
/// Cloning is cheap; clones share the pending table, so duplicate
/// suppression holds across all of them.
#[derive(Clone)]
pub struct Invalidator {
    store: Arc<dyn CacheStore>,
    keys: KeyDeriver,
    scan_count: usize,
    delete_batch: usize,
    pending: Arc<DashMap<String, Vec<String>>>,
}

impl Invalidator {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacherConfig) -> Self {
        Self {
            store,
            keys: KeyDeriver::new(config.prefix.as_str()),
            scan_count: config.scan_count.max(1),
            delete_batch: config.delete_batch.max(1),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Replace the key deriver, and with it the prefix swept.
    #[must_use]
    pub fn with_keys(mut self, keys: KeyDeriver) -> Self {
        self.keys = keys;
        self
    }

    /// Start sweeping `pattern` in the background.
    ///
    /// Returns `None` without doing anything when a sweep for this pattern
    /// is already pending. Must be called within a Tokio runtime.
    pub fn invalidate(&self, pattern: &str) -> Option<JoinHandle<InvalidationOutcome>> {
        let pending = self.claim(pattern)?;
        let this = self.clone();
        Some(tokio::spawn(async move { this.sweep(pending).await }))
    }

    /// Sweep `pattern` and wait for the outcome.
    pub async fn run(&self, pattern: &str) -> InvalidationOutcome {
        match self.claim(pattern) {
            Some(pending) => self.sweep(pending).await,
            None => InvalidationOutcome::Duplicate,
        }
    }

    /// Whether a sweep for `pattern` is in flight.
    pub fn is_pending(&self, pattern: &str) -> bool {
        self.pending.contains_key(&Pending::hash(pattern))
    }

    /// Number of sweeps in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn claim(&self, pattern: &str) -> Option<Pending> {
        let glob = self.keys.invalidation_pattern(pattern);
        let claimed = Pending::claim(&self.pending, pattern, glob);
        if claimed.is_none() {
            debug!("Invalidation of '{}' already pending, skipping", pattern);
        }
        claimed
    }

    async fn sweep(&self, pending: Pending) -> InvalidationOutcome {
        let mut cursor = 0;
        loop {
            let page = match self.store.scan(cursor, pending.glob(), self.scan_count).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Invalidation scan of {} failed: {}", pending.glob(), e);
                    return InvalidationOutcome::Aborted;
                }
            };

            pending.append(page.keys);
            if page.cursor == 0 {
                break;
            }
            cursor = page.cursor;
        }

        let keys = pending.take_keys();
        if keys.is_empty() {
            debug!("No keys matched {}", pending.glob());
            return InvalidationOutcome::Completed {
                matched: 0,
                deleted: 0,
            };
        }

        let mut deleted = 0;
        for batch in keys.chunks(self.delete_batch) {
            match self.store.delete(batch).await {
                Ok(n) => deleted += n,
                Err(e) => {
                    warn!("Invalidation delete for {} failed: {}", pending.glob(), e);
                    return InvalidationOutcome::Aborted;
                }
            }
        }

        info!("Invalidated {} of {} keys matching {}", deleted, keys.len(), pending.glob());
        InvalidationOutcome::Completed {
            matched: keys.len(),
            deleted,
        }
    }
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("store", &self.store.provider_name())
            .field("prefix", &self.keys.prefix())
            .field("scan_count", &self.scan_count)
            .field("pending", &self.pending.len())
            .finish()
    }
}
