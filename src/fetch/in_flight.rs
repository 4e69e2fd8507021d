//! Per-key slots serializing concurrent misses.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock for one key and the number of callers holding or waiting on it.
#[derive(Default)]
struct SlotLock {
    mutex: Arc<Mutex<()>>,
    claims: usize,
}

/// Table of keys currently being loaded from the source.
#[derive(Clone, Default)]
pub(super) struct InFlight {
    slots: Arc<DashMap<String, SlotLock>>,
}

impl InFlight {
    /// Wait until no other caller is loading `key`, then claim it.
    ///
    /// The claim is registered before waiting, so a caller dropped while
    /// queued still releases its share of the table entry.
    pub(super) async fn acquire(&self, key: &str) -> Slot {
        let mutex = {
            let mut entry = self.slots.entry(key.to_string()).or_default();
            entry.claims += 1;
            Arc::clone(&entry.mutex)
        };

        let mut slot = Slot {
            slots: Arc::clone(&self.slots),
            key: key.to_string(),
            guard: None,
        };
        slot.guard = Some(mutex.lock_owned().await);
        slot
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Claim on one key. Releasing it wakes the next waiter, and drops the
/// table entry once the last claim is gone.
pub(super) struct Slot {
    slots: Arc<DashMap<String, SlotLock>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.guard.take();
        self.slots.remove_if_mut(&self.key, |_, lock| {
            lock.claims -= 1;
            lock.claims == 0
        });
    }
}
