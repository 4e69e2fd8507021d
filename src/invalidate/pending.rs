//! In-flight sweep bookkeeping.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::key::digest;

/// Claim on one pattern's sweep.
///
/// Holds the keys gathered so far in the shared table. Dropping the claim
/// removes the table entry, on success and failure alike.
pub(super) struct Pending {
    table: Arc<DashMap<String, Vec<String>>>,
    hash: String,
    glob: String,
}

impl Pending {
    /// Table key for `pattern`.
    pub(super) fn hash(pattern: &str) -> String {
        digest("", pattern)
    }

    /// Claim `pattern`, or `None` if it is already being swept.
    pub(super) fn claim(table: &Arc<DashMap<String, Vec<String>>>, pattern: &str, glob: String) -> Option<Self> {
        let hash = Self::hash(pattern);
        match table.entry(hash.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Vec::new());
                Some(Self {
                    table: Arc::clone(table),
                    hash,
                    glob,
                })
            }
        }
    }

    pub(super) fn glob(&self) -> &str {
        &self.glob
    }

    /// Record keys returned by one scan page.
    pub(super) fn append(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        if let Some(mut gathered) = self.table.get_mut(&self.hash) {
            gathered.extend(keys);
        }
    }

    /// Take every key gathered so far, in scan order.
    pub(super) fn take_keys(&self) -> Vec<String> {
        self.table
            .get_mut(&self.hash)
            .map(|mut gathered| std::mem::take(&mut *gathered))
            .unwrap_or_default()
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.table.remove(&self.hash);
    }
}
