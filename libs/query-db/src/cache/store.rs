use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use super::key::CacheKey;

type Slot<V> = Arc<OnceCell<V>>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent read-through cache with single-flight population.
///
/// Concurrent callers of the same key block on one computation instead of
/// racing. A failed computation leaves the slot empty, so errors are never
/// cached and the next caller retries.
pub struct QueryCache<V> {
    entries: DashMap<String, Slot<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> Default for QueryCache<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<V: Clone + Send + Sync> QueryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_insert_with<E, F>(&self, key: &CacheKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // Clone the slot out so the shard lock is not held while computing.
        let slot = self
            .entries
            .entry(key.as_str().to_owned())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let mut computed = false;
        let value = match slot.get_or_try_init(|| {
            computed = true;
            compute()
        }) {
            Ok(value) => value,
            Err(err) => {
                // A slot that never got a value must not look like an entry.
                self.entries
                    .remove_if(key.as_str(), |_, s| Arc::ptr_eq(s, &slot) && s.get().is_none());
                return Err(err);
            }
        };

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%key, "cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(%key, "cache hit");
        }
        Ok(value.clone())
    }

    /// Cached value without computing one.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entries
            .get(key.as_str())
            .and_then(|slot| slot.get().cloned())
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key.as_str()).is_some();
        if removed {
            tracing::debug!(%key, "cache entry invalidated");
        }
        removed
    }

    /// Drop every entry whose key starts with `prefix` (e.g. an operation tag).
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !k.starts_with(prefix));
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
        tracing::debug!("cache cleared");
    }

    /// Populated entries only; slots still being computed are not counted.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
