//! Process-local caches that must be invalidated between tests.

use crate::errors::{HarnessError, Result};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A process-local cache whose values may be derived from row data
pub trait InMemoryCache: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Drop every cached value. Must return only once the cache is empty.
    fn clear(&self) -> Result<()>;
}

/// Ordered set of caches cleared together after each test
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Vec<Arc<dyn InMemoryCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache; it is cleared on every [`CacheRegistry::clear_all`]
    pub fn register(&mut self, cache: Arc<dyn InMemoryCache>) {
        self.caches.push(cache);
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Clear every registered cache in registration order.
    ///
    /// All caches are attempted; the first failure is returned as a
    /// cache failure.
    pub fn clear_all(&self) -> Result<()> {
        let mut first_error = None;
        for cache in &self.caches {
            if let Err(e) = cache.clear() {
                tracing::error!(cache = %cache.name(), error = %e, "Failed to clear cache");
                if first_error.is_none() {
                    first_error = Some(if matches!(e, HarnessError::CacheFailure { .. }) {
                        e
                    } else {
                        HarnessError::cache(cache.name(), e.to_string())
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::trace!(caches = self.caches.len(), "In-memory caches cleared");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.caches.iter().map(|c| c.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

/// Keyed memo cache, e.g. for configuration values computed from row data
pub struct MemoCache<K, V> {
    name: String,
    entries: DashMap<K, V>,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), entries: DashMap::new() }
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_insert_with<F: FnOnce() -> V>(&self, key: K, compute: F) -> V {
        self.entries.entry(key).or_insert_with(compute).value().clone()
    }

    /// Return the cached value for `key`, computing it with a fallible
    /// function on a miss. Errors are not cached.
    pub fn get_or_try_insert_with<F: FnOnce() -> Result<V>>(&self, key: K, compute: F) -> Result<V> {
        if let Some(value) = self.entries.get(&key) {
            return Ok(value.value().clone());
        }
        let value = compute()?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> InMemoryCache for MemoCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubbornCache;

    impl InMemoryCache for StubbornCache {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn clear(&self) -> Result<()> {
            Err(HarnessError::validation("refuses to clear"))
        }
    }

    #[test]
    fn test_memo_cache_computes_once() {
        let cache: MemoCache<String, i64> = MemoCache::new("config");
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            42
        };

        assert_eq!(cache.get_or_insert_with("answer".to_string(), compute), 42);
        assert_eq!(cache.get_or_insert_with("answer".to_string(), || unreachable!()), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memo_cache_does_not_cache_errors() {
        let cache: MemoCache<&str, i64> = MemoCache::new("config");
        assert!(cache.get_or_try_insert_with("k", || Err(HarnessError::validation("no"))).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_try_insert_with("k", || Ok(7)).unwrap(), 7);
        assert_eq!(cache.get(&"k"), Some(7));
    }

    #[test]
    fn test_registry_clears_all_caches() {
        let first = Arc::new(MemoCache::<&str, i64>::new("first"));
        let second = Arc::new(MemoCache::<&str, String>::new("second"));
        first.insert("a", 1);
        second.insert("b", "x".to_string());

        let mut registry = CacheRegistry::new();
        registry.register(first.clone());
        registry.register(second.clone());
        assert_eq!(registry.len(), 2);

        registry.clear_all().unwrap();
        assert!(first.is_empty());
        assert!(second.is_empty());
    }

    #[test]
    fn test_registry_reports_failure_after_clearing_the_rest() {
        let memo = Arc::new(MemoCache::<&str, i64>::new("memo"));
        memo.insert("a", 1);

        let mut registry = CacheRegistry::new();
        registry.register(Arc::new(StubbornCache));
        registry.register(memo.clone());

        let err = registry.clear_all().unwrap_err();
        assert!(matches!(err, HarnessError::CacheFailure { ref cache, .. } if cache == "stubborn"));
        assert!(memo.is_empty());
    }
}
