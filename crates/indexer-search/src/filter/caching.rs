//! Generation-keyed memoization of filter results.
//!
//! Results are cached per [`GenerationKey`], so a commit implicitly
//! invalidates everything: the next evaluation runs against a new key. Old
//! generations age out of the LRU.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::error::SearchError;
use crate::filter::{Filter, FilterBits};
use crate::index::DEFAULT_FILTER_CACHE_CAPACITY;
use crate::snapshot::{GenerationKey, IndexSnapshot};

/// Caches the bits of an inner filter per index generation.
pub struct CachingFilter<F> {
    inner: F,
    cache: Mutex<LruCache<GenerationKey, Arc<FilterBits>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<F: Filter> CachingFilter<F> {
    pub fn new(inner: F) -> Self {
        Self::with_capacity(inner, DEFAULT_FILTER_CACHE_CAPACITY)
    }

    /// Keep results for at most `capacity` generations (minimum 1).
    pub fn with_capacity(inner: F, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Number of generations currently cached.
    pub fn len(&self) -> usize {
        self.cache().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache().is_empty()
    }

    pub fn clear(&self) {
        self.cache().clear();
    }

    // Entries are immutable Arcs, so a poisoned cache is still consistent.
    fn cache(&self) -> MutexGuard<'_, LruCache<GenerationKey, Arc<FilterBits>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: Filter> Filter for CachingFilter<F> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn bits(&self, snapshot: &IndexSnapshot) -> Result<Arc<FilterBits>, SearchError> {
        let key = snapshot.key();

        if let Some(bits) = self.cache().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(filter = self.inner.name(), generation = key.generation, "Filter cache hit");
            return Ok(bits);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        // Computed outside the lock; concurrent misses may both evaluate
        let bits = self.inner.bits(snapshot)?;
        if bits.generation() != key {
            return Err(SearchError::GenerationMismatch {
                expected: key.generation,
                actual: bits.generation().generation,
            });
        }

        let mut cache = self.cache();
        if let Some(existing) = cache.get(&key) {
            return Ok(Arc::clone(existing));
        }
        cache.put(key, Arc::clone(&bits));
        debug!(
            filter = self.inner.name(),
            generation = key.generation,
            matches = bits.len(),
            "Filter cache fill"
        );
        Ok(bits)
    }
}
