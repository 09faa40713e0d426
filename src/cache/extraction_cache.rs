use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::triple::Triple;

/// Thread-safe LRU cache for LLM extraction results
///
/// Re-submitting the same text to the same model returns the cached triples
/// instead of paying for another completion. Keys are SHA-256 digests so long
/// documents don't sit in memory twice.
pub struct ExtractionCache {
    cache: Mutex<LruCache<String, Vec<Triple>>>,
}

impl ExtractionCache {
    /// Create a new extraction cache with the specified capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of texts to remember; 0 is bumped to 1
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Cache key for a (model, text) pair
    ///
    /// # Returns
    ///
    /// Hex-encoded SHA-256 of the model name, a NUL separator and the text
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Get cached triples for a key
    ///
    /// # Arguments
    ///
    /// * `key` - Key produced by [`ExtractionCache::key`]
    ///
    /// # Returns
    ///
    /// Some(triples) if found in cache, None otherwise
    pub fn get(&self, key: &str) -> Option<Vec<Triple>> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    /// Store triples under a key
    ///
    /// # Arguments
    ///
    /// * `key` - Key produced by [`ExtractionCache::key`]
    /// * `triples` - Parsed extraction result to cache
    pub fn put(&self, key: String, triples: Vec<Triple>) {
        self.cache.lock().unwrap().put(key, triples);
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().unwrap().is_empty()
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }
}
