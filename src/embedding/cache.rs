//! LRU embedding cache and the caching provider wrapper.
//!
//! The cache is keyed by exact content and bounded by `cache_size`. A single
//! mutex guards the map and the recency list; every operation holds it for
//! O(size) at worst (the recency list is a plain vector, small enough at the
//! default bound of 1000 entries).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use super::EmbeddingProvider;
use crate::error::Result;

/// Cache performance counters, surfaced through metrics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

struct CacheInner {
    entries: std::collections::HashMap<String, Vec<f32>>,
    // Most recently used last
    recency: Vec<String>,
    max_size: usize,
}

impl CacheInner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            let k = self.recency.remove(pos);
            self.recency.push(k);
        }
    }

    fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        let value = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(value)
    }

    fn set(&mut self, key: &str, value: Vec<f32>) {
        if self.entries.insert(key.to_string(), value).is_some() {
            self.touch(key);
            return;
        }
        self.recency.push(key.to_string());

        if self.entries.len() > self.max_size {
            // Least recently used sits at the front
            let evicted = self.recency.remove(0);
            self.entries.remove(&evicted);
        }
    }
}

/// LRU cache for embedding vectors.
pub struct EmbeddingCache {
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(max_size: usize) -> Self {
        let max_size = if max_size == 0 { 1000 } else { max_size };
        Self {
            inner: Mutex::new(CacheInner {
                entries: std::collections::HashMap::new(),
                recency: Vec::with_capacity(max_size),
                max_size,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");
        match inner.get(key) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: Vec<f32>) {
        let mut inner = self.inner.lock().expect("embedding cache lock poisoned");
        inner.set(key, value);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("embedding cache lock poisoned");
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: inner.entries.len(),
            max_size: inner.max_size,
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// Wraps any [`EmbeddingProvider`] with the LRU cache.
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P: EmbeddingProvider> CachedProvider<P> {
    pub fn new(provider: P, cache_size: usize) -> Self {
        Self {
            provider,
            cache: EmbeddingCache::new(cache_size),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for CachedProvider<P> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(text) {
            tracing::trace!("embedding cache hit");
            return Ok(cached);
        }

        let embedding = self.provider.embed(text)?;
        self.cache.set(text, embedding.clone());
        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut uncached_indices = Vec::new();
        let mut uncached_texts = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(text) {
                Some(cached) => results[i] = Some(cached),
                None => {
                    uncached_indices.push(i);
                    uncached_texts.push(*text);
                }
            }
        }

        if !uncached_texts.is_empty() {
            let fresh = self.provider.embed_batch(&uncached_texts)?;
            for (j, embedding) in fresh.into_iter().enumerate() {
                self.cache.set(uncached_texts[j], embedding.clone());
                results[uncached_indices[j]] = Some(embedding);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("filled")).collect())
    }

    fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hash::HashEmbeddingProvider;
    use crate::embedding::EMBEDDING_DIM;

    #[test]
    fn cache_hit_after_set() {
        let cache = EmbeddingCache::new(10);
        assert!(cache.get("key").is_none());

        cache.set("key", vec![1.0, 2.0]);
        assert_eq!(cache.get("key").unwrap(), vec![1.0, 2.0]);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.set("a", vec![1.0]);
        cache.set("b", vec![2.0]);

        // Touch "a" so "b" becomes the LRU entry
        cache.get("a");
        cache.set("c", vec![3.0]);

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn cache_update_existing_key_does_not_grow() {
        let cache = EmbeddingCache::new(2);
        cache.set("a", vec![1.0]);
        cache.set("a", vec![9.0]);
        cache.set("b", vec![2.0]);

        assert_eq!(cache.get("a").unwrap(), vec![9.0]);
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn cached_provider_serves_second_call_from_cache() {
        let provider = CachedProvider::new(HashEmbeddingProvider::new(EMBEDDING_DIM), 10);

        let first = provider.embed("repeat me").unwrap();
        let second = provider.embed("repeat me").unwrap();
        assert_eq!(first, second);

        let stats = provider.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn cached_batch_mixes_hits_and_misses_in_order() {
        let provider = CachedProvider::new(HashEmbeddingProvider::new(EMBEDDING_DIM), 10);
        let warm = provider.embed("warm").unwrap();

        let batch = provider.embed_batch(&["cold-1", "warm", "cold-2"]).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[1], warm);
        assert_eq!(batch[0], provider.embed("cold-1").unwrap());
    }
}
