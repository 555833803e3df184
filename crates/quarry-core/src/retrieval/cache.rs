//! Bounded query-embedding cache.
//!
//! Embedding the same question twice against a local model server is pure
//! waste, so the retriever memoizes query embeddings. The cache is bounded
//! two ways - entry count and time-to-live - and keyed by the md5 digest of
//! the normalized query text, so "What is RAG?" and "what is  rag?" share
//! an entry. Any corpus mutation clears it wholesale.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;

struct CacheEntry {
    embedding: Vec<f32>,
    inserted_at: Instant,
}

/// Size- and time-bounded embedding memoization, owned by the retriever.
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
}

impl EmbeddingCache {
    /// Create a cache from configuration. `max_entries == 0` disables it.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Look up the embedding for a query, if cached and fresh.
    pub fn get(&self, query: &str) -> Option<Vec<f32>> {
        if self.max_entries == 0 {
            return None;
        }
        let key = cache_key(query);
        let mut entries = self.lock();
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                Some(entry.embedding.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Cache a query embedding, evicting expired entries first and the
    /// oldest entry if the cache is still full.
    pub fn insert(&self, query: &str, embedding: Vec<f32>) {
        if self.max_entries == 0 {
            return;
        }
        let key = cache_key(query);
        let mut entries = self.lock();

        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop everything. Called on corpus mutations: cached embeddings stay
    /// valid, but keeping them would let a stale notion of "recently asked"
    /// outlive the index generation they were computed against.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Current number of cached entries (expired ones included until the
    /// next insert purges them).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Digest of the normalized query: trimmed, lowercased, inner whitespace
/// collapsed.
fn cache_key(query: &str) -> String {
    let normalized = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    format!("{:x}", md5::compute(normalized.as_bytes()))
}
