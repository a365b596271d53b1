use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};
use crate::store::{Document, Query};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub documents: Vec<Document>,
    pub created_at: Instant,
}

// short-lived cache of store query results, failures are never cached
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, query: &Query) -> Option<Vec<Document>> {
        if !self.is_enabled() {
            return None;
        }
        let key = make_cache_key(query);
        if let Some(entry) = self.entries.get(&key) {
            if entry.created_at.elapsed() < self.ttl {
                CACHE_HITS.inc();
                return Some(entry.documents.clone());
            }
        }
        CACHE_MISSES.inc();
        None
    }

    pub fn insert(&self, query: &Query, documents: Vec<Document>) {
        if !self.is_enabled() {
            return;
        }
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.created_at.elapsed() < ttl);
        self.entries.insert(
            make_cache_key(query),
            CacheEntry {
                documents,
                created_at: Instant::now(),
            },
        );
        CACHE_SIZE.set(self.entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Create a cache key (hash of the serialized query)
pub fn make_cache_key(query: &Query) -> String {
    let mut hasher = Sha256::new();
    // Query only holds strings, numbers and enums, so serialization cannot fail
    hasher.update(serde_json::to_vec(query).unwrap_or_default());
    format!("{:x}", hasher.finalize())
}
