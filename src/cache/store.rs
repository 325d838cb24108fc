//! Read-through store with TTL, tags and single-flight misses.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use lru::LruCache;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;
use super::registry::TagIndex;

const SOURCE: &str = "cache::store";

const HIT_TOTAL: &str = "portfolio_cache_hit_total";
const MISS_TOTAL: &str = "portfolio_cache_miss_total";
const EVICT_TOTAL: &str = "portfolio_cache_evict_total";

/// How a freshly produced value is stored.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub ttl: Duration,
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            tags: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

struct StoredEntry {
    payload: Arc<[u8]>,
    expires_at: Instant,
}

struct CacheState {
    entries: LruCache<String, StoredEntry>,
    tags: TagIndex,
    /// Bumped by every invalidation. A producer that started under an older
    /// generation may have read pre-write data, so its value is not stored.
    generation: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> bool {
        self.tags.unlink(key);
        self.entries.pop(key).is_some()
    }
}

/// Process-local memo of expensive reads.
///
/// Values are kept JSON-encoded so one store can hold every document type.
pub struct ServerCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ServerCache {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = config.max_entries_non_zero();
        Self {
            config,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                tags: TagIndex::default(),
                generation: 0,
            }),
            inflight: DashMap::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the live value for `key`, or run `producer`, store its value and
    /// return it.
    ///
    /// Producer errors are returned unchanged and nothing is stored. Concurrent
    /// callers missing on the same key wait for the first producer instead of
    /// running their own.
    ///
    /// A value produced while any invalidation ran is returned to the caller
    /// but not stored, so a racing write is visible on the next read.
    pub async fn get_cached<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        options: CacheOptions,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.config.enabled {
            return producer().await;
        }

        if let Some(value) = self.lookup(key) {
            counter!(HIT_TOTAL).increment(1);
            return Ok(value);
        }

        let flight = self
            .inflight
            .entry(key.to_string())
            .or_default()
            .clone();

        let result = {
            let _turn = flight.lock().await;
            match self.lookup(key) {
                Some(value) => {
                    counter!(HIT_TOTAL).increment(1);
                    Ok(value)
                }
                None => {
                    counter!(MISS_TOTAL).increment(1);
                    let generation = self.generation();
                    match producer().await {
                        Ok(value) => {
                            self.store(key, &value, &options, generation);
                            Ok(value)
                        }
                        Err(err) => Err(err),
                    }
                }
            }
        };

        drop(flight);
        self.inflight
            .remove_if(key.as_str(), |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    /// Drop every entry carrying `tag`. Returns how many were removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = mutex_lock(&self.state, SOURCE, "invalidate_tag");
        state.generation = state.generation.wrapping_add(1);
        let keys = state.tags.take_tag(tag);
        let removed = keys
            .iter()
            .filter(|key| state.entries.pop(key.as_str()).is_some())
            .count();
        debug!(target = "portfolio::cache", tag, removed, "invalidated cache tag");
        removed
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "invalidate");
        state.generation = state.generation.wrapping_add(1);
        state.remove(key.as_str())
    }

    pub fn clear(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");
        state.generation = state.generation.wrapping_add(1);
        state.entries.clear();
        state.tags.clear();
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generation(&self) -> u64 {
        mutex_lock(&self.state, SOURCE, "generation").generation
    }

    fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let payload = {
            let mut state = mutex_lock(&self.state, SOURCE, "lookup");
            let entry = state.entries.get(key.as_str())?;
            if entry.expires_at <= Instant::now() {
                state.remove(key.as_str());
                return None;
            }
            Arc::clone(&entry.payload)
        };

        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "portfolio::cache",
                    key = %key,
                    error = %err,
                    "discarding unreadable cache entry"
                );
                mutex_lock(&self.state, SOURCE, "discard").remove(key.as_str());
                None
            }
        }
    }

    fn store<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        options: &CacheOptions,
        generation: u64,
    ) {
        let payload: Arc<[u8]> = match serde_json::to_vec(value) {
            Ok(bytes) => bytes.into(),
            Err(err) => {
                warn!(
                    target = "portfolio::cache",
                    key = %key,
                    error = %err,
                    "skipping cache write for unserialisable value"
                );
                return;
            }
        };

        let entry = StoredEntry {
            payload,
            expires_at: Instant::now() + options.ttl,
        };

        let mut state = mutex_lock(&self.state, SOURCE, "store");
        if state.generation != generation {
            debug!(
                target = "portfolio::cache",
                key = %key,
                "skipping cache write; invalidated while producing"
            );
            return;
        }
        if let Some((evicted, _)) = state.entries.push(key.to_string(), entry)
            && evicted != key.as_str()
        {
            state.tags.unlink(&evicted);
            counter!(EVICT_TOTAL).increment(1);
        }
        state.tags.link(key.as_str(), &options.tags);
    }
}
