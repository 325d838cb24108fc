//! Client-side cache of decoded API responses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct ClientEntry {
    value: Value,
    stored_at: Instant,
    max_age: Duration,
}

impl ClientEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }
}

/// Key-value cache where every entry remembers when it was stored.
///
/// Reads pass the oldest age the caller will accept; anything older is
/// evicted on access and reported as absent. Values are kept JSON-encoded so
/// one cache can hold every response type.
#[derive(Debug, Default)]
pub struct ClientCache {
    entries: DashMap<String, ClientEntry>,
    /// Bumped before every invalidation; see [`ClientCache::set_value_since`].
    generation: AtomicU64,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key` if it is at most `max_age` old.
    pub fn get<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
        let value = self.fresh_value(key, max_age)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(
                    target = "portfolio::client::cache",
                    key,
                    error = %err,
                    "cached value could not be decoded; dropping entry"
                );
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, max_age: Duration) {
        match serde_json::to_value(value) {
            Ok(value) => self.set_value(key, value, max_age),
            Err(err) => warn!(
                target = "portfolio::client::cache",
                key,
                error = %err,
                "value could not be encoded; not cached"
            ),
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key).is_some()
    }

    /// Remove every entry whose key matches `pattern`. Returns how many went.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.is_match(key));
        let removed = before.saturating_sub(self.entries.len());
        debug!(
            target = "portfolio::client::cache",
            pattern = pattern.as_str(),
            removed,
            "cache entries invalidated"
        );
        removed
    }

    /// Drop entries older than the max age they were stored with.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.age(now) <= entry.max_age);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn fresh_value(&self, key: &str, max_age: Duration) -> Option<Value> {
        let now = Instant::now();
        let expired = {
            let entry = self.entries.get(key)?;
            if entry.age(now) <= max_age {
                return Some(entry.value.clone());
            }
            true
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation ran after `generation` was read.
    ///
    /// The shard lock is held across the check and the insert, so an
    /// invalidation either lands first and is seen, or removes the new entry.
    pub(crate) fn set_value_since(
        &self,
        key: &str,
        value: Value,
        max_age: Duration,
        generation: u64,
    ) -> bool {
        let entry = self.entries.entry(key.to_string());
        if self.generation() != generation {
            return false;
        }
        entry.insert(ClientEntry {
            value,
            stored_at: Instant::now(),
            max_age,
        });
        true
    }

    fn set_value(&self, key: &str, value: Value, max_age: Duration) {
        self.entries.insert(
            key.to_string(),
            ClientEntry {
                value,
                stored_at: Instant::now(),
                max_age,
            },
        );
    }
}
