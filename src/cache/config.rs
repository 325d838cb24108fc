//! Cache configuration.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_TTL_SECONDS: u64 = 60;
const DEFAULT_MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every read goes straight to the producer.
    pub enabled: bool,
    pub default_ttl: Duration,
    /// Capacity of the LRU; least recently used entries go first.
    pub max_entries: usize,
    /// Per-collection TTLs, keyed by collection name.
    pub ttl_overrides: HashMap<String, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl_overrides: HashMap::new(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl: settings.default_ttl,
            max_entries: settings.max_entries.get(),
            ttl_overrides: settings.ttl_overrides.clone(),
        }
    }
}

impl CacheConfig {
    pub fn ttl_for(&self, collection: &str) -> Duration {
        self.ttl_overrides
            .get(collection)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.max_entries, 1024);
        assert!(config.ttl_overrides.is_empty());
    }

    #[test]
    fn ttl_override_wins_over_default() {
        let mut config = CacheConfig::default();
        config
            .ttl_overrides
            .insert("personal_info".to_string(), Duration::from_secs(300));

        assert_eq!(config.ttl_for("personal_info"), Duration::from_secs(300));
        assert_eq!(config.ttl_for("projects"), Duration::from_secs(60));
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert_eq!(config.max_entries_non_zero().get(), 1);
    }
}
