//! Server-side read-through cache.
//!
//! Expensive reads (document-store queries) are memoised for a bounded time:
//!
//! - every entry carries a TTL and is treated as absent once it is older;
//! - entries carry tags, and a write to a collection invalidates its tag;
//! - concurrent misses for one key share a single producer call.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 60
//! max_entries = 1024
//!
//! [cache.ttl_overrides]
//! personal_info = 300
//! ```

mod config;
mod keys;
mod lock;
mod registry;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use store::{CacheOptions, ServerCache};
