//! Cache key construction.

use std::fmt;

use uuid::Uuid;

/// Key of a server cache entry: resource type plus parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Every document of a collection.
    pub fn list(collection: &str) -> Self {
        Self(format!("{collection}:list"))
    }

    /// A filtered view of a collection, e.g. `blog_posts:list:published`.
    pub fn view(collection: &str, view: &str) -> Self {
        Self(format!("{collection}:list:{view}"))
    }

    pub fn item(collection: &str, id: Uuid) -> Self {
        Self(format!("{collection}:id:{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
