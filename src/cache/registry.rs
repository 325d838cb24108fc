//! Bidirectional tag index.
//!
//! Tracks tag → keys so a tag can be invalidated in one sweep, and
//! key → tags so evicted entries can be unlinked from every tag they carried.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub(crate) struct TagIndex {
    tag_to_keys: HashMap<String, HashSet<String>>,
    key_to_tags: HashMap<String, Vec<String>>,
}

impl TagIndex {
    pub(crate) fn link(&mut self, key: &str, tags: &[String]) {
        self.unlink(key);
        for tag in tags {
            self.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.key_to_tags.insert(key.to_string(), tags.to_vec());
    }

    /// Remove `key` from every tag it was linked to.
    pub(crate) fn unlink(&mut self, key: &str) {
        let Some(tags) = self.key_to_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.tag_to_keys.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_to_keys.remove(&tag);
                }
            }
        }
    }

    /// Remove a tag and return the keys that carried it. The returned keys are
    /// unlinked from their other tags as well.
    pub(crate) fn take_tag(&mut self, tag: &str) -> Vec<String> {
        let keys: Vec<String> = self
            .tag_to_keys
            .remove(tag)
            .map(|keys| keys.into_iter().collect())
            .unwrap_or_default();
        for key in &keys {
            self.unlink(key);
        }
        keys
    }

    pub(crate) fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }

    #[cfg(test)]
    pub(crate) fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tag_to_keys.get(tag).cloned().unwrap_or_default()
    }
}
