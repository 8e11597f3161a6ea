//! Tag invalidation graph.
//!
//! A bipartite index between tags and the cache keys that provided them. Both
//! directions are kept so that invalidation (tag → keys) and entry
//! replacement or eviction (key → tags) are cheap. The two maps always agree:
//! `k ∈ by_tag[t]` exactly when `t ∈ by_key[k]`, and no tag maps to an empty
//! set.

use crate::key::CacheKey;
use crate::tag::Tag;
use std::collections::{BTreeSet, HashMap};

/// Tag ↔ key index
#[derive(Debug, Default, Clone)]
pub struct TagGraph {
    by_tag: HashMap<Tag, BTreeSet<CacheKey>>,
    by_key: HashMap<CacheKey, BTreeSet<Tag>>,
}

impl TagGraph {
    /// Empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` depends on `tag`
    ///
    /// Returns `false` if the edge already existed.
    pub fn subscribe(&mut self, tag: Tag, key: CacheKey) -> bool {
        let added = self.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        self.by_key.entry(key).or_default().insert(tag);
        added
    }

    /// Replace every tag of `key` with `tags`
    ///
    /// Called when a fetch lands: the fresh result decides which tags the
    /// entry provides.
    pub fn replace_tags(&mut self, key: &CacheKey, tags: impl IntoIterator<Item = Tag>) {
        self.remove_key(key);
        for tag in tags {
            self.subscribe(tag, key.clone());
        }
    }

    /// Drop `key` and all its edges
    pub fn remove_key(&mut self, key: &CacheKey) {
        let Some(tags) = self.by_key.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.by_tag.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(&tag);
                }
            }
        }
    }

    /// Keys depending on any of `tags`, each listed once
    #[must_use]
    pub fn dependents<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> BTreeSet<CacheKey> {
        tags.into_iter()
            .filter_map(|tag| self.by_tag.get(tag))
            .flatten()
            .cloned()
            .collect()
    }

    /// Tags provided by `key`
    #[must_use]
    pub fn tags_of(&self, key: &CacheKey) -> BTreeSet<Tag> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct tags with at least one dependent
    #[must_use]
    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    /// True when no key provides any tag
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
