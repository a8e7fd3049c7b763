//! Tag Registry Module
//!
//! Version bookkeeping per tag name, scoped to one named cache. Versions
//! live inside the cache's own store under the reserved [`TAG_KEY_PREFIX`]
//! namespace, so tag counting and entry counting agree with the store's
//! own length.
//!
//! Invalidating "all items with tag T" is O(1): bump one counter. Items
//! carry the versions in effect when they were written; any mismatch later
//! marks them stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::cache::entry::{CacheEntry, CachedValue};
use crate::cache::store::CacheStore;
use crate::cache::TAG_KEY_PREFIX;

// == Tag Version ==
/// Monotonic version counter for one tag name.
///
/// The counter is shared through the store behind `Arc`, so bumps are
/// atomic per tag and concurrent bumps never lose an increment. Versions
/// start at 1 and only ever grow; nothing resets them, which preserves a
/// monotonic ordering of invalidations across cache clears.
#[derive(Debug)]
pub struct TagVersion {
    counter: AtomicU64,
}

impl TagVersion {
    /// Creates a version counter at its initial value.
    pub fn new(initial: u64) -> Self {
        Self {
            counter: AtomicU64::new(initial),
        }
    }

    /// Current version of the tag.
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Store key holding the version entry for `tag`.
pub(crate) fn key_for_tag(tag: &str) -> String {
    format!("{}{}", TAG_KEY_PREFIX, tag)
}

/// Builds the bookkeeping entry for a freshly-seen tag.
///
/// Tag entries never expire, carry no tags of their own and register no
/// subscriptions, so they survive both `trim` and a full cache clear.
fn tag_entry(tag: &str) -> CacheEntry {
    CacheEntry::new(
        key_for_tag(tag),
        Arc::new(TagVersion::new(1)) as CachedValue,
        HashMap::new(),
        0,
    )
}

// == Tag Registry ==
/// View over a store's reserved-prefix namespace exposing tag-version
/// operations.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    store: Arc<CacheStore>,
}

impl TagRegistry {
    // == Constructor ==
    /// Creates a registry over the given store.
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    // == Current Version ==
    /// Current version of `tag`, or None if the tag was never used.
    pub fn current_version(&self, tag: &str) -> Option<u64> {
        let entry = self.store.peek(&key_for_tag(tag))?;
        entry
            .value
            .downcast::<TagVersion>()
            .ok()
            .map(|version| version.current())
    }

    // == Ensure ==
    /// Resolves the current version of `tag`, creating it at version 1 on
    /// first use.
    pub fn ensure(&self, tag: &str) -> u64 {
        let (value, _) = self
            .store
            .get_or_insert_value(&key_for_tag(tag), || tag_entry(tag));
        value
            .downcast::<TagVersion>()
            .map(|version| version.current())
            .unwrap_or(1)
    }

    // == Bump ==
    /// Advances `tag` to a new epoch, instantly invalidating every entry
    /// whose snapshot carries an older version. Returns the new version.
    ///
    /// An unseen tag is initialized at version 1, which invalidates
    /// nothing but makes the tag count as seen from now on.
    pub fn bump(&self, tag: &str) -> u64 {
        let (value, existed) = self
            .store
            .get_or_insert_value(&key_for_tag(tag), || tag_entry(tag));
        let version = match value.downcast::<TagVersion>() {
            Ok(version) if existed => version.advance(),
            Ok(version) => version.current(),
            // Reserved-prefix keys are rejected at the facade, so the
            // entry under a tag key is always a TagVersion.
            Err(_) => 1,
        };

        debug!("tag \"{}\" bumped to version {}", tag, version);
        version
    }

    // == Snapshot ==
    /// Resolves the current version of each listed tag (creating unseen
    /// ones at version 1), producing the map embedded in a new entry.
    pub fn snapshot(&self, tags: &[&str]) -> HashMap<String, u64> {
        tags.iter()
            .map(|tag| (tag.to_string(), self.ensure(tag)))
            .collect()
    }

    // == Entry Validity ==
    /// An entry is valid iff every tag in its snapshot still has the
    /// version the entry was written under. A missing tag (never seen, or
    /// its bookkeeping entry reclaimed) also marks the entry stale.
    pub fn is_entry_valid(&self, entry: &CacheEntry) -> bool {
        entry
            .tags
            .iter()
            .all(|(tag, version)| self.current_version(tag) == Some(*version))
    }

    // == Tags Count ==
    /// Number of tags ever used with this cache.
    pub fn tags_count(&self) -> usize {
        self.store.tag_entry_count()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::broadcast::InvalidationBroadcaster;

    fn registry() -> TagRegistry {
        let broadcaster = Arc::new(InvalidationBroadcaster::new());
        TagRegistry::new(Arc::new(CacheStore::new("test", broadcaster)))
    }

    #[test]
    fn test_unseen_tag_has_no_version() {
        let registry = registry();
        assert_eq!(registry.current_version("users"), None);
        assert_eq!(registry.tags_count(), 0);
    }

    #[test]
    fn test_ensure_creates_at_version_one() {
        let registry = registry();

        assert_eq!(registry.ensure("users"), 1);
        assert_eq!(registry.current_version("users"), Some(1));
        assert_eq!(registry.tags_count(), 1);

        // Idempotent for a seen tag.
        assert_eq!(registry.ensure("users"), 1);
        assert_eq!(registry.tags_count(), 1);
    }

    #[test]
    fn test_bump_increments_seen_tag() {
        let registry = registry();

        registry.ensure("users");
        assert_eq!(registry.bump("users"), 2);
        assert_eq!(registry.bump("users"), 3);
        assert_eq!(registry.current_version("users"), Some(3));
    }

    #[test]
    fn test_bump_initializes_unseen_tag() {
        let registry = registry();

        assert_eq!(registry.bump("users"), 1);
        assert_eq!(registry.current_version("users"), Some(1));
    }

    #[test]
    fn test_snapshot_resolves_all_tags() {
        let registry = registry();

        registry.ensure("users");
        registry.bump("users");

        let snapshot = registry.snapshot(&["users", "orders"]);
        assert_eq!(snapshot.get("users"), Some(&2));
        assert_eq!(snapshot.get("orders"), Some(&1));
        assert_eq!(registry.tags_count(), 2);
    }

    #[test]
    fn test_entry_validity_tracks_versions() {
        let registry = registry();

        let snapshot = registry.snapshot(&["users"]);
        let entry = CacheEntry::new("key1", Arc::new(1u32), snapshot, 0);
        assert!(registry.is_entry_valid(&entry));

        registry.bump("users");
        assert!(!registry.is_entry_valid(&entry));
    }

    #[test]
    fn test_entry_with_unknown_tag_is_stale() {
        let registry = registry();

        let mut tags = HashMap::new();
        tags.insert("ghost".to_string(), 1);
        let entry = CacheEntry::new("key1", Arc::new(1u32), tags, 0);

        assert!(!registry.is_entry_valid(&entry));
    }

    #[test]
    fn test_untagged_entry_is_always_valid() {
        let registry = registry();
        let entry = CacheEntry::new("key1", Arc::new(1u32), HashMap::new(), 0);
        assert!(registry.is_entry_valid(&entry));
    }

    #[test]
    fn test_concurrent_bumps_never_lose_increments() {
        let registry = registry();
        registry.ensure("users");

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        registry.bump("users");
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(registry.current_version("users"), Some(801));
    }
}
