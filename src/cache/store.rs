//! Cache Store Module
//!
//! Concurrent key→entry storage with per-entry absolute expiration. Writes
//! and single-key reads are O(1); tag-based lookups pay a linear scan (no
//! secondary tag index is maintained). Every removal path releases the
//! removed entry's broadcast subscriptions exactly once.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::cache::broadcast::InvalidationBroadcaster;
use crate::cache::entry::{CacheEntry, CachedValue};
use crate::cache::stats::{CacheStats, StatCounters};
use crate::cache::TAG_KEY_PREFIX;

// == Cache Store ==
/// Key→entry map for one named cache, shared by every facade constructed
/// with that name.
///
/// Tag-version bookkeeping entries live in the same map under the
/// [`TAG_KEY_PREFIX`] namespace, so entry counting and tag counting stay
/// consistent with the map's own length.
#[derive(Debug)]
pub struct CacheStore {
    /// Name of the cache this store backs
    name: String,
    /// Key-entry storage, bookkeeping entries included
    entries: DashMap<String, CacheEntry>,
    /// Access statistics
    counters: StatCounters,
    /// Broadcaster that subscriptions are released back to
    broadcaster: Arc<InvalidationBroadcaster>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store for the named cache.
    pub fn new(name: impl Into<String>, broadcaster: Arc<InvalidationBroadcaster>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
            counters: StatCounters::default(),
            broadcaster,
        }
    }

    /// Name of the cache this store backs.
    pub fn name(&self) -> &str {
        &self.name
    }

    // == Set ==
    /// Inserts or atomically replaces the entry for its key.
    ///
    /// A replaced entry's subscriptions are released as a side effect; the
    /// incoming entry keeps the subscriptions it registered before insertion.
    pub fn set(&self, entry: CacheEntry) {
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.release(&old);
        }
    }

    // == Get ==
    /// Returns the entry for `key` if present and not yet time-expired.
    ///
    /// A time-expired entry is treated as absent and removed on discovery.
    /// Tag validity is the read path's concern, not the store's.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = match self.entries.get(key) {
            Some(guard) => guard.value().clone(),
            None => {
                self.counters.record_miss();
                return None;
            }
        };

        if entry.is_expired() {
            self.remove_expired(key);
            self.counters.record_miss();
            return None;
        }

        self.counters.record_hit();
        Some(entry)
    }

    /// Like [`CacheStore::get`] but without touching statistics or removing
    /// expired entries. Used for bookkeeping lookups.
    pub(crate) fn peek(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.get(key)?.value().clone();
        if entry.is_expired() {
            return None;
        }
        Some(entry)
    }

    // == Remove ==
    /// Removes the entry for `key` if present, returning whether anything
    /// was removed.
    pub fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, old)) => {
                self.release(&old);
                true
            }
            None => false,
        }
    }

    /// Removes `key` only while it still holds the entry with `entry_id`,
    /// counting the removal as a tag invalidation.
    ///
    /// Used by the broadcaster and by lazy staleness removal; the id guard
    /// keeps a removal decided against a snapshot from hitting a racing
    /// replacement.
    pub(crate) fn remove_invalidated(&self, key: &str, entry_id: u64) -> bool {
        match self.entries.remove_if(key, |_, entry| entry.id == entry_id) {
            Some((_, old)) => {
                self.release(&old);
                self.counters.record_invalidation();
                true
            }
            None => false,
        }
    }

    /// Removes `key` only while its entry is time-expired.
    fn remove_expired(&self, key: &str) {
        if let Some((_, old)) = self.entries.remove_if(key, |_, entry| entry.is_expired()) {
            self.release(&old);
            self.counters.record_expiration();
        }
    }

    // == Scan ==
    /// Returns a snapshot of all live ordinary entries, for tag lookups.
    ///
    /// O(n) over the whole map. Bookkeeping entries are skipped; expired
    /// entries encountered along the way are removed.
    pub fn scan(&self) -> Vec<CacheEntry> {
        let mut live = Vec::new();
        let mut expired = Vec::new();

        for item in self.entries.iter() {
            if item.key().starts_with(TAG_KEY_PREFIX) {
                continue;
            }
            if item.value().is_expired() {
                expired.push(item.key().clone());
            } else {
                live.push(item.value().clone());
            }
        }

        for key in expired {
            self.remove_expired(&key);
        }

        live
    }

    // == Length ==
    /// Current number of entries, tag bookkeeping entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tag bookkeeping entries.
    pub(crate) fn tag_entry_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|item| item.key().starts_with(TAG_KEY_PREFIX))
            .count()
    }

    // == Cleanup Expired ==
    /// Removes all time-expired entries, returning the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|item| item.value().is_expired())
            .map(|item| item.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if let Some((_, old)) = self.entries.remove_if(&key, |_, entry| entry.is_expired()) {
                self.release(&old);
                self.counters.record_expiration();
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(
                "expiry sweep removed {} entries from cache \"{}\"",
                removed, self.name
            );
        }
        removed
    }

    // == Trim ==
    /// Explicit sweep: removes expired entries, then enough additional
    /// ordinary entries to reach `percent`% of the ordinary entries present
    /// at the start of the call. Returns the number removed.
    ///
    /// Tag bookkeeping entries are never trimmed.
    pub fn trim(&self, percent: u32) -> usize {
        let percent = percent.min(100) as usize;
        let start = self
            .entries
            .iter()
            .filter(|item| !item.key().starts_with(TAG_KEY_PREFIX))
            .count();
        let target = (start * percent + 99) / 100;

        let mut removed = self.cleanup_expired();
        if removed < target {
            let victims: Vec<String> = self
                .entries
                .iter()
                .map(|item| item.key().clone())
                .filter(|key| !key.starts_with(TAG_KEY_PREFIX))
                .take(target - removed)
                .collect();
            for key in victims {
                if self.remove(&key) {
                    removed += 1;
                }
            }
        }

        debug!(
            "trim({}%) removed {} entries from cache \"{}\"",
            percent, removed, self.name
        );
        removed
    }

    // == Stats ==
    /// Returns current access statistics.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }

    /// Returns the existing value for `key`, or inserts the entry built by
    /// `make` and returns its value. The boolean reports whether the key
    /// already existed.
    ///
    /// Atomic with respect to concurrent callers; used for tag-version
    /// creation so two racing writers agree on one counter.
    pub(crate) fn get_or_insert_value(
        &self,
        key: &str,
        make: impl FnOnce() -> CacheEntry,
    ) -> (CachedValue, bool) {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().value.clone(), true),
            Entry::Vacant(vacant) => {
                let entry = make();
                let value = entry.value.clone();
                vacant.insert(entry);
                (value, false)
            }
        }
    }

    /// Releases every subscription owned by a removed entry.
    fn release(&self, entry: &CacheEntry) {
        for handle in &entry.subscriptions {
            self.broadcaster.unsubscribe(handle);
        }
    }
}
