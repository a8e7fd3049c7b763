//! Invalidation Broadcaster Module
//!
//! Push-based eviction: entries subscribe at write time to "this tag
//! changed" or "this cache cleared" signals, and are proactively removed
//! from their store when the signal fires. The lazy per-access validity
//! check remains the correctness backstop; broadcasting only makes
//! reclamation timely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::debug;

use crate::cache::store::CacheStore;

// == Signal Key ==
/// Routing key for a subscription: a cache name plus an optional tag.
///
/// `tag: None` is the "cache cleared" channel used by entries written
/// without tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalKey {
    /// Name of the cache the subscriber belongs to
    pub cache: String,
    /// Tag the subscriber listens on, or None for the clear channel
    pub tag: Option<String>,
}

// == Subscription Handle ==
/// Caller-side handle for a live subscription, kept by the owning entry.
///
/// Releasing the handle (through [`InvalidationBroadcaster::unsubscribe`])
/// is terminal; a replaced entry registers brand-new subscriptions.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub(crate) signal: SignalKey,
    pub(crate) id: u64,
}

/// Broadcaster-side record of a subscription.
///
/// Holds a weak store reference so a dropped store can never be kept alive
/// (or resurrected) by its leftover subscriptions.
#[derive(Debug)]
struct Subscription {
    id: u64,
    entry_id: u64,
    key: String,
    store: Weak<CacheStore>,
}

// == Invalidation Broadcaster ==
/// Process-wide publish/subscribe registry, partitioned by
/// `(cache name, tag)` so unrelated caches never interfere.
///
/// This is an owned object rather than global mutable state: the default
/// pool shares a single instance across all named caches, and tests can
/// construct isolated broadcasters.
#[derive(Debug, Default)]
pub struct InvalidationBroadcaster {
    subscribers: DashMap<SignalKey, Vec<Subscription>>,
    next_id: AtomicU64,
}

impl InvalidationBroadcaster {
    // == Constructor ==
    /// Creates a new broadcaster with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    // == Subscribe ==
    /// Registers an entry for eviction when the matching signal fires.
    ///
    /// # Arguments
    /// * `cache` - Name of the cache the entry lives in
    /// * `tag` - Tag to listen on, or None for the clear channel
    /// * `entry_id` - Id of the owning entry (guards against evicting a
    ///   replacement that reused the key)
    /// * `key` - Key of the owning entry
    /// * `store` - Store the entry lives in
    pub fn subscribe(
        &self,
        cache: &str,
        tag: Option<&str>,
        entry_id: u64,
        key: &str,
        store: &Arc<CacheStore>,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let signal = SignalKey {
            cache: cache.to_string(),
            tag: tag.map(str::to_string),
        };

        self.subscribers
            .entry(signal.clone())
            .or_default()
            .push(Subscription {
                id,
                entry_id,
                key: key.to_string(),
                store: Arc::downgrade(store),
            });

        SubscriptionHandle { signal, id }
    }

    // == Unsubscribe ==
    /// Releases a subscription. Idempotent: releasing an already-drained
    /// subscription is a no-op.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut bucket) = self.subscribers.get_mut(&handle.signal) {
            bucket.retain(|sub| sub.id != handle.id);
        }
        // Drop empty buckets so signal keys for long-gone tags don't pile up.
        self.subscribers
            .remove_if(&handle.signal, |_, bucket| bucket.is_empty());
    }

    // == Signal Tag ==
    /// Synchronously evicts every live subscriber of `(cache, tag)`.
    ///
    /// Returns the number of entries actually removed. Fan-out is
    /// O(subscribers for that tag), not O(all entries).
    pub fn signal_tag(&self, cache: &str, tag: &str) -> usize {
        let signal = SignalKey {
            cache: cache.to_string(),
            tag: Some(tag.to_string()),
        };
        let drained = match self.subscribers.remove(&signal) {
            Some((_, bucket)) => bucket,
            None => return 0,
        };

        let removed = self.evict(drained);
        debug!(
            "tag signal \"{}\" evicted {} entries from cache \"{}\"",
            tag, removed, cache
        );
        removed
    }

    // == Signal Clear ==
    /// Synchronously evicts every live subscriber of `cache`, regardless of
    /// which tag (or the clear channel) it listens on.
    pub fn signal_clear(&self, cache: &str) -> usize {
        let signals: Vec<SignalKey> = self
            .subscribers
            .iter()
            .filter(|item| item.key().cache == cache)
            .map(|item| item.key().clone())
            .collect();

        let mut drained = Vec::new();
        for signal in signals {
            if let Some((_, bucket)) = self.subscribers.remove(&signal) {
                drained.extend(bucket);
            }
        }

        let removed = self.evict(drained);
        debug!("clear signal evicted {} entries from cache \"{}\"", removed, cache);
        removed
    }

    // == Subscriber Count ==
    /// Number of live subscriptions for `(cache, tag)`. Probe for tests and
    /// leak diagnostics.
    pub fn subscriber_count(&self, cache: &str, tag: Option<&str>) -> usize {
        let signal = SignalKey {
            cache: cache.to_string(),
            tag: tag.map(str::to_string),
        };
        self.subscribers
            .get(&signal)
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    /// Removes each drained subscriber's owning entry from its store.
    ///
    /// Removal is guarded by entry id: a subscription that outlived its
    /// entry (the key was replaced concurrently) evicts nothing.
    fn evict(&self, drained: Vec<Subscription>) -> usize {
        let mut removed = 0;
        for sub in drained {
            if let Some(store) = sub.store.upgrade() {
                if store.remove_invalidated(&sub.key, sub.entry_id) {
                    removed += 1;
                }
            }
        }
        removed
    }
}
