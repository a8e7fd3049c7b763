//! Cache Entry Module
//!
//! Defines the structure for individual cache entries: a type-erased value,
//! the tag-version snapshot taken at write time, and optional TTL metadata.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::broadcast::SubscriptionHandle;

/// Type-erased value slot shared between the cache and its callers.
///
/// Values are stored behind `Arc` so that retrieval hands out shared
/// ownership; once an item is removed from the cache and all caller
/// references are dropped, the value is freed.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

// Entry ids are unique per write; removal decisions made against a
// snapshot are guarded by id so they never hit a racing replacement.
static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

fn next_entry_id() -> u64 {
    NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed)
}

// == Cache Entry ==
/// Represents a single cache entry with value, tag snapshot and metadata.
///
/// Entries are immutable once written; an overwrite of the same key creates
/// a brand-new entry (with a new id and new subscriptions).
#[derive(Clone)]
pub struct CacheEntry {
    /// Unique id of this particular write
    pub id: u64,
    /// Key of the cached item
    pub key: String,
    /// The stored value
    pub value: CachedValue,
    /// Tag versions in effect when the entry was written
    pub tags: HashMap<String, u64>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Broadcast subscriptions owned by this entry, released on removal
    pub(crate) subscriptions: Vec<SubscriptionHandle>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry with an optional expiration time.
    ///
    /// # Arguments
    /// * `key` - Key of the cached item
    /// * `value` - Type-erased value to store
    /// * `tags` - Snapshot of tag versions taken at write time
    /// * `expiration_secs` - Expiration in seconds, 0 = no expiration
    pub fn new(
        key: impl Into<String>,
        value: CachedValue,
        tags: HashMap<String, u64>,
        expiration_secs: u64,
    ) -> Self {
        let now = now_millis();
        let expires_at = match expiration_secs {
            0 => None,
            secs => Some(now + secs * 1000),
        };

        Self {
            id: next_entry_id(),
            key: key.into(),
            value,
            tags,
            created_at: now,
            expires_at,
            subscriptions: Vec::new(),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is considered expired when the current
    /// time is greater than or equal to the expiration time, so an item is
    /// treated as absent the instant its TTL has fully elapsed.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => now_millis() >= expires,
            None => false,
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("tags", &self.tags)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
