//! Cache Module
//!
//! The invalidation engine: a generic expiring key→entry store, per-tag
//! version counters kept inside the store's reserved namespace, and a
//! push-based broadcaster that proactively evicts entries when a tag is
//! invalidated or a cache is cleared.

mod broadcast;
mod entry;
mod pool;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use broadcast::{InvalidationBroadcaster, SignalKey, SubscriptionHandle};
pub use entry::{CacheEntry, CachedValue};
pub use pool::CachePool;
pub use stats::CacheStats;
pub use store::CacheStore;
pub use tags::{TagRegistry, TagVersion};

// == Public Constants ==
/// Reserved key prefix for tag-version bookkeeping entries
pub const TAG_KEY_PREFIX: &str = "_tags/";

/// Name of the cache that unnamed facades bind to
pub const DEFAULT_CACHE_NAME: &str = "default";

/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
