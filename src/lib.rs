//! # tagcache
//!
//! A tag-aware in-process object cache with versioned invalidation and TTL
//! expiration.
//!
//! Items are stored under string keys, optionally tagged, and can be
//! retrieved, updated or bulk-invalidated by key or by tag. Invalidating a
//! tag is O(1): a per-tag version counter is bumped, instantly staling
//! every item written under the old version, and a broadcast proactively
//! evicts the tag's subscribers. The per-access validity check remains the
//! correctness backstop, so a stale item is never returned even if the
//! broadcast missed it.
//!
//! ```
//! use tagcache::CacheService;
//!
//! let cache = CacheService::named("catalog");
//! cache.set_tagged("product:1", "widget".to_string(), &["products"]).unwrap();
//!
//! let value = cache.get::<String>("product:1").unwrap();
//! assert_eq!(*value, "widget");
//!
//! cache.delete_by_tag("products").unwrap();
//! assert!(!cache.exists("product:1"));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod service;

pub use cache::{CachePool, CacheStats, CachedValue, InvalidationBroadcaster};
pub use config::Config;
pub use error::{CacheError, Result};
pub use service::CacheService;
