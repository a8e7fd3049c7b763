//! Cache Pool Module
//!
//! Registry of named stores plus the broadcaster they share. Facades
//! constructed with the same name against the same pool resolve to the
//! same store, so they observe each other's writes.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::cache::broadcast::InvalidationBroadcaster;
use crate::cache::store::CacheStore;

// == Cache Pool ==
/// Holds one store per cache name and the broadcaster wired into all of
/// them.
///
/// [`CachePool::global`] is the process-wide default that unnamed (and
/// plainly named) facades bind to. Tests construct private pools to get
/// fully isolated stores and broadcasters.
#[derive(Debug, Default)]
pub struct CachePool {
    stores: DashMap<String, Arc<CacheStore>>,
    broadcaster: Arc<InvalidationBroadcaster>,
}

impl CachePool {
    // == Constructor ==
    /// Creates an empty pool with its own broadcaster.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default pool.
    pub fn global() -> &'static Arc<CachePool> {
        static GLOBAL: OnceLock<Arc<CachePool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(CachePool::new()))
    }

    // == Store Lookup ==
    /// Returns the store for `name`, creating it on first use.
    pub fn store(&self, name: &str) -> Arc<CacheStore> {
        self.stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CacheStore::new(name, self.broadcaster.clone())))
            .clone()
    }

    /// The broadcaster shared by every store of this pool.
    pub fn broadcaster(&self) -> &Arc<InvalidationBroadcaster> {
        &self.broadcaster
    }
}
