//! Cache Service Module
//!
//! The public facade over one named cache: orchestrates the store, the tag
//! registry and the invalidation broadcaster, and implements the
//! lazy-validation read path.
//!
//! Reads consult the store, then check the entry's tag snapshot against
//! the registry; anything found stale is removed on the spot and reported
//! as absent. Writes resolve a fresh snapshot and register broadcast
//! subscriptions so a later tag invalidation (or cache clear) can evict
//! the entry without waiting for a reader.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{
    CacheEntry, CachePool, CacheStats, CacheStore, CachedValue, InvalidationBroadcaster,
    TagRegistry, DEFAULT_CACHE_NAME, MAX_KEY_LENGTH, TAG_KEY_PREFIX,
};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Cache Service ==
/// Facade over one named cache.
///
/// Instances constructed with the same name (against the same pool) share
/// one store and tag registry, so they observe each other's writes. The
/// default expiration time is per-facade.
#[derive(Debug)]
pub struct CacheService {
    name: String,
    store: Arc<CacheStore>,
    registry: TagRegistry,
    broadcaster: Arc<InvalidationBroadcaster>,
    default_expiration: AtomicI64,
}

impl CacheService {
    // == Constructors ==
    /// Binds to the process-wide default cache with no default expiration.
    pub fn new() -> Self {
        Self::named(DEFAULT_CACHE_NAME)
    }

    /// Binds to the named cache with no default expiration. An empty name
    /// binds to the default cache.
    pub fn named(name: &str) -> Self {
        Self::named_with_expiration(name, 0)
    }

    /// Binds to the named cache with a default expiration time in seconds
    /// for items stored without an explicit one (0 = no expiration).
    pub fn named_with_expiration(name: &str, default_expiration: i64) -> Self {
        Self::with_pool(name, default_expiration, CachePool::global())
    }

    /// Builds a service from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::named_with_expiration(&config.cache_name, config.default_expiration)
    }

    /// Binds to a named cache inside an explicit pool. Intended for tests
    /// that need isolated stores and broadcasters.
    pub fn with_pool(name: &str, default_expiration: i64, pool: &Arc<CachePool>) -> Self {
        let name = if name.is_empty() {
            DEFAULT_CACHE_NAME
        } else {
            name
        };
        let store = pool.store(name);

        Self {
            name: name.to_string(),
            registry: TagRegistry::new(store.clone()),
            store,
            broadcaster: pool.broadcaster().clone(),
            default_expiration: AtomicI64::new(default_expiration),
        }
    }

    // == Identity ==
    /// Name of the cache this service is bound to.
    pub fn cache_name(&self) -> &str {
        &self.name
    }

    /// Default expiration time in seconds (0 = no expiration).
    pub fn default_expiration(&self) -> i64 {
        self.default_expiration.load(Ordering::Relaxed)
    }

    /// Changes the default expiration time for subsequent writes.
    pub fn set_default_expiration(&self, seconds: i64) {
        self.default_expiration.store(seconds, Ordering::Relaxed);
    }

    // == Set ==
    /// Stores `value` under `key` with the default expiration and no tags,
    /// replacing any existing item.
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T) -> Result<bool> {
        self.set_entry(key, value, self.default_expiration(), &[])
    }

    /// Stores `value` under `key` with the default expiration and the given
    /// tags.
    pub fn set_tagged<T: Send + Sync + 'static>(
        &self,
        key: &str,
        value: T,
        tags: &[&str],
    ) -> Result<bool> {
        self.set_entry(key, value, self.default_expiration(), tags)
    }

    /// Stores `value` under `key` with an explicit expiration time in
    /// seconds (0 = no expiration) and no tags.
    pub fn set_expiring<T: Send + Sync + 'static>(
        &self,
        key: &str,
        value: T,
        expiration: i64,
    ) -> Result<bool> {
        self.set_entry(key, value, expiration, &[])
    }

    /// Stores `value` under `key` with an explicit expiration time and
    /// tags, replacing any existing item (whose subscriptions are released
    /// as a side effect of replacement).
    ///
    /// # Errors
    /// `InvalidArgument` for an empty/over-long/reserved key, a negative
    /// expiration time, or an empty tag name. Checked before any mutation.
    pub fn set_entry<T: Send + Sync + 'static>(
        &self,
        key: &str,
        value: T,
        expiration: i64,
        tags: &[&str],
    ) -> Result<bool> {
        self.set_value(key, Arc::new(value), expiration, tags)
    }

    fn set_value(
        &self,
        key: &str,
        value: CachedValue,
        expiration: i64,
        tags: &[&str],
    ) -> Result<bool> {
        validate_key(key)?;
        validate_expiration(expiration)?;
        validate_tags(tags)?;

        let snapshot = self.registry.snapshot(tags);
        let mut entry = CacheEntry::new(key, value, snapshot, expiration as u64);

        // Untagged entries listen on the clear channel; tagged entries get
        // one subscription per tag.
        entry.subscriptions = if entry.tags.is_empty() {
            vec![self
                .broadcaster
                .subscribe(&self.name, None, entry.id, key, &self.store)]
        } else {
            entry
                .tags
                .keys()
                .map(|tag| {
                    self.broadcaster
                        .subscribe(&self.name, Some(tag), entry.id, key, &self.store)
                })
                .collect()
        };

        self.store.set(entry);
        Ok(true)
    }

    // == Get ==
    /// Retrieves the item under `key`, downcast to `T`.
    ///
    /// # Errors
    /// - `InvalidArgument` for an empty or reserved key
    /// - `NotFound` if the key is absent, expired, or invalidated by a tag
    ///   bump (a stale item is removed as a side effect)
    /// - `TypeMismatch` if the stored value is not a `T`
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>> {
        let value = self.get_raw(key)?;
        value
            .downcast::<T>()
            .map_err(|_| CacheError::TypeMismatch {
                key: key.to_string(),
            })
    }

    /// Retrieves the item under `key` as a type-erased handle.
    pub fn get_raw(&self, key: &str) -> Result<CachedValue> {
        validate_key(key)?;
        Ok(self.live_entry(key)?.value)
    }

    /// Retrieves all valid items carrying `tag`, downcast to `T`.
    pub fn get_by_tag<T: Send + Sync + 'static>(&self, tag: &str) -> Result<Vec<Arc<T>>> {
        self.get_by_tags(&[tag])
    }

    /// Retrieves all valid items whose tag set intersects `tags`, downcast
    /// to `T`. Order is unspecified.
    ///
    /// Scans the store; stale items found along the way are removed. An
    /// empty `tags` slice yields an empty result.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty tag name; `TypeMismatch` if any
    /// matching value is not a `T`.
    pub fn get_by_tags<T: Send + Sync + 'static>(&self, tags: &[&str]) -> Result<Vec<Arc<T>>> {
        self.live_entries_by_tags(tags)?
            .into_iter()
            .map(|entry| {
                entry
                    .value
                    .clone()
                    .downcast::<T>()
                    .map_err(|_| CacheError::TypeMismatch {
                        key: entry.key.clone(),
                    })
            })
            .collect()
    }

    /// Untyped variant of [`CacheService::get_by_tag`].
    pub fn get_raw_by_tag(&self, tag: &str) -> Result<Vec<CachedValue>> {
        self.get_raw_by_tags(&[tag])
    }

    /// Untyped variant of [`CacheService::get_by_tags`].
    pub fn get_raw_by_tags(&self, tags: &[&str]) -> Result<Vec<CachedValue>> {
        Ok(self
            .live_entries_by_tags(tags)?
            .into_iter()
            .map(|entry| entry.value)
            .collect())
    }

    // == Try Get ==
    /// Non-raising variant of [`CacheService::get`]: None on any failure.
    pub fn try_get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).ok()
    }

    /// Non-raising variant of [`CacheService::get_raw`].
    pub fn try_get_raw(&self, key: &str) -> Option<CachedValue> {
        self.get_raw(key).ok()
    }

    /// Non-raising variant of [`CacheService::get_by_tag`]. `None` signals
    /// a failure; a successful lookup with no matches is `Some(vec![])`.
    pub fn try_get_by_tag<T: Send + Sync + 'static>(&self, tag: &str) -> Option<Vec<Arc<T>>> {
        self.get_by_tag(tag).ok()
    }

    /// Non-raising variant of [`CacheService::get_by_tags`].
    pub fn try_get_by_tags<T: Send + Sync + 'static>(&self, tags: &[&str]) -> Option<Vec<Arc<T>>> {
        self.get_by_tags(tags).ok()
    }

    // == Tags For Item ==
    /// Returns the tags of the valid item under `key`.
    ///
    /// # Errors
    /// `InvalidArgument` / `NotFound` as for [`CacheService::get`].
    pub fn get_tags_for_item(&self, key: &str) -> Result<Vec<String>> {
        validate_key(key)?;
        let entry = self.live_entry(key)?;
        Ok(entry.tags.keys().cloned().collect())
    }

    // == Update ==
    /// Replaces the item under `key`, merging the previous valid tag set
    /// (if any) with `additional_tags`.
    ///
    /// If the previous entry is absent or has been invalidated, only
    /// `additional_tags` apply.
    pub fn update<T: Send + Sync + 'static>(
        &self,
        key: &str,
        value: T,
        expiration: i64,
        additional_tags: &[&str],
    ) -> Result<bool> {
        validate_key(key)?;
        validate_expiration(expiration)?;
        validate_tags(additional_tags)?;

        let mut merged = self.get_tags_for_item(key).unwrap_or_default();
        merged.extend(additional_tags.iter().map(|tag| tag.to_string()));
        let merged_refs: Vec<&str> = merged.iter().map(String::as_str).collect();

        self.set_value(key, Arc::new(value), expiration, &merged_refs)
    }

    // == Delete ==
    /// Removes the item under `key`, returning whether anything was
    /// removed. Never raises; an empty or reserved key removes nothing.
    pub fn delete(&self, key: &str) -> bool {
        if key.is_empty() || key.starts_with(TAG_KEY_PREFIX) {
            return false;
        }
        self.store.remove(key)
    }

    /// Invalidates every item carrying `tag` by advancing the tag to a new
    /// epoch, then proactively evicts the tag's subscribers.
    ///
    /// Returns true iff the tag had ever been seen by this cache; bumping
    /// a seen tag with zero live members still counts.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty tag.
    pub fn delete_by_tag(&self, tag: &str) -> Result<bool> {
        if tag.is_empty() {
            return Err(CacheError::invalid_argument("tag", "tag can't be empty"));
        }
        if self.registry.current_version(tag).is_none() {
            return Ok(false);
        }

        let version = self.registry.bump(tag);
        let evicted = self.broadcaster.signal_tag(&self.name, tag);
        debug!(
            "invalidated tag \"{}\" in cache \"{}\" (epoch {}, {} entries evicted proactively)",
            tag, self.name, version, evicted
        );
        Ok(true)
    }

    /// Invalidates every listed tag; true iff at least one of them had
    /// been seen.
    pub fn delete_by_tags(&self, tags: &[&str]) -> Result<bool> {
        if tags.iter().any(|tag| tag.is_empty()) {
            return Err(CacheError::invalid_argument(
                "tags",
                "tag names can't be empty",
            ));
        }

        let mut any_seen = false;
        for tag in tags {
            if self.delete_by_tag(tag)? {
                any_seen = true;
            }
        }
        Ok(any_seen)
    }

    // == Clear ==
    /// Evicts every item of this cache through the broadcaster.
    ///
    /// Tag versions are not reset: they keep incrementing across clears,
    /// so the tag bookkeeping entries (and the tag count) survive.
    pub fn clear(&self) {
        let evicted = self.broadcaster.signal_clear(&self.name);
        info!("cleared cache \"{}\" ({} entries evicted)", self.name, evicted);
    }

    // == Trim ==
    /// Explicit sweep: removes expired items plus up to `percent`% of the
    /// cache's items. Returns the number removed.
    pub fn trim(&self, percent: u32) -> usize {
        self.store.trim(percent)
    }

    // == Exists ==
    /// Whether a valid item exists under `key`. Never raises; an empty or
    /// reserved key reports false.
    pub fn exists(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.live_entry(key).is_ok()
    }

    /// Whether at least one valid item carries `tag`. Never raises; an
    /// empty tag reports false. Stale items found during the check are
    /// removed.
    pub fn exists_by_tag(&self, tag: &str) -> bool {
        if tag.is_empty() {
            return false;
        }
        self.live_entries_by_tags(&[tag])
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    // == Counts ==
    /// Total number of cached items. Tag bookkeeping entries live in the
    /// same store, so they are included.
    pub fn get_count(&self) -> usize {
        self.store.len()
    }

    /// Number of tags ever used with this cache.
    pub fn get_tags_count(&self) -> usize {
        self.registry.tags_count()
    }

    /// Access statistics for the underlying store.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    // == Internals ==
    /// Presence, expiry and tag-validity in one step; the lazy-validation
    /// read path. A stale entry is removed (guarded by its id) and
    /// reported as absent.
    fn live_entry(&self, key: &str) -> Result<CacheEntry> {
        let entry = self
            .store
            .get(key)
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;

        if !self.registry.is_entry_valid(&entry) {
            self.store.remove_invalidated(key, entry.id);
            return Err(CacheError::NotFound(key.to_string()));
        }

        Ok(entry)
    }

    /// Scan-based lookup shared by the tag accessors: partitions matching
    /// entries into valid and stale, removes the stale ones, returns the
    /// valid ones.
    fn live_entries_by_tags(&self, tags: &[&str]) -> Result<Vec<CacheEntry>> {
        validate_tags(tags)?;
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let mut live = Vec::new();
        for entry in self.store.scan() {
            if !entry.tags.keys().any(|tag| tags.contains(&tag.as_str())) {
                continue;
            }
            if self.registry.is_entry_valid(&entry) {
                live.push(entry);
            } else {
                self.store.remove_invalidated(&entry.key, entry.id);
            }
        }
        Ok(live)
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}

// == Validation ==

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::invalid_argument("key", "key can't be empty"));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::invalid_argument(
            "key",
            format!("key exceeds maximum length of {} bytes", MAX_KEY_LENGTH),
        ));
    }
    if key.starts_with(TAG_KEY_PREFIX) {
        return Err(CacheError::invalid_argument(
            "key",
            format!("keys can't use the reserved prefix \"{}\"", TAG_KEY_PREFIX),
        ));
    }
    Ok(())
}

fn validate_expiration(expiration: i64) -> Result<()> {
    if expiration < 0 {
        return Err(CacheError::invalid_argument(
            "expirationTime",
            "expiration time can't be negative",
        ));
    }
    Ok(())
}

fn validate_tags(tags: &[&str]) -> Result<()> {
    if tags.iter().any(|tag| tag.is_empty()) {
        return Err(CacheError::invalid_argument(
            "tags",
            "tag names can't be empty",
        ));
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn isolated(name: &str) -> CacheService {
        CacheService::with_pool(name, 0, &Arc::new(CachePool::new()))
    }

    #[test]
    fn test_unnamed_service_binds_default_cache() {
        let service = isolated("");
        assert_eq!(service.cache_name(), DEFAULT_CACHE_NAME);
    }

    #[test]
    fn test_default_expiration_is_adjustable() {
        let service = isolated("svc");
        assert_eq!(service.default_expiration(), 0);

        service.set_default_expiration(30);
        assert_eq!(service.default_expiration(), 30);
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            cache_name: "configured".to_string(),
            default_expiration: 15,
        };
        let service = CacheService::from_config(&config);

        assert_eq!(service.cache_name(), "configured");
        assert_eq!(service.default_expiration(), 15);
    }

    #[test]
    fn test_reserved_prefix_keys_are_rejected() {
        let service = isolated("svc");

        let err = service.set("_tags/users", 1u32).unwrap_err();
        assert_eq!(err.param(), Some("key"));
        assert!(!service.exists("_tags/users"));
        assert!(!service.delete("_tags/users"));
    }

    #[test]
    fn test_overlong_key_is_rejected() {
        let service = isolated("svc");
        let key = "x".repeat(MAX_KEY_LENGTH + 1);

        let err = service.set(&key, 1u32).unwrap_err();
        assert_eq!(err.param(), Some("key"));
    }
}
