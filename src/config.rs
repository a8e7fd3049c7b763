//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;

use crate::cache::DEFAULT_CACHE_NAME;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the cache instance to bind to
    pub cache_name: String,
    /// Default expiration time in seconds for items stored without an
    /// explicit one (0 = no expiration)
    pub default_expiration: i64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_NAME` - Name of the cache instance (default: "default")
    /// - `DEFAULT_EXPIRATION` - Default expiration in seconds (default: 0, no expiration)
    pub fn from_env() -> Self {
        Self {
            cache_name: env::var("CACHE_NAME")
                .ok()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_CACHE_NAME.to_string()),
            default_expiration: env::var("DEFAULT_EXPIRATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            default_expiration: 0,
        }
    }
}
