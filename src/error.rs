//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for all cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent from cache, or present but invalidated by a tag bump
    #[error("Key \"{0}\" is not found in cache")]
    NotFound(String),

    /// A caller-supplied argument violated the operation's contract
    #[error("Invalid argument `{param}`: {reason}")]
    InvalidArgument {
        /// Name of the offending parameter (`key`, `tag`, `tags`, `expirationTime`)
        param: &'static str,
        /// Human-readable description of the violation
        reason: String,
    },

    /// Stored value has a different underlying type than the one requested
    #[error("Value for key \"{key}\" is not of the requested type")]
    TypeMismatch {
        /// Key of the mismatching item
        key: String,
    },
}

impl CacheError {
    /// Builds a [`CacheError::InvalidArgument`] naming the offending parameter.
    pub fn invalid_argument(param: &'static str, reason: impl Into<String>) -> Self {
        CacheError::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }

    /// Name of the offending parameter for `InvalidArgument` errors, if any.
    ///
    /// Intended for diagnostic consumers that dispatch on the parameter name.
    pub fn param(&self) -> Option<&'static str> {
        match self {
            CacheError::InvalidArgument { param, .. } => Some(param),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
