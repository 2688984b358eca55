//! Crate-wide error type.
//!
//! Every failure is reported to the immediate caller as a typed [`CacheError`].
//! None of them is ever converted into a cache miss: a decode failure on a
//! stored entry is surfaced so that corruption is not silently papered over.

use thiserror::Error;

use crate::config::ConfigError;
use crate::connection::ConnectionError;

/// Errors produced by cache operations, the registry, and the response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Connection(#[from] ConnectionError),

    #[error("failed to encode value of type `{type_tag}`: {reason}")]
    Serialization { type_tag: String, reason: String },

    #[error("stored entry is not a valid `{type_tag}`: {reason}")]
    Deserialization { type_tag: String, reason: String },

    #[error("type mismatch: requested `{expected}` but entry holds `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("no cache bound to namespace `{name}`")]
    NamespaceNotFound { name: String },

    #[error("invalid namespace `{name}`: {reason}")]
    InvalidNamespace { name: String, reason: &'static str },

    #[error("flush_all is disabled for this registry")]
    FlushDenied,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Returns `true` for failures talking to the remote store.
    ///
    /// Callers that want to retry should only do so for these.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// Shorthand for results carrying a [`CacheError`].
pub type CacheResult<T> = Result<T, CacheError>;
