//! Connection resource: the shared handle to the backing key-value store.
//!
//! Named caches never own a connection. They hold an `Arc<dyn Store>` that
//! is shared by every namespace bound to the same backend, and each store
//! call acquires whatever it needs for exactly one round trip.
//!
//! ## Backends
//!
//! - [`RedisStore`]: Redis over a [`deadpool_redis`] pool ([`ConnectionResource`]).
//! - [`MemoryStore`]: in-process map used when no Redis is configured or
//!   reachable, and in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod remote;

pub use memory::MemoryStore;
pub use remote::{ConnectionResource, RedisSettings, RedisStore};

/// Failures talking to the backing store.
///
/// Always surfaced to the caller; nothing in this crate retries.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid redis configuration: {0}")]
    Configuration(#[from] deadpool_redis::CreatePoolError),

    #[error("could not acquire a pooled connection: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis command failed: {0}")]
    Command(#[from] redis::RedisError),
}

/// How long a written entry stays in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Kept until removed or evicted by the store.
    #[default]
    Never,
    /// Dropped by the store once the duration has elapsed.
    After(Duration),
}

impl Expiry {
    /// `None` maps to [`Expiry::Never`].
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(secs) => Self::After(Duration::from_secs(secs)),
            None => Self::Never,
        }
    }

    /// Returns the time to live, if any.
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::After(ttl) => Some(ttl),
        }
    }

    // Redis rejects a zero PX, so sub-millisecond TTLs round up to 1 ms.
    fn as_millis(self) -> Option<u64> {
        self.duration()
            .map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
    }
}

/// The operations the cache core needs from a key-value backend.
///
/// Keys reaching a store are already namespace-qualified. Implementations
/// must be safe to call concurrently and must never share one underlying
/// connection between two in-flight calls.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    /// Returns the stored bytes, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ConnectionError>;

    /// Writes `value`, replacing any previous entry and its TTL.
    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> Result<(), ConnectionError>;

    /// Writes `value` only if `key` holds nothing. Returns `true` if written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> Result<bool, ConnectionError>;

    /// Deletes `key`. Returns `true` if something was deleted.
    async fn remove(&self, key: &str) -> Result<bool, ConnectionError>;

    /// Returns `true` if `key` holds a live entry.
    async fn exists(&self, key: &str) -> Result<bool, ConnectionError>;

    /// Remaining lifetime of `key`; `None` if absent or without a TTL.
    async fn time_to_live(&self, key: &str) -> Result<Option<Duration>, ConnectionError>;

    /// Deletes every key starting with `prefix`. Returns how many were deleted.
    async fn remove_prefix(&self, prefix: &str) -> Result<u64, ConnectionError>;

    /// Deletes every key in the store, across all namespaces.
    async fn flush_all(&self) -> Result<(), ConnectionError>;

    /// Round trip that succeeds only if the store is reachable.
    async fn ping(&self) -> Result<(), ConnectionError>;
}
