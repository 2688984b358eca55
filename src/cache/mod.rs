//! Named caches: isolated key spaces over a shared store.
//!
//! A [`NamedCache`] is the get/set/remove/compute-if-absent API for one
//! namespace. It owns no connection: it pairs a [`CacheNamespace`] with the
//! `Arc<dyn Store>` every sibling namespace also holds, and qualifies each
//! key as `<namespace>:<key>` before it reaches the store.
//!
//! Every method completes its store round trip before returning. An `Ok`
//! from [`NamedCache::set`] means the value is visible to all later readers.
//!
//! ## Compute-if-absent
//!
//! [`NamedCache::get_or_else_update`] is a two-step protocol rather than a
//! transaction:
//!
//! 1. read the key; on a hit, return it without running the producer;
//! 2. on a miss, run the producer and attempt a conditional write
//!    (`SET NX`); if another caller won the write, read back and return the
//!    winner's value instead of our own.
//!
//! Concurrent misses may therefore run the producer more than once, but the
//! first stored value is never overwritten by a late computation, and every
//! caller returns the value that ended up in the store.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::codec::{self, CacheEntry, CacheValue};
use crate::connection::{Expiry, Store};
use crate::error::{CacheError, CacheResult};

mod registry;

pub use registry::{CacheRegistry, CacheRegistryBuilder, DEFAULT_NAMESPACE};

const KEY_SEPARATOR: char = ':';

/// One logical cache partition: a name and the TTL applied when a write
/// does not choose one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    name: String,
    default_expiry: Expiry,
}

impl CacheNamespace {
    /// Creates a namespace whose entries never expire by default.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidNamespace`] if `name` is empty or contains `:` or
    /// a glob character (`*?[]\`). Either would let two namespaces address
    /// the same qualified key.
    pub fn new(name: impl Into<String>) -> CacheResult<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.contains(KEY_SEPARATOR) {
            Some("name contains ':'")
        } else if name.contains(['*', '?', '[', ']', '\\']) {
            Some("name contains a glob character")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CacheError::InvalidNamespace { name, reason });
        }
        Ok(Self {
            name,
            default_expiry: Expiry::Never,
        })
    }

    #[must_use]
    pub fn with_default_expiry(mut self, expiry: Expiry) -> Self {
        self.default_expiry = expiry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_expiry(&self) -> Expiry {
        self.default_expiry
    }

    fn prefix(&self) -> String {
        format!("{}{KEY_SEPARATOR}", self.name)
    }
}

/// The cache API for one namespace.
///
/// Cheap to clone; clones share the namespace and the store.
///
/// ```
/// # use std::sync::Arc;
/// # use rttp_cache::cache::{CacheNamespace, NamedCache};
/// # use rttp_cache::connection::MemoryStore;
/// # #[tokio::main]
/// # async fn main() -> Result<(), rttp_cache::CacheError> {
/// let cache = NamedCache::new(CacheNamespace::new("users")?, Arc::new(MemoryStore::new()));
///
/// cache.set("42", &"ada".to_owned()).await?;
/// assert_eq!(cache.get::<String>("42").await?, Some("ada".to_owned()));
///
/// let n: i64 = cache.get_or_else_update("visits", || async { 1 }).await?;
/// assert_eq!(n, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NamedCache {
    namespace: Arc<CacheNamespace>,
    store: Arc<dyn Store>,
}

impl NamedCache {
    pub fn new(namespace: CacheNamespace, store: Arc<dyn Store>) -> Self {
        Self {
            namespace: Arc::new(namespace),
            store,
        }
    }

    pub fn name(&self) -> &str {
        self.namespace.name()
    }

    pub fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    /// The store shared with every other namespace built on it.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}{KEY_SEPARATOR}{key}", self.namespace.name)
    }

    /// Returns the value under `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Decode failures are returned, not treated as a miss. The entry is left
    /// in place.
    pub async fn get<T: CacheValue>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(raw) = self.store.get(&self.qualify(key)).await? else {
            debug!(namespace = self.name(), key, "cache miss");
            return Ok(None);
        };
        match codec::decode(&raw) {
            Ok(value) => {
                debug!(namespace = self.name(), key, "cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(namespace = self.name(), key, error = %e, "unreadable cache entry");
                Err(e)
            }
        }
    }

    /// Returns `true` if `key` holds a live entry.
    pub async fn contains(&self, key: &str) -> CacheResult<bool> {
        Ok(self.store.exists(&self.qualify(key)).await?)
    }

    /// Stores `value` under `key` with the namespace's default expiry.
    ///
    /// # Errors
    ///
    /// [`CacheError::Serialization`] if `value` cannot be encoded, or a
    /// connection error. Nothing is written in either case.
    pub async fn set<T: CacheValue>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.set_with_expiry(key, value, self.namespace.default_expiry)
            .await
    }

    /// Stores `value` under `key`, replacing any previous entry in this
    /// namespace only.
    pub async fn set_with_expiry<T: CacheValue>(
        &self,
        key: &str,
        value: &T,
        expiry: Expiry,
    ) -> CacheResult<()> {
        let raw = codec::encode(value)?;
        self.store.set(&self.qualify(key), raw, expiry).await?;
        debug!(namespace = self.name(), key, ?expiry, "cache set");
        Ok(())
    }

    /// Deletes `key`. Removing an absent key is not an error.
    pub async fn remove(&self, key: &str) -> CacheResult<()> {
        let removed = self.store.remove(&self.qualify(key)).await?;
        debug!(namespace = self.name(), key, removed, "cache remove");
        Ok(())
    }

    /// Deletes every key in this namespace and nothing else. Returns the
    /// number of entries removed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use rttp_cache::cache::{CacheNamespace, NamedCache};
    /// # use rttp_cache::connection::MemoryStore;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), rttp_cache::CacheError> {
    /// let store = Arc::new(MemoryStore::new());
    /// let tests = NamedCache::new(CacheNamespace::new("redis-test")?, store.clone());
    /// let results = NamedCache::new(CacheNamespace::new("redis-results")?, store);
    ///
    /// tests.set("k", &1i64).await?;
    /// results.set("k", &2i64).await?;
    ///
    /// assert_eq!(tests.clear().await?, 1);
    /// assert_eq!(results.get::<i64>("k").await?, Some(2));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn clear(&self) -> CacheResult<u64> {
        let removed = self.store.remove_prefix(&self.namespace.prefix()).await?;
        debug!(namespace = self.name(), removed, "cache cleared");
        Ok(removed)
    }

    /// Returns the stored value, or runs `producer`, stores its result with
    /// the namespace's default expiry, and returns it.
    ///
    /// See the [module docs](self) for the race semantics: `producer` may run
    /// more than once under concurrent misses, but all callers converge on
    /// the stored value.
    ///
    /// # Errors
    ///
    /// Any error from the initial read, including
    /// [`CacheError::TypeMismatch`] when `key` holds a different type. The
    /// producer does not run in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use rttp_cache::cache::{CacheNamespace, NamedCache};
    /// # use rttp_cache::connection::MemoryStore;
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), rttp_cache::CacheError> {
    /// let cache = NamedCache::new(CacheNamespace::new("reports")?, Arc::new(MemoryStore::new()));
    ///
    /// let first: String = cache.get_or_else_update("q3", || async { "built".to_owned() }).await?;
    /// let second: String = cache.get_or_else_update("q3", || async { "rebuilt".to_owned() }).await?;
    /// assert_eq!(first, second);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_else_update<T, F, Fut>(&self, key: &str, producer: F) -> CacheResult<T>
    where
        T: CacheValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.get_or_else_update_with_expiry(key, self.namespace.default_expiry, producer)
            .await
    }

    /// [`get_or_else_update`](Self::get_or_else_update) with an explicit expiry.
    pub async fn get_or_else_update_with_expiry<T, F, Fut>(
        &self,
        key: &str,
        expiry: Expiry,
        producer: F,
    ) -> CacheResult<T>
    where
        T: CacheValue,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.get_or_try_update(key, expiry, move || async move { Ok(producer().await) })
            .await
    }

    /// Compute-if-absent with a fallible producer.
    ///
    /// A producer error is returned unchanged and nothing is stored.
    ///
    /// # Errors
    ///
    /// The producer's error, or a [`CacheError`] converted into `E`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use rttp_cache::cache::{CacheNamespace, NamedCache};
    /// # use rttp_cache::connection::{Expiry, MemoryStore};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), rttp_cache::CacheError> {
    /// let cache = NamedCache::new(CacheNamespace::new("rates")?, Arc::new(MemoryStore::new()));
    ///
    /// let failed: Result<f64, Box<dyn std::error::Error>> = cache
    ///     .get_or_try_update("eur", Expiry::Never, || async { Err("feed down".into()) })
    ///     .await;
    /// assert!(failed.is_err());
    /// assert!(!cache.contains("eur").await?);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_try_update<T, E, F, Fut>(
        &self,
        key: &str,
        expiry: Expiry,
        producer: F,
    ) -> Result<T, E>
    where
        T: CacheValue,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await? {
            return Ok(hit);
        }

        let value = producer().await?;
        let raw = codec::encode(&value)?;
        let qualified = self.qualify(key);

        let written = self
            .store
            .set_if_absent(&qualified, raw, expiry)
            .await
            .map_err(CacheError::from)?;
        if written {
            debug!(namespace = self.name(), key, "computed value stored");
            return Ok(value);
        }

        // Another caller stored first; theirs is the value everyone sees.
        match self.get::<T>(key).await? {
            Some(winner) => {
                debug!(namespace = self.name(), key, "lost compute race, using stored value");
                Ok(winner)
            }
            None => {
                warn!(
                    namespace = self.name(),
                    key, "stored value vanished after lost compute race"
                );
                Ok(value)
            }
        }
    }

    /// Reads the raw entry under `key` for inspection.
    pub async fn entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let qualified = self.qualify(key);
        let Some(raw_value) = self.store.get(&qualified).await? else {
            return Ok(None);
        };
        let type_tag = codec::peek_tag(&raw_value)?;
        let expires_at = self
            .store
            .time_to_live(&qualified)
            .await?
            .and_then(|ttl| chrono::TimeDelta::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));

        Ok(Some(CacheEntry {
            key: key.to_owned(),
            raw_value,
            type_tag,
            expires_at,
        }))
    }
}
