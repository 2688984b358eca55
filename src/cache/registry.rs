//! Lookup of named caches by name, all bound to one shared store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{CacheNamespace, NamedCache};
use crate::config::CacheConfig;
use crate::connection::{Expiry, MemoryStore, RedisStore, Store};
use crate::error::{CacheError, CacheResult};

/// Name used when a caller does not ask for a specific cache.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The set of named caches an application was wired with.
///
/// Every cache in a registry shares the same [`Store`], so a
/// [`flush_all`](Self::flush_all) clears all of them at once.
///
/// ```
/// # use rttp_cache::cache::CacheRegistry;
/// # #[tokio::main]
/// # async fn main() -> Result<(), rttp_cache::CacheError> {
/// let registry = CacheRegistry::in_memory();
/// registry.default_cache().set("k", &"v".to_owned()).await?;
/// assert!(registry.cache("nope").is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CacheRegistry {
    store: Arc<dyn Store>,
    caches: BTreeMap<String, NamedCache>,
    default_name: String,
    allow_flush_all: bool,
}

impl CacheRegistry {
    pub fn builder(store: Arc<dyn Store>) -> CacheRegistryBuilder {
        CacheRegistryBuilder {
            store,
            namespaces: Vec::new(),
            default_name: DEFAULT_NAMESPACE.to_owned(),
            allow_flush_all: false,
        }
    }

    /// A registry holding only the default cache, on a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let default = NamedCache::new(
            CacheNamespace {
                name: DEFAULT_NAMESPACE.to_owned(),
                default_expiry: Expiry::Never,
            },
            Arc::clone(&store),
        );
        Self {
            store,
            caches: BTreeMap::from([(DEFAULT_NAMESPACE.to_owned(), default)]),
            default_name: DEFAULT_NAMESPACE.to_owned(),
            allow_flush_all: false,
        }
    }

    /// Builds the registry described by `config`.
    ///
    /// Without a Redis URL every namespace lives in a [`MemoryStore`]. With
    /// one, the server is pinged once; if that fails and
    /// `fallback_to_memory` is set, the registry degrades to memory instead
    /// of failing.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Connection`]: Redis unreachable and fallback disabled,
    ///   or the URL is malformed.
    /// - [`CacheError::InvalidNamespace`]: a configured name is invalid or
    ///   repeated.
    pub async fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        let store = Self::store_for(config).await?;
        let default_expiry = Expiry::from_secs(config.default_ttl_secs);

        let mut builder = Self::builder(store)
            .default_name(&config.default_namespace)
            .allow_flush_all(config.allow_flush_all);

        if !config
            .namespaces
            .iter()
            .any(|ns| ns.name == config.default_namespace)
        {
            builder = builder.namespace(
                CacheNamespace::new(&config.default_namespace)?.with_default_expiry(default_expiry),
            );
        }
        for ns in &config.namespaces {
            let expiry = ns.ttl_secs.map_or(default_expiry, |secs| Expiry::from_secs(Some(secs)));
            builder = builder.namespace(CacheNamespace::new(&ns.name)?.with_default_expiry(expiry));
        }

        let registry = builder.build()?;
        info!(
            namespaces = ?registry.names().collect::<Vec<_>>(),
            default = %registry.default_name,
            "cache registry ready"
        );
        Ok(registry)
    }

    async fn store_for(config: &CacheConfig) -> CacheResult<Arc<dyn Store>> {
        let Some(settings) = config.redis_settings() else {
            info!("no redis url configured, using in-memory cache store");
            return Ok(Arc::new(MemoryStore::new()));
        };

        let store = RedisStore::connect(&settings)?;
        match store.ping().await {
            Ok(()) => {
                info!("connected to redis cache store");
                Ok(Arc::new(store))
            }
            Err(e) if config.fallback_to_memory => {
                warn!(error = %e, "redis unreachable, falling back to in-memory cache store");
                Ok(Arc::new(MemoryStore::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Looks up a cache by name.
    ///
    /// # Errors
    ///
    /// [`CacheError::NamespaceNotFound`] if nothing was bound under `name`.
    pub fn cache(&self, name: &str) -> CacheResult<NamedCache> {
        self.caches
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::NamespaceNotFound {
                name: name.to_owned(),
            })
    }

    /// The cache used when no name is given. Always present.
    pub fn default_cache(&self) -> NamedCache {
        // `build` guarantees the default is bound.
        self.caches
            .get(&self.default_name)
            .cloned()
            .unwrap_or_else(|| {
                NamedCache::new(
                    CacheNamespace {
                        name: self.default_name.clone(),
                        default_expiry: Expiry::Never,
                    },
                    Arc::clone(&self.store),
                )
            })
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Names of every bound cache, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Deletes every key of every namespace sharing this registry's store.
    ///
    /// Maintenance and test teardown only; never part of request handling.
    ///
    /// # Errors
    ///
    /// [`CacheError::FlushDenied`] unless the registry was built with
    /// [`allow_flush_all`](CacheRegistryBuilder::allow_flush_all).
    pub async fn flush_all(&self) -> CacheResult<()> {
        if !self.allow_flush_all {
            return Err(CacheError::FlushDenied);
        }
        warn!(namespaces = self.caches.len(), "flushing all cache namespaces");
        self.store.flush_all().await?;
        Ok(())
    }
}

/// Collects namespaces for a [`CacheRegistry`].
#[derive(Debug)]
pub struct CacheRegistryBuilder {
    store: Arc<dyn Store>,
    namespaces: Vec<CacheNamespace>,
    default_name: String,
    allow_flush_all: bool,
}

impl CacheRegistryBuilder {
    #[must_use]
    pub fn namespace(mut self, namespace: CacheNamespace) -> Self {
        self.namespaces.push(namespace);
        self
    }

    /// Which namespace [`CacheRegistry::default_cache`] returns.
    /// Defaults to [`DEFAULT_NAMESPACE`].
    #[must_use]
    pub fn default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    #[must_use]
    pub fn allow_flush_all(mut self, allow: bool) -> Self {
        self.allow_flush_all = allow;
        self
    }

    /// Binds every namespace to the shared store. The default namespace is
    /// added with no expiry if it was not registered explicitly.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidNamespace`] on a repeated name or an invalid
    /// default name.
    pub fn build(self) -> CacheResult<CacheRegistry> {
        let mut caches = BTreeMap::new();
        for namespace in self.namespaces {
            let name = namespace.name().to_owned();
            if caches.contains_key(&name) {
                return Err(CacheError::InvalidNamespace {
                    name,
                    reason: "bound more than once",
                });
            }
            caches.insert(name, NamedCache::new(namespace, Arc::clone(&self.store)));
        }

        if !caches.contains_key(&self.default_name) {
            let namespace = CacheNamespace::new(self.default_name.clone())?;
            caches.insert(
                self.default_name.clone(),
                NamedCache::new(namespace, Arc::clone(&self.store)),
            );
        }

        Ok(CacheRegistry {
            store: self.store,
            caches,
            default_name: self.default_name,
            allow_flush_all: self.allow_flush_all,
        })
    }
}
