//! # rttp-cache
//!
//! Named caches over Redis (or process memory) and an HTTP response cache
//! for the rttp middleware pipeline.
//!
//! ## Layers
//!
//! - [`connection`]: the [`Store`] trait with a pooled [`RedisStore`] and an
//!   in-process [`MemoryStore`].
//! - [`codec`]: [`CacheValue`] and the tagged byte format every value is
//!   stored in.
//! - [`cache`]: [`NamedCache`] namespaces sharing one store, looked up through
//!   a [`CacheRegistry`].
//! - [`response_cache`]: [`ResponseCache`], which replays a handler's first
//!   response with a stable `ETag` and `Expires`.
//! - [`http`] and [`middleware`]: the request/response types and pipeline the
//!   response cache plugs into.
//! - [`config`]: [`CacheConfig`] from JSON or `RTTP_CACHE_*` variables.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttp_cache::{CacheConfig, CacheRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = CacheRegistry::from_config(&CacheConfig::from_env()?).await?;
//!     let results = registry.cache("redis-results")?;
//!
//!     results.set("answer", &42i64).await?;
//!     let answer: i64 = results
//!         .get_or_else_update("answer", || async { 0 })
//!         .await?;
//!     assert_eq!(answer, 42);
//!     Ok(())
//! }
//! ```

// ── Cache core ────────────────────────────────────────────────────────────────
pub mod cache;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;

// ── HTTP integration ──────────────────────────────────────────────────────────
pub mod http;
pub mod middleware;
pub mod response_cache;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheNamespace, CacheRegistry, NamedCache};
pub use codec::{CacheEntry, CacheValue, TypeTag};
pub use config::{CacheConfig, NamespaceConfig};
pub use connection::{Expiry, MemoryStore, RedisStore, Store};
pub use error::{CacheError, CacheResult};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use response_cache::{Cached, ResponseCache, ResponseEnvelope};
