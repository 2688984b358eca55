//! HTTP response caching on top of a [`NamedCache`].
//!
//! [`ResponseCache`] derives a key from each request and asks its cache for
//! the [`ResponseEnvelope`] under that key. On a miss the wrapped handler
//! runs once and its response is captured with a freshly computed `ETag`
//! and `Expires`; on every later hit the stored envelope is replayed as is,
//! so those headers stay byte-identical until the entry expires or is
//! invalidated.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use rttp_cache::cache::CacheRegistry;
//! use rttp_cache::http::{Method, Request, Response, StatusCode};
//! use rttp_cache::response_cache::ResponseCache;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let registry = CacheRegistry::in_memory();
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counter = calls.clone();
//!
//! let report = ResponseCache::new(registry.default_cache()).wrap(move |_req: Request| {
//!     let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
//!     async move { Response::new(StatusCode::Ok).text(format!("build #{n}")) }
//! });
//!
//! let first = report.handle(Request::new(Method::Get, "/report")).await.unwrap();
//! let again = report.handle(Request::new(Method::Get, "/report")).await.unwrap();
//! assert_eq!(first, again);
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::cache::NamedCache;
use crate::connection::Expiry;
use crate::error::{CacheError, CacheResult};
use crate::http::{Request, Response, StatusCode, header};
use crate::middleware::{BoxFuture, Middleware, Next};

mod envelope;

pub use envelope::{ResponseEnvelope, entity_tag, http_date};

/// Lifetime of a cached response unless [`ResponseCache::ttl`] says otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Maps a request to its cache key.
pub type KeyFn = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Source of the time stamped into `Expires`.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Caches whole responses in one namespace.
///
/// Cheap to clone; clones share the namespace and the configuration.
///
/// # Examples
///
/// A per-user report, cached for five minutes, that only keeps successful
/// responses:
///
/// ```
/// use std::time::Duration;
/// use rttp_cache::cache::CacheRegistry;
/// use rttp_cache::http::{Method, Request, Response, StatusCode};
/// use rttp_cache::response_cache::ResponseCache;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let registry = CacheRegistry::in_memory();
/// let reports = ResponseCache::new(registry.default_cache())
///     .ttl(Duration::from_secs(300))
///     .key_with(|req: &Request| format!("report:{}", req.query_param("user").unwrap_or_default()))
///     .only_status([StatusCode::Ok]);
///
/// assert_eq!(reports.derive_key(&Request::new(Method::Get, "/r?user=ada")), "report:ada");
///
/// let cached = reports.wrap(|_req: Request| async { Response::new(StatusCode::Ok).text("rows") });
/// let response = cached.handle(Request::new(Method::Get, "/r?user=ada")).await.unwrap();
/// assert!(response.headers().contains("expires"));
/// # });
/// ```
#[derive(Clone)]
pub struct ResponseCache {
    cache: NamedCache,
    ttl: Duration,
    key: KeyFn,
    clock: Arc<dyn Clock>,
    statuses: Option<Arc<[StatusCode]>>,
}

// Why a miss did not produce an envelope.
enum Miss<E> {
    Failed(E),
    Uncacheable(Response),
}

impl<E: From<CacheError>> From<CacheError> for Miss<E> {
    fn from(err: CacheError) -> Self {
        Self::Failed(E::from(err))
    }
}

impl ResponseCache {
    /// Caches every response for [`DEFAULT_TTL`] under `"<METHOD> <path>"`.
    pub fn new(cache: NamedCache) -> Self {
        Self {
            cache,
            ttl: DEFAULT_TTL,
            key: Arc::new(|request: &Request| format!("{} {}", request.method(), request.path())),
            clock: Arc::new(SystemClock),
            statuses: None,
        }
    }

    /// Entry lifetime, also used for `Expires`.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Stores every request under one fixed key.
    #[must_use]
    pub fn key(self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.key_with(move |_| key.clone())
    }

    /// Derives the key with `discriminator` instead of method and path.
    #[must_use]
    pub fn key_with<F>(mut self, discriminator: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        self.key = Arc::new(discriminator);
        self
    }

    /// Only store responses with one of these statuses. Others are returned
    /// to the caller without touching the cache.
    #[must_use]
    pub fn only_status(mut self, statuses: impl IntoIterator<Item = StatusCode>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn named_cache(&self) -> &NamedCache {
        &self.cache
    }

    pub fn derive_key(&self, request: &Request) -> String {
        (self.key)(request)
    }

    /// Serves `request` from the cache, running `handler` on a miss.
    ///
    /// # Errors
    ///
    /// Any [`CacheError`] from the underlying namespace, unchanged. A key
    /// that holds something other than a [`ResponseEnvelope`] surfaces as
    /// [`CacheError::TypeMismatch`].
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_cache::cache::CacheRegistry;
    /// use rttp_cache::http::{Method, Request, Response, StatusCode};
    /// use rttp_cache::response_cache::ResponseCache;
    ///
    /// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
    /// let cache = ResponseCache::new(CacheRegistry::in_memory().default_cache());
    /// let request = Request::new(Method::Get, "/status");
    ///
    /// let response = cache
    ///     .respond(request, |_req| async { Response::new(StatusCode::Ok).text("up") })
    ///     .await
    ///     .unwrap();
    /// assert!(response.headers().contains("etag"));
    /// # });
    /// ```
    pub async fn respond<F, Fut>(&self, request: Request, handler: F) -> CacheResult<Response>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        self.try_respond(request, move |request| {
            let response = handler(request);
            async move { Ok::<_, CacheError>(response.await) }
        })
        .await
    }

    /// Like [`respond`](Self::respond), for a handler that can fail.
    ///
    /// A handler error is returned as is and nothing is stored, so the next
    /// request for the same key runs the handler again.
    ///
    /// # Errors
    ///
    /// The handler's own error, or a [`CacheError`] converted into `E`.
    pub async fn try_respond<F, Fut, E>(&self, request: Request, handler: F) -> Result<Response, E>
    where
        F: FnOnce(Request) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: From<CacheError>,
    {
        let derived = self.derive_key(&request);
        let key = derived.as_str();
        let validator = if request.method().is_safe() {
            request.headers().get(header::IF_NONE_MATCH).map(str::to_owned)
        } else {
            None
        };

        let produced: Result<ResponseEnvelope, Miss<E>> = self
            .cache
            .get_or_try_update(key, Expiry::After(self.ttl), move || async move {
                let response = match handler(request).await {
                    Ok(response) => response,
                    Err(err) => return Err(Miss::Failed(err)),
                };
                if !self.stores(response.status()) {
                    return Err(Miss::Uncacheable(response));
                }
                let envelope = ResponseEnvelope::capture(response, self.ttl, self.clock.now());
                debug!(
                    namespace = self.cache.name(),
                    key,
                    status = envelope.status(),
                    etag = envelope.etag(),
                    "response captured"
                );
                Ok(envelope)
            })
            .await;

        let envelope = match produced {
            Ok(envelope) => envelope,
            Err(Miss::Uncacheable(response)) => {
                debug!(
                    namespace = self.cache.name(),
                    key,
                    status = response.status().as_u16(),
                    "response not cached"
                );
                return Ok(response);
            }
            Err(Miss::Failed(err)) => {
                debug!(namespace = self.cache.name(), key, "miss failed, nothing stored");
                return Err(err);
            }
        };

        match validator {
            Some(tags) if envelope.matches(&tags) => Ok(envelope.not_modified()),
            _ => envelope.to_response().map_err(E::from),
        }
    }

    /// Drops the cached response for `request`, if any.
    pub async fn invalidate(&self, request: &Request) -> CacheResult<()> {
        self.invalidate_key(&self.derive_key(request)).await
    }

    pub async fn invalidate_key(&self, key: &str) -> CacheResult<()> {
        self.cache.remove(key).await
    }

    /// Binds this cache to `handler`.
    pub fn wrap<H>(self, handler: H) -> Cached<H> {
        Cached {
            cache: self,
            handler,
        }
    }

    fn stores(&self, status: StatusCode) -> bool {
        self.statuses
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&status))
    }
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("namespace", &self.cache.name())
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .field("statuses", &self.statuses)
            .finish_non_exhaustive()
    }
}

impl Middleware for ResponseCache {
    fn handle(&self, request: Request, next: Next) -> BoxFuture<Response> {
        let cache = self.clone();
        Box::pin(async move {
            let path = request.path().to_owned();
            match cache.respond(request, |request| next.run(request)).await {
                Ok(response) => response,
                Err(err) => {
                    error!(namespace = cache.cache.name(), path = %path, error = %err, "response cache failed");
                    Response::new(StatusCode::InternalServerError).text("Internal Server Error")
                }
            }
        })
    }
}

/// A handler with a [`ResponseCache`] in front of it.
pub struct Cached<H> {
    cache: ResponseCache,
    handler: H,
}

impl<H, Fut> Cached<H>
where
    H: Fn(Request) -> Fut,
    Fut: Future<Output = Response>,
{
    /// Runs the request through the cache and, on a miss, the handler.
    ///
    /// # Errors
    ///
    /// See [`ResponseCache::respond`].
    pub async fn handle(&self, request: Request) -> CacheResult<Response> {
        self.cache
            .respond(request, |request| (self.handler)(request))
            .await
    }
}

impl<H> Cached<H> {
    /// Like [`handle`](Self::handle), for a handler returning `Result`.
    ///
    /// # Errors
    ///
    /// The handler's error, unchanged and not cached, or a [`CacheError`]
    /// converted into `E`.
    pub async fn try_handle<Fut, E>(&self, request: Request) -> Result<Response, E>
    where
        H: Fn(Request) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: From<CacheError>,
    {
        self.cache
            .try_respond(request, |request| (self.handler)(request))
            .await
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.cache
    }
}

impl<H> fmt::Debug for Cached<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cached")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::cache::CacheRegistry;
    use crate::http::Method;
    use crate::middleware::{from_handler, from_middleware};

    #[derive(Debug)]
    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn starting_at(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += TimeDelta::seconds(secs);
        }
    }

    impl Clock for Arc<ManualClock> {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn rfc_example() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap()
    }

    fn get(path: &str) -> Request {
        Request::new(Method::Get, path)
    }

    fn counting_handler(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn(Request) -> std::future::Ready<Response> + use<> {
        let calls = calls.clone();
        move |request: Request| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(
                Response::new(StatusCode::Ok)
                    .header("X-Path", request.path())
                    .text(format!("computed {n}")),
            )
        }
    }

    #[tokio::test]
    async fn handler_runs_once_and_replays_are_identical() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let registry = CacheRegistry::in_memory();
        let clock = ManualClock::starting_at(rfc_example());
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache())
            .clock(clock.clone())
            .wrap(counting_handler(&calls));

        let mut wires = Vec::new();
        for _ in 0..3 {
            let response = cached.handle(get("/report")).await.unwrap();
            assert_eq!(response.headers().get("expires"), Some("Sun, 06 Nov 1994 09:49:37 GMT"));
            wires.push(response.into_bytes());
            clock.advance(90);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(wires.windows(2).all(|pair| pair[0] == pair[1]));
        let text = String::from_utf8(wires[0].to_vec()).unwrap();
        assert!(text.contains(&format!("ETag: {}\r\n", entity_tag(b"computed 1"))));
        assert!(text.ends_with("computed 1"));
    }

    #[tokio::test]
    async fn discriminators_give_independent_entries() {
        let registry = CacheRegistry::in_memory();
        let results = registry.default_cache();
        let calls = Arc::new(AtomicUsize::new(0));

        let by_user = ResponseCache::new(results.clone())
            .key_with(|req: &Request| format!("report-{}", req.query_param("user").unwrap_or_default()))
            .wrap(counting_handler(&calls));

        let alice = by_user.handle(get("/report?user=alice")).await.unwrap();
        let bob = by_user.handle(get("/report?user=bob")).await.unwrap();
        by_user.handle(get("/report?user=alice&page=2")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(alice.body(), bob.body());

        let stored_alice = results.get::<ResponseEnvelope>("report-alice").await.unwrap().unwrap();
        assert_eq!(stored_alice.body(), alice.body().as_ref());

        results.remove("report-bob").await.unwrap();
        assert!(results.get::<ResponseEnvelope>("report-bob").await.unwrap().is_none());
        assert!(results.contains("report-alice").await.unwrap());

        // Writing an envelope directly makes it what the decorator serves.
        results.set("report-bob", &stored_alice).await.unwrap();
        let replayed = by_user.handle(get("/report?user=bob")).await.unwrap();
        assert_eq!(replayed, alice);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn default_key_is_method_and_path() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache()).wrap(counting_handler(&calls));

        assert_eq!(cached.response_cache().derive_key(&get("/a?x=1")), "GET /a");

        cached.handle(get("/a?x=1")).await.unwrap();
        cached.handle(get("/a?x=2")).await.unwrap();
        cached.handle(Request::new(Method::Head, "/a")).await.unwrap();
        cached.handle(get("/b")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fixed_key_shares_one_entry() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache())
            .key("home")
            .wrap(counting_handler(&calls));

        let first = cached.handle(get("/one")).await.unwrap();
        let second = cached.handle(get("/two")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.headers().get("x-path"), Some("/one"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn matching_validator_gets_not_modified() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache()).wrap(counting_handler(&calls));

        let full = cached.handle(get("/doc")).await.unwrap();
        let etag = full.headers().get("etag").unwrap().to_owned();

        let revalidated = cached
            .handle(get("/doc").header("If-None-Match", etag.clone()))
            .await
            .unwrap();
        assert_eq!(revalidated.status(), StatusCode::NotModified);
        assert_eq!(revalidated.headers().get("etag"), Some(etag.as_str()));
        assert_eq!(revalidated.headers().get("expires"), full.headers().get("expires"));
        assert!(revalidated.body().is_empty());

        let stale = cached
            .handle(get("/doc").header("If-None-Match", "\"something-else\""))
            .await
            .unwrap();
        assert_eq!(stale, full);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsafe_methods_ignore_validators() {
        let registry = CacheRegistry::in_memory();
        let cached = ResponseCache::new(registry.default_cache())
            .wrap(|_req: Request| async { Response::new(StatusCode::Ok).text("posted") });

        cached.handle(Request::new(Method::Post, "/form")).await.unwrap();
        let response = cached
            .handle(Request::new(Method::Post, "/form").header("If-None-Match", "*"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn filtered_statuses_pass_through_uncached() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cached = ResponseCache::new(registry.default_cache())
            .only_status([StatusCode::Ok])
            .wrap(move |request: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                let status = if request.path() == "/missing" {
                    StatusCode::NotFound
                } else {
                    StatusCode::Ok
                };
                async move { Response::new(status).text("body") }
            });

        for _ in 0..2 {
            let response = cached.handle(get("/missing")).await.unwrap();
            assert_eq!(response.status(), StatusCode::NotFound);
            assert!(response.headers().get("etag").is_none());
        }
        cached.handle(get("/found")).await.unwrap();
        cached.handle(get("/found")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!registry.default_cache().contains("GET /missing").await.unwrap());
    }

    #[tokio::test]
    async fn invalidation_recomputes() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache()).wrap(counting_handler(&calls));

        let before = cached.handle(get("/feed")).await.unwrap();
        cached.response_cache().invalidate(&get("/feed")).await.unwrap();
        let after = cached.handle(get("/feed")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_ne!(before.headers().get("etag"), after.headers().get("etag"));

        cached.response_cache().invalidate_key("GET /feed").await.unwrap();
        cached.handle(get("/feed")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_with_the_ttl() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(registry.default_cache())
            .ttl(Duration::from_secs(30))
            .wrap(counting_handler(&calls));

        cached.handle(get("/tick")).await.unwrap();
        tokio::time::advance(Duration::from_secs(29)).await;
        cached.handle(get("/tick")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        cached.handle(get("/tick")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn foreign_value_under_key_is_an_error() {
        let registry = CacheRegistry::in_memory();
        let cache = registry.default_cache();
        cache.set("GET /clash", &"not a response".to_owned()).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let cached = ResponseCache::new(cache.clone()).wrap(counting_handler(&calls));
        let err = cached.handle(get("/clash")).await.unwrap_err();

        assert!(matches!(err, CacheError::TypeMismatch { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            cache.get::<String>("GET /clash").await.unwrap().as_deref(),
            Some("not a response")
        );
    }

    #[derive(Debug)]
    enum Upstream {
        Down,
        Cache(CacheError),
    }

    impl From<CacheError> for Upstream {
        fn from(err: CacheError) -> Self {
            Self::Cache(err)
        }
    }

    #[tokio::test]
    async fn handler_failure_is_returned_and_not_stored() {
        let registry = CacheRegistry::in_memory();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let cached = ResponseCache::new(registry.default_cache()).wrap(move |_req: Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    Err(Upstream::Down)
                } else {
                    Ok(Response::new(StatusCode::Ok).text(format!("attempt {n}")))
                }
            }
        });

        let err = cached.try_handle(get("/flaky")).await.unwrap_err();
        assert!(matches!(err, Upstream::Down));
        assert!(!registry.default_cache().contains("GET /flaky").await.unwrap());

        let ok = cached.try_handle(get("/flaky")).await.unwrap();
        let again = cached.try_handle(get("/flaky")).await.unwrap();
        assert_eq!(ok.body().as_ref(), b"attempt 2");
        assert_eq!(ok, again);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fallible_path_converts_cache_errors() {
        let registry = CacheRegistry::in_memory();
        let cache = registry.default_cache();
        cache.set("GET /taken", &1i32).await.unwrap();

        let result = ResponseCache::new(cache)
            .try_respond(get("/taken"), |_req| async {
                Ok::<_, Upstream>(Response::new(StatusCode::Ok))
            })
            .await;
        assert!(matches!(
            result,
            Err(Upstream::Cache(CacheError::TypeMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn as_middleware() {
        let registry = CacheRegistry::in_memory();
        let cache = registry.default_cache();
        cache.set("GET /broken", &7i64).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let chain = vec![
            from_middleware(Arc::new(ResponseCache::new(cache))),
            from_handler(move |_req: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Response::new(StatusCode::Ok).text("downstream") }
            }),
        ];

        let first = Next::new(chain.clone()).run(get("/page")).await;
        let second = Next::new(chain.clone()).run(get("/page")).await;
        assert_eq!(first, second);
        assert!(first.headers().contains("etag"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let failed = Next::new(chain).run(get("/broken")).await;
        assert_eq!(failed.status(), StatusCode::InternalServerError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
