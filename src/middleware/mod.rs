//! Middleware pipeline.
//!
//! A pipeline is an ordered list of [`MiddlewareHandler`]s. Each one gets the
//! [`Request`] and a [`Next`] cursor over the rest of the list; it may answer
//! directly or forward with [`Next::run`] and look at what comes back.
//! [`ResponseCache`](crate::response_cache::ResponseCache) is one such layer.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait for a layer that can wrap the rest of the chain.
//! - [`Next`]: cursor into the remaining chain; [`Next::run`] advances it.
//! - [`MiddlewareHandler`]: type-erased entry, cheap to clone.
//! - [`from_middleware`] and [`from_handler`]: build entries from a
//!   [`Middleware`] or from a terminal handler.
//!
//! ```
//! use std::sync::Arc;
//! use rttp_cache::http::{Method, Request, Response, StatusCode};
//! use rttp_cache::middleware::{Next, from_handler};
//!
//! # tokio_test_block(async {
//! let chain = vec![from_handler(|_req: Request| async { Response::new(StatusCode::Ok).text("hi") })];
//! let response = Next::new(chain).run(Request::new(Method::Get, "/")).await;
//! assert_eq!(response.status(), StatusCode::Ok);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f);
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http::{Request, Response, StatusCode};

/// Boxed `Send` future, as returned by [`Middleware::handle`].
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A type-erased pipeline entry. Cloning only bumps the reference count.
///
/// Usually built with [`from_middleware`] or [`from_handler`], but a closure
/// works directly:
///
/// ```
/// use std::sync::Arc;
/// use rttp_cache::http::Request;
/// use rttp_cache::middleware::{BoxFuture, MiddlewareHandler, Next};
/// use rttp_cache::Response;
///
/// let pass_through: MiddlewareHandler = Arc::new(|req: Request, next: Next| -> BoxFuture<Response> {
///     Box::pin(next.run(req))
/// });
/// ```
pub type MiddlewareHandler = Arc<dyn Fn(Request, Next) -> BoxFuture<Response> + Send + Sync>;

/// Cursor into the remaining pipeline for one request.
///
/// Consumed by [`run`](Self::run), so a layer forwards at most once. When the
/// chain runs out before anything answers, `run` returns a `500`.
///
/// # Examples
///
/// ```
/// use rttp_cache::http::{Method, Request, StatusCode};
/// use rttp_cache::middleware::Next;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let response = Next::new(Vec::new()).run(Request::new(Method::Get, "/")).await;
/// assert_eq!(response.status(), StatusCode::InternalServerError);
/// # });
/// ```
pub struct Next {
    chain: Arc<[MiddlewareHandler]>,
    index: usize,
}

impl Next {
    pub fn new(chain: Vec<MiddlewareHandler>) -> Self {
        Self {
            chain: chain.into(),
            index: 0,
        }
    }

    /// Hands `request` to the next layer. An exhausted chain answers `500`.
    pub async fn run(mut self, request: Request) -> Response {
        let Some(handler) = self.chain.get(self.index).cloned() else {
            return Response::new(StatusCode::InternalServerError)
                .text("No response generated by middleware pipeline");
        };
        self.index += 1;
        handler(request, self).await
    }
}

/// A pipeline layer.
///
/// Implementations are shared across tasks, so they must be `Send + Sync`
/// and their futures must not borrow `self`; clone what the future needs.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rttp_cache::http::{Method, Request, Response, StatusCode};
/// use rttp_cache::middleware::{BoxFuture, Middleware, Next, from_handler, from_middleware};
///
/// struct Served(&'static str);
///
/// impl Middleware for Served {
///     fn handle(&self, request: Request, next: Next) -> BoxFuture<Response> {
///         let by = self.0;
///         Box::pin(async move { next.run(request).await.header("X-Served-By", by) })
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let chain = vec![
///     from_middleware(Arc::new(Served("edge"))),
///     from_handler(|_req: Request| async { Response::new(StatusCode::Ok) }),
/// ];
/// let response = Next::new(chain).run(Request::new(Method::Get, "/")).await;
/// assert_eq!(response.headers().get("x-served-by"), Some("edge"));
/// # });
/// ```
pub trait Middleware: Send + Sync {
    fn handle(&self, request: Request, next: Next) -> BoxFuture<Response>;
}

/// Wraps a [`Middleware`] as a pipeline entry.
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |request: Request, next: Next| middleware.handle(request, next))
}

/// Wraps a terminal handler as a pipeline entry. It never calls `next`.
pub fn from_handler<F, Fut>(handler: F) -> MiddlewareHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request: Request, _next: Next| -> BoxFuture<Response> {
        Box::pin(handler(request))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    struct Tag(&'static str);

    impl Middleware for Tag {
        fn handle(&self, request: Request, next: Next) -> BoxFuture<Response> {
            let tag = self.0;
            Box::pin(async move {
                let mut response = next.run(request).await;
                response.headers_mut().insert("X-Layer", tag);
                response
            })
        }
    }

    #[tokio::test]
    async fn layers_run_in_order_and_see_the_response() {
        let chain = vec![
            from_middleware(Arc::new(Tag("outer"))),
            from_middleware(Arc::new(Tag("inner"))),
            from_handler(|req: Request| async move { Response::new(StatusCode::Ok).text(req.path().to_owned()) }),
        ];
        let response = Next::new(chain).run(Request::new(Method::Get, "/x")).await;

        assert_eq!(response.body().as_ref(), b"/x");
        let layers: Vec<_> = response.headers().get_all("x-layer").collect();
        assert_eq!(layers, vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn exhausted_chain_answers_500() {
        let chain = vec![from_middleware(Arc::new(Tag("only")))];
        let response = Next::new(chain).run(Request::new(Method::Get, "/")).await;
        assert_eq!(response.status(), StatusCode::InternalServerError);
    }
}
