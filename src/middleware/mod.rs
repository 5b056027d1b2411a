//! Middleware layer.
//!
//! A middleware is any async function of the form
//!
//! ```text
//! async fn name(req: Request, next: Next) -> impl IntoResponse
//! ```
//!
//! Middleware runs in registration order. Calling [`Next::run`] hands the
//! request to the next link (and, after the last one, to the router); the
//! middleware gets the response back and may edit it. Returning without
//! calling `next` short-circuits: no later middleware and no handler runs.
//!
//! ```rust
//! use enplex::{Request, Response, Router, StatusCode};
//! use enplex::middleware::Next;
//!
//! async fn require_token(req: Request, next: Next) -> Response {
//!     if req.header("authorization").is_none() {
//!         return Response::status(StatusCode::UNAUTHORIZED);
//!     }
//!     next.run(req).await
//! }
//!
//! let app = Router::new().layer(require_token);
//! ```
//!
//! Built-in middleware:
//! - [`trace()`]: per-request span with method, path, status, latency
//! - [`cors()`]: CORS headers and preflight answers
//! - [`cookies()`]: parses the `Cookie` header into [`Cookies`]
//! - [`rate_limit()`]: sliding-window limit per client address
//! - [`validate()`]: per-field checks on the parsed body
//! - [`serve_dir()`]: static files, also reachable via [`Router::use_static`](crate::Router::use_static)

mod cookies;
mod cors;
mod rate_limit;
mod static_files;
mod trace;
mod validate;

pub use cookies::{cookies, Cookies};
pub use cors::{cors, CorsOptions};
pub use rate_limit::{rate_limit, RateLimit, RateLimiter};
pub use static_files::serve_dir;
pub use trace::trace;
pub use validate::{validate, FieldRule, JsonType, Schema};

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::Router;

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, req: Request, next: Next) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every function usable as middleware.
pub trait Middleware: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut, R> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture {
        let fut = (self.0)(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// The rest of the pipeline, from the point of view of one middleware.
pub struct Next {
    router: Arc<Router>,
    index: usize,
}

impl Next {
    pub(crate) fn start(router: Arc<Router>) -> Self {
        Self { router, index: 0 }
    }

    /// Runs the remaining middleware, then the router.
    pub async fn run(self, req: Request) -> Response {
        let Some(link) = self.router.middleware_at(self.index) else {
            return self.router.endpoint(req).await;
        };
        let next = Self { router: Arc::clone(&self.router), index: self.index + 1 };
        link.call(req, next).await
    }
}
