//! Request router, middleware pipeline and fallback handling.
//!
//! Routes are tried in registration order and the first one whose method and
//! pattern both match wins. There is no specificity ranking: register
//! `/users/me` before `/users/:id` if you want it to be reachable.
//!
//! One request moves through
//! `received → middleware → routing → handler → responded`, with the error
//! handlers or not-found handlers standing in for the handler when needed.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::{debug, error, warn};

use crate::error::Error;
use crate::handler::{
    BoxedErrorHandler, BoxedHandler, BoxedNotFoundHandler, ErrorHandler, Handler, NotFoundHandler,
};
use crate::method::Method;
use crate::middleware::{self, BoxedMiddleware, Middleware, Next};
use crate::request::{Request, RequestHead};
use crate::response::Response;
use crate::route::{PathPattern, Route};

/// The application router.
///
/// Build it once at startup with chained registrations, then pass it to
/// [`Server::serve`](crate::Server::serve) or
/// [`Server::listen`](crate::Server::listen).
///
/// ```rust
/// use enplex::{Method, Request, Response, Router};
///
/// # async fn get_user(_: Request) -> Response { Response::text("") }
/// # async fn create_user(_: Request) -> Response { Response::text("") }
/// let app = Router::new()
///     .layer(enplex::middleware::trace())
///     .route(Method::Get, "/users/:id", get_user)
///     .post("/users", create_user)
///     .use_static("./public");
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    middleware: Vec<BoxedMiddleware>,
    error_handlers: Vec<BoxedErrorHandler>,
    not_found_handlers: Vec<BoxedNotFoundHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pattern. Patterns use `:name`
    /// placeholders, read back with [`Request::param`].
    pub fn route(mut self, method: Method, pattern: &str, handler: impl Handler) -> Self {
        self.routes.push(Route {
            method,
            pattern: PathPattern::compile(pattern),
            handler: handler.into_boxed_handler(),
        });
        self
    }

    /// Same as [`route`](Self::route) with the method given as its wire name.
    pub fn route_str(self, method: &str, pattern: &str, handler: impl Handler) -> Result<Self, Error> {
        let method = method.parse()?;
        Ok(self.route(method, pattern, handler))
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self {
        self.route(Method::Get, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler) -> Self {
        self.route(Method::Post, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler) -> Self {
        self.route(Method::Put, pattern, handler)
    }

    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self {
        self.route(Method::Patch, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self {
        self.route(Method::Delete, pattern, handler)
    }

    /// Append a middleware to the pipeline.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(middleware.into_boxed_middleware());
        self
    }

    /// Add an error handler. Handlers are tried in registration order until
    /// one completes without failing; if none does, the built-in `500` is sent.
    pub fn use_error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handlers.push(handler.into_boxed_error_handler());
        self
    }

    /// Add a not-found handler, tried the same way as error handlers before
    /// falling back to the built-in `404`.
    pub fn use_not_found_handler(mut self, handler: impl NotFoundHandler) -> Self {
        self.not_found_handlers.push(handler.into_boxed_not_found_handler());
        self
    }

    /// Serve files under `dir` for `GET`/`HEAD`. This is an ordinary
    /// middleware: it runs at the position it was registered at.
    pub fn use_static(self, dir: impl Into<PathBuf>) -> Self {
        self.layer(middleware::serve_dir(dir.into()))
    }

    /// Runs one request through the whole pipeline. Never fails: every
    /// outcome, panics included, ends as a response.
    ///
    /// Failures raised by a handler are answered inside the pipeline and pass
    /// back through the middleware. Failures raised by a middleware itself are
    /// answered here, after the pipeline has unwound.
    pub async fn handle(self: Arc<Self>, req: Request) -> Response {
        let head = req.head();
        debug!(method = %head.method, path = %head.path, "dispatching");

        let pipeline = Next::start(Arc::clone(&self)).run(req);
        let mut res = match AssertUnwindSafe(pipeline).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Response::failed(Error::from_panic(panic)),
        };

        match res.take_failure() {
            Some(err) => self.handle_error(err, head).await,
            None => res,
        }
    }

    pub(crate) fn middleware_at(&self, index: usize) -> Option<BoxedMiddleware> {
        self.middleware.get(index).map(Arc::clone)
    }

    /// The end of the middleware chain: route lookup and handler invocation.
    ///
    /// Handler failures are resolved here, so the error response travels back
    /// through the middleware like any other.
    pub(crate) async fn endpoint(&self, mut req: Request) -> Response {
        let head = req.head();
        let Some((handler, params)) = self.lookup(head.method, &head.path) else {
            return self.handle_not_found(head).await;
        };
        req.set_params(params);
        if req.method().carries_body() {
            let _ = req.body().await;
        }

        let mut res = match AssertUnwindSafe(handler.call(req)).catch_unwind().await {
            Ok(res) => res,
            Err(panic) => Response::failed(Error::from_panic(panic)),
        };
        match res.take_failure() {
            Some(err) => self.handle_error(err, head).await,
            None => res,
        }
    }

    fn lookup(&self, method: Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        // Stands for every unnamed method at once, so it never matches.
        if method == Method::Extension {
            return None;
        }
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                let params = route.pattern.matches(path)?;
                debug!(pattern = route.pattern.as_str(), "route matched");
                Some((Arc::clone(&route.handler), params))
            })
    }

    async fn handle_error(&self, err: Error, head: RequestHead) -> Response {
        error!(method = %head.method, path = %head.path, "request failed: {err}");
        let err = Arc::new(err);

        for (index, handler) in self.error_handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.call(Arc::clone(&err), head.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(mut res) => match res.take_failure() {
                    None => return res,
                    Some(e) => warn!(index, "error handler failed: {e}"),
                },
                Err(panic) => warn!(index, "error handler failed: {}", Error::from_panic(panic)),
            }
        }

        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .text("Internal Server Error")
    }

    async fn handle_not_found(&self, head: RequestHead) -> Response {
        debug!(method = %head.method, path = %head.path, "no route matched");

        for (index, handler) in self.not_found_handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.call(head.clone())).catch_unwind().await;
            match outcome {
                Ok(mut res) => match res.take_failure() {
                    None => return res,
                    Some(e) => warn!(index, "not-found handler failed: {e}"),
                },
                Err(panic) => warn!(index, "not-found handler failed: {}", Error::from_panic(panic)),
            }
        }

        Response::builder().status(StatusCode::NOT_FOUND).text("Not Found")
    }
}
