//! Handler traits and type erasure.
//!
//! # How async handlers are stored
//!
//! The router keeps handlers of *different* types in one `Vec`. Rust
//! collections hold one concrete type, so each handler is wrapped in a
//! newtype that implements an object-safe `Erased*` trait and stored behind
//! an `Arc<dyn …>`.
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time               ← one vtable dispatch
//! ```
//!
//! Three kinds of function are erased this way: route handlers, error
//! handlers and not-found handlers. Middleware lives in
//! [`crate::middleware`] and follows the same scheme.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::{Request, RequestHead};
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedErrorHandler {
    fn call(&self, err: Arc<Error>, head: RequestHead) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedErrorHandler = Arc<dyn ErasedErrorHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub trait ErasedNotFoundHandler {
    fn call(&self, head: RequestHead) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedNotFoundHandler = Arc<dyn ErasedNotFoundHandler + Send + Sync + 'static>;

mod private {
    pub trait Sealed<Args> {}
}

// ── Route handlers ────────────────────────────────────────────────────────────

/// Implemented for every valid route handler:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// Returning `Err` (any `Result<_, E>` with `E: Into<BoxError>`) or
/// panicking sends the request down the error path.
pub trait Handler: private::Sealed<Request> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

impl<F, Fut, R> private::Sealed<Request> for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Error handlers ────────────────────────────────────────────────────────────

/// Implemented for every valid error handler:
///
/// ```text
/// async fn name(err: Arc<Error>, head: RequestHead) -> impl IntoResponse
/// ```
///
/// An error handler that returns `Err` or panics counts as failed and the
/// next registered one is tried.
pub trait ErrorHandler: private::Sealed<(Arc<Error>, RequestHead)> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_error_handler(self) -> BoxedErrorHandler;
}

impl<F, Fut, R> private::Sealed<(Arc<Error>, RequestHead)> for F
where
    F: Fn(Arc<Error>, RequestHead) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> ErrorHandler for F
where
    F: Fn(Arc<Error>, RequestHead) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_error_handler(self) -> BoxedErrorHandler {
        Arc::new(FnErrorHandler(self))
    }
}

struct FnErrorHandler<F>(F);

impl<F, Fut, R> ErasedErrorHandler for FnErrorHandler<F>
where
    F: Fn(Arc<Error>, RequestHead) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, err: Arc<Error>, head: RequestHead) -> BoxFuture {
        let fut = (self.0)(err, head);
        Box::pin(async move { fut.await.into_response() })
    }
}

// ── Not-found handlers ────────────────────────────────────────────────────────

/// Implemented for every valid not-found handler:
///
/// ```text
/// async fn name(head: RequestHead) -> impl IntoResponse
/// ```
pub trait NotFoundHandler: private::Sealed<RequestHead> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_not_found_handler(self) -> BoxedNotFoundHandler;
}

impl<F, Fut, R> private::Sealed<RequestHead> for F
where
    F: Fn(RequestHead) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> NotFoundHandler for F
where
    F: Fn(RequestHead) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_not_found_handler(self) -> BoxedNotFoundHandler {
        Arc::new(FnNotFoundHandler(self))
    }
}

struct FnNotFoundHandler<F>(F);

impl<F, Fut, R> ErasedNotFoundHandler for FnNotFoundHandler<F>
where
    F: Fn(RequestHead) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, head: RequestHead) -> BoxFuture {
        let fut = (self.0)(head);
        Box::pin(async move { fut.await.into_response() })
    }
}
