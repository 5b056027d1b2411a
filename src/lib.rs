//! # enplex
//!
//! Two small pieces of HTTP plumbing that tend to show up together:
//!
//! - **Rectify**: a router with `:name` path parameters, an async middleware
//!   chain and pluggable error / not-found handling, served by hyper.
//! - **Xio** ([`xio`]): an outbound client with per-attempt timeouts,
//!   content-type-aware decoding and exponential backoff.
//!
//! ## Routing
//!
//! Routes are matched in registration order, first match wins. Middleware
//! runs in registration order and each link decides whether the request
//! goes any further. A handler that returns `Err` or panics ends up in the
//! error handlers, never in a crashed process.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use enplex::{middleware, Json, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), enplex::Error> {
//!     let app = Router::new()
//!         .layer(middleware::trace())
//!         .get("/users/:id", get_user)
//!         .post("/users", create_user)
//!         .use_static("./public");
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Json<serde_json::Value> {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Json(serde_json::json!({ "id": id }))
//! }
//!
//! async fn create_user(req: Request) -> Response {
//!     match req.parsed_body().and_then(|b| b.as_json()) {
//!         Some(user) => Response::builder()
//!             .status(StatusCode::CREATED)
//!             .header("location", "/users/99")
//!             .json(user),
//!         None => Response::status(StatusCode::BAD_REQUEST),
//!     }
//! }
//! ```

mod config;
mod error;
mod handler;
mod method;
mod request;
mod response;
mod route;
mod router;
mod server;

pub mod middleware;
pub mod xio;

pub use config::{ClientConfig, Config, RetryConfig, ServerConfig};
pub use error::{BoxError, Error};
pub use handler::{ErrorHandler, Handler, NotFoundHandler};
pub use http::StatusCode;
pub use method::Method;
pub use request::{Body, Request, RequestHead};
pub use response::{ContentType, IntoResponse, Json, Response, ResponseBuilder};
pub use route::PathPattern;
pub use router::Router;
pub use server::{Server, ServerHandle};
