//! Minimal enplex app: JSON endpoints, middleware, static files, and an
//! outbound call through Xio.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl 'http://localhost:3000/proxy?url=https://httpbin.org/json'
//!
//! Point `ENPLEX_CONFIG` at a TOML file to override the bind address, the
//! static directory and the outbound retry policy.

use std::sync::Arc;
use std::time::Duration;

use enplex::middleware::{self, CorsOptions, FieldRule, JsonType, RateLimit, Schema};
use enplex::xio::{RequestOptions, Xio};
use enplex::{Config, Error, Json, Request, RequestHead, Response, Router, Server, StatusCode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("ENPLEX_CONFIG") {
        Ok(path) => Config::load(path)?,
        Err(_) => Config::default(),
    };
    let static_dir = config.server.static_dir.clone().unwrap_or_else(|| "./public".into());
    let client_options = config.client_options();

    let users = Router::new()
        .layer(middleware::validate(
            Schema::new().field("name", FieldRule::required().kind(JsonType::String).min(2).max(32)),
        ))
        .post("/users", create_user);

    let app = Router::new()
        .layer(middleware::trace())
        .layer(middleware::cors(CorsOptions::default()))
        .layer(middleware::rate_limit(RateLimit { window: Duration::from_secs(60), max: 100 }))
        .use_static(static_dir)
        .get("/users/:id", get_user)
        .delete("/users/:id", delete_user)
        .get("/proxy", move |req: Request| proxy(req, client_options.clone()))
        .use_error_handler(report_error)
        .use_not_found_handler(not_found);

    // Validation only applies to the write endpoint, so it lives on its own
    // router and is reached through a forwarding route.
    let users = Arc::new(users);
    let app = app.post("/users", move |req: Request| {
        let users = Arc::clone(&users);
        async move { users.handle(req).await }
    });

    Server::from_config(&config)?.serve(app).await
}

async fn get_user(req: Request) -> Json<serde_json::Value> {
    let id = req.param("id").unwrap_or("unknown");
    Json(serde_json::json!({ "id": id, "name": "alice" }))
}

async fn create_user(req: Request) -> Response {
    let Some(user) = req.parsed_body().and_then(|b| b.as_json()) else {
        return Response::status(StatusCode::BAD_REQUEST);
    };
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(user)
}

async fn delete_user(_req: Request) -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn proxy(req: Request, options: RequestOptions) -> Result<Json<serde_json::Value>, enplex::xio::Error> {
    let url = req.query("url").unwrap_or("https://httpbin.org/json").to_owned();
    let payload = Xio::new().request(&url, options).await?;
    let body = match payload.as_text() {
        Some(text) => serde_json::json!({ "text": text }),
        None => payload.as_json().cloned().unwrap_or_default(),
    };
    Ok(Json(body))
}

async fn report_error(err: Arc<Error>, head: RequestHead) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "error": err.to_string(), "path": head.path })),
    )
}

async fn not_found(head: RequestHead) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("nothing at {}", head.path))
}
