//! In-process dispatch tests: routing, middleware ordering, fallbacks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use enplex::middleware::{self, CorsOptions, FieldRule, JsonType, Middleware, Next, RateLimit, Schema};
use enplex::{Body, Error, Json, Method, Request, RequestHead, Response, Router, StatusCode};

mod common;

use common::{body_text, dispatch, request, request_with_body, request_with_header};

async fn echo_params(req: Request) -> Json<std::collections::HashMap<String, String>> {
    Json(req.params().clone())
}

#[tokio::test]
async fn extracts_params_by_name() {
    let app = Arc::new(Router::new().get("/a/:x/b/:y", echo_params));

    let res = dispatch(&app, request("GET", "/a/1/b/2?ignored=yes")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let params: serde_json::Value = serde_json::from_str(&body_text(&res)).unwrap();
    assert_eq!(params, serde_json::json!({"x": "1", "y": "2"}));
}

#[tokio::test]
async fn structural_mismatch_is_not_found() {
    let app = Arc::new(Router::new().get("/users/:id", echo_params));

    let wrong_count = dispatch(&app, request("GET", "/users/1/posts")).await;
    assert_eq!(wrong_count.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&wrong_count), "Not Found");

    let wrong_method = dispatch(&app, request("DELETE", "/users/1")).await;
    assert_eq!(wrong_method.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn first_registered_route_wins() {
    let app = Arc::new(
        Router::new()
            .get("/dup", |_req: Request| async { "first" })
            .get("/dup", |_req: Request| async { "second" })
            .get("/users/me", |_req: Request| async { "me" })
            .get("/users/:id", |_req: Request| async { "by id" }),
    );

    for _ in 0..5 {
        assert_eq!(body_text(&dispatch(&app, request("GET", "/dup")).await), "first");
    }
    assert_eq!(body_text(&dispatch(&app, request("GET", "/users/me")).await), "me");
    assert_eq!(body_text(&dispatch(&app, request("GET", "/users/7")).await), "by id");
}

#[tokio::test]
async fn route_str_rejects_unknown_methods() {
    assert!(Router::new().route_str("POST", "/x", echo_params).is_ok());
    assert!(matches!(
        Router::new().route_str("FETCH", "/x", echo_params),
        Err(Error::UnsupportedMethod(_))
    ));
}

#[tokio::test]
async fn unknown_methods_are_not_found() {
    let app = Arc::new(
        Router::new()
            .get("/", |_req: Request| async { "ok" })
            .route(Method::Extension, "/", |_req: Request| async { "never" }),
    );

    let res = dispatch(&app, request("PROPFIND", "/")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&res), "Not Found");
}

fn recorder(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str, wait_ms: u64) -> impl Middleware {
    move |req: Request, next: Next| {
        let log = Arc::clone(&log);
        async move {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
            log.lock().unwrap().push(name);
            next.run(req).await
        }
    }
}

#[tokio::test]
async fn middleware_runs_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler_log = Arc::clone(&log);
    let app = Arc::new(
        Router::new()
            .layer(recorder(Arc::clone(&log), "A", 30))
            .layer(recorder(Arc::clone(&log), "B", 10))
            .layer(recorder(Arc::clone(&log), "C", 0))
            .get("/", move |_req: Request| {
                let log = Arc::clone(&handler_log);
                async move {
                    log.lock().unwrap().push("handler");
                    "ok"
                }
            }),
    );

    for _ in 0..3 {
        log.lock().unwrap().clear();
        let res = dispatch(&app, request("GET", "/")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["A", "B", "C", "handler"]);
    }
}

#[tokio::test]
async fn middleware_sees_not_found_too() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = Arc::new(Router::new().layer(recorder(Arc::clone(&log), "A", 0)));

    let res = dispatch(&app, request("GET", "/nowhere")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(*log.lock().unwrap(), vec!["A"]);
}

#[tokio::test]
async fn middleware_without_next_halts_pipeline() {
    let reached = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&reached);
    let app = Arc::new(
        Router::new()
            .layer(|_req: Request, _next: Next| async { Response::status(StatusCode::FORBIDDEN) })
            .get("/", move |_req: Request| {
                let flag = Arc::clone(&flag);
                async move {
                    flag.store(true, Ordering::SeqCst);
                    "handled"
                }
            }),
    );

    let res = dispatch(&app, request("GET", "/")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn middleware_can_edit_the_response() {
    let app = Arc::new(
        Router::new()
            .layer(|req: Request, next: Next| async move {
                let mut res = next.run(req).await;
                res.set_header("x-powered-by", "enplex");
                res
            })
            .get("/", |_req: Request| async { "ok" }),
    );

    let res = dispatch(&app, request("GET", "/")).await;
    assert_eq!(res.header("x-powered-by"), Some("enplex"));
}

#[tokio::test]
async fn write_methods_get_a_parsed_body() {
    let app = Arc::new(Router::new().post("/users", |req: Request| async move {
        match req.parsed_body() {
            Some(Body::Json(v)) => Response::json(v),
            other => Response::text(format!("{other:?}")),
        }
    }));

    let res = dispatch(&app, request_with_body("POST", "/users", "application/json", r#"{"name":"alice"}"#)).await;
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(body_text(&res), r#"{"name":"alice"}"#);

    let res = dispatch(&app, request_with_body("POST", "/users", "application/json", "{oops")).await;
    assert_eq!(body_text(&res), r#"Some(Text("{oops"))"#);
}

#[tokio::test]
async fn read_methods_leave_body_unparsed() {
    let app = Arc::new(Router::new().get("/", |req: Request| async move {
        req.parsed_body().is_none().to_string()
    }));

    let res = dispatch(&app, request_with_body("GET", "/", "text/plain", "ignored")).await;
    assert_eq!(body_text(&res), "true");
}

async fn failing(_req: Request) -> Result<Response, std::io::Error> {
    Err(std::io::Error::other("database unavailable"))
}

async fn panicking(_req: Request) -> Response {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_errors_get_default_500() {
    let app = Arc::new(Router::new().get("/err", failing).get("/panic", panicking));

    for path in ["/err", "/panic"] {
        let res = dispatch(&app, request("GET", path)).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(&res), "Internal Server Error");
        assert_eq!(res.header("content-type"), Some("text/plain; charset=utf-8"));
    }
}

#[tokio::test]
async fn error_handlers_accumulate_first_success_wins() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let app = Arc::new(
        Router::new()
            .get("/err", failing)
            .use_error_handler(move |_err: Arc<Error>, _head: RequestHead| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<Response, _>("first handler gives up")
                }
            })
            .use_error_handler(|err: Arc<Error>, head: RequestHead| async move {
                (StatusCode::SERVICE_UNAVAILABLE, format!("{} {}: {err}", head.method, head.path))
            })
            .use_error_handler(|_err: Arc<Error>, _head: RequestHead| async { "never reached" }),
    );

    let res = dispatch(&app, request("GET", "/err")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_text(&res), "GET /err: handler failed: database unavailable");
}

async fn exploding_error_handler(_err: Arc<Error>, _head: RequestHead) -> Response {
    panic!("error handler exploded")
}

#[tokio::test]
async fn error_responses_pass_back_through_middleware() {
    let app = Arc::new(
        Router::new()
            .layer(middleware::cors(CorsOptions::default()))
            .get("/err", failing)
            .get("/panic", panicking),
    );

    for path in ["/err", "/panic"] {
        let res = dispatch(&app, request("GET", path)).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }
}

#[tokio::test]
async fn failing_middleware_reaches_error_handlers() {
    let app = Arc::new(
        Router::new()
            .layer(|_req: Request, _next: Next| async { Err::<Response, _>("gate closed") })
            .get("/", |_req: Request| async { "unreachable" })
            .use_error_handler(|err: Arc<Error>, _head: RequestHead| async move {
                (StatusCode::BAD_GATEWAY, err.to_string())
            }),
    );

    let res = dispatch(&app, request("GET", "/")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(&res), "handler failed: gate closed");
}

#[tokio::test]
async fn panicking_error_handler_falls_back_to_default() {
    let app = Arc::new(
        Router::new()
            .get("/panic", panicking)
            .use_error_handler(exploding_error_handler),
    );

    let res = dispatch(&app, request("GET", "/panic")).await;
    assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&res), "Internal Server Error");
}

#[tokio::test]
async fn custom_not_found_handler() {
    let app = Arc::new(
        Router::new()
            .use_not_found_handler(|_head: RequestHead| async { Err::<Response, _>("not me") })
            .use_not_found_handler(|head: RequestHead| async move {
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .json(&serde_json::json!({ "missing": head.path }))
            }),
    );

    let res = dispatch(&app, request("GET", "/ghost")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&res), r#"{"missing":"/ghost"}"#);
}

#[tokio::test]
async fn cors_answers_preflight_and_decorates_responses() {
    let app = Arc::new(
        Router::new()
            .layer(middleware::cors(CorsOptions { credentials: true, ..CorsOptions::default() }))
            .get("/", |_req: Request| async { "ok" }),
    );

    let preflight = dispatch(&app, request("OPTIONS", "/")).await;
    assert_eq!(preflight.status_code(), StatusCode::NO_CONTENT);
    assert_eq!(preflight.header("access-control-allow-origin"), Some("*"));
    assert_eq!(preflight.header("access-control-max-age"), Some("86400"));

    let res = dispatch(&app, request("GET", "/")).await;
    assert_eq!(body_text(&res), "ok");
    assert_eq!(res.header("access-control-allow-methods"), Some("GET,HEAD,PUT,PATCH,POST,DELETE"));
    assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
}

#[tokio::test]
async fn cookies_reach_the_handler() {
    let app = Arc::new(
        Router::new()
            .layer(middleware::cookies())
            .get("/", |req: Request| async move {
                let jar = req.extensions().get::<middleware::Cookies>().cloned().unwrap_or_default();
                jar.get("session").unwrap_or("none").to_owned()
            }),
    );

    let res = dispatch(&app, request_with_header("GET", "/", "cookie", "theme=dark; session=abc123")).await;
    assert_eq!(body_text(&res), "abc123");
    let res = dispatch(&app, request("GET", "/")).await;
    assert_eq!(body_text(&res), "none");
}

#[tokio::test]
async fn rate_limit_rejects_with_429() {
    let app = Arc::new(
        Router::new()
            .layer(middleware::rate_limit(RateLimit { window: Duration::from_secs(60), max: 2 }))
            .get("/", |_req: Request| async { "ok" }),
    );

    for _ in 0..2 {
        let res = dispatch(&app, request_with_header("GET", "/", "x-forwarded-for", "10.0.0.1")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }
    let res = dispatch(&app, request_with_header("GET", "/", "x-forwarded-for", "10.0.0.1")).await;
    assert_eq!(res.status_code(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_text(&res), r#"{"error":"Too many requests"}"#);

    let other = dispatch(&app, request_with_header("GET", "/", "x-forwarded-for", "10.0.0.2")).await;
    assert_eq!(other.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn validation_rejects_bad_bodies() {
    let schema = Schema::new().field("name", FieldRule::required().kind(JsonType::String).min(2));
    let app = Arc::new(
        Router::new()
            .layer(middleware::validate(schema))
            .route(Method::Post, "/users", |req: Request| async move {
                // Parsed once by the validator, reused here.
                format!("{:?}", req.parsed_body().and_then(|b| b.as_json()).map(|v| v["name"].clone()))
            }),
    );

    let bad = dispatch(&app, request_with_body("POST", "/users", "application/json", r#"{"name":"a"}"#)).await;
    assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(&bad), r#"{"error":["name must be at least 2 characters"]}"#);

    let form = dispatch(&app, request_with_body("POST", "/users", "application/x-www-form-urlencoded", "name=bob")).await;
    assert_eq!(form.status_code(), StatusCode::OK);

    let good = dispatch(&app, request_with_body("POST", "/users", "application/json", r#"{"name":"alice"}"#)).await;
    assert_eq!(body_text(&good), r#"Some(String("alice"))"#);
}
