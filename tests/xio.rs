//! Xio against a scripted backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use enplex::xio::{self, Payload, RequestOptions, Xio};
use enplex::{Method, StatusCode};

mod common;

use common::start_programmable_backend;

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[tokio::test]
async fn retries_until_success_with_backoff() {
    let calls = counter();
    let seen = Arc::clone(&calls);
    let addr = start_programmable_backend(move || {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                (500, "text/plain", "boom".to_owned())
            } else {
                (200, "application/json", r#"{"ok":true}"#.to_owned())
            }
        }
    })
    .await;

    let started = Instant::now();
    let payload = Xio::new()
        .request(
            &format!("http://{addr}/flaky"),
            RequestOptions::new().delay(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    assert_eq!(payload.as_json(), Some(&serde_json::json!({"ok": true})));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 100ms then 200ms of backoff between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let calls = counter();
    let seen = Arc::clone(&calls);
    let addr = start_programmable_backend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        async { (503, "text/plain", "down".to_owned()) }
    })
    .await;

    let err = Xio::new()
        .request(
            &format!("http://{addr}/down"),
            RequestOptions::new().delay(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.attempts, 3);
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(err.to_string().contains("failed after 3 attempt(s)"));
}

#[tokio::test]
async fn single_attempt_when_retries_disabled() {
    let calls = counter();
    let seen = Arc::clone(&calls);
    let addr = start_programmable_backend(move || {
        seen.fetch_add(1, Ordering::SeqCst);
        async { (404, "text/plain", "gone".to_owned()) }
    })
    .await;

    let err = xio::request(&format!("http://{addr}/"), RequestOptions::new().max_attempts(1))
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}

#[tokio::test]
async fn decodes_by_content_type() {
    let json = start_programmable_backend(|| async {
        (200, "application/json; charset=utf-8", r#"{"a":1}"#.to_owned())
    })
    .await;
    let text = start_programmable_backend(|| async { (200, "text/plain", "hello".to_owned()) }).await;

    let client = Xio::new();
    let payload = client.get(&format!("http://{json}/")).await.unwrap();
    assert_eq!(payload, Payload::Json(serde_json::json!({"a": 1})));

    let payload = client.get(&format!("http://{text}/")).await.unwrap();
    assert_eq!(payload.as_text(), Some("hello"));
}

#[tokio::test]
async fn sends_method_headers_and_body() {
    let payload = {
        let addr = start_programmable_backend(|| async { (200, "application/json", "[]".to_owned()) }).await;
        let options = RequestOptions::new()
            .method(Method::Post)
            .header("x-trace", "abc")
            .json(&serde_json::json!({"name": "lamp"}))
            .unwrap();
        Xio::new().request(&format!("http://{addr}/items"), options).await
    };
    assert_eq!(payload.unwrap(), Payload::Json(serde_json::json!([])));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let addr = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "text/plain", "late".to_owned())
    })
    .await;

    let err = Xio::new()
        .request(
            &format!("http://{addr}/slow"),
            RequestOptions::new().timeout(Duration::from_millis(100)).max_attempts(1),
        )
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.attempts, 1);
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Xio::new()
        .request(
            &format!("http://{addr}/"),
            RequestOptions::new().max_attempts(2).delay(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.kind, xio::ErrorKind::Transport(_)));
    assert_eq!(err.attempts, 2);
    assert!(!err.is_timeout());
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn invalid_url_is_never_attempted() {
    let err = Xio::new().get("not a url").await.unwrap_err();
    assert_eq!(err.attempts, 0);
    assert!(matches!(err.kind, xio::ErrorKind::InvalidRequest(_)));

    let err = Xio::new().get("").await.unwrap_err();
    assert_eq!(err.attempts, 0);

    let options = RequestOptions::new().method(Method::Extension);
    let err = Xio::new().request("http://127.0.0.1:1/", options).await.unwrap_err();
    assert_eq!(err.attempts, 0);
    assert!(matches!(err.kind, xio::ErrorKind::InvalidRequest(_)));
}
