//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use enplex::{Request, Response, Router};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub fn request(method: &str, uri: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap();
    Request::from_http(req)
}

pub fn request_with_body(method: &str, uri: &str, content_type: &str, body: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", content_type)
        .body(body.to_owned())
        .unwrap();
    Request::from_http(req)
}

pub fn request_with_header(method: &str, uri: &str, name: &str, value: &str) -> Request {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .header(name, value)
        .body(String::new())
        .unwrap();
    Request::from_http(req)
}

pub async fn dispatch(router: &Arc<Router>, req: Request) -> Response {
    Arc::clone(router).handle(req).await
}

pub fn body_text(res: &Response) -> String {
    String::from_utf8(res.body().expect("buffered body").to_vec()).unwrap()
}

/// Starts a backend on a free port whose answer is computed per connection.
/// Every connection gets one `Connection: close` response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, &'static str, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = Arc::clone(&f);
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;

                let (status, content_type, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    content_type,
                    body.len(),
                    body,
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}
