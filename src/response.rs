//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers usually build a [`Response`] with one of the constructors and
//! return it. Middleware that wraps `next.run(req)` edits the returned value
//! through the setters. The body can be sent once: a second [`Response::send`]
//! is ignored and reported with `false`.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Serialize;
use tracing::warn;

use crate::error::{BoxError, Error};
use crate::request::TransportBody;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Response::bytes`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Gif,          // image/gif
    Html,         // text/html; charset=utf-8
    Icon,         // image/x-icon
    Javascript,   // text/javascript
    Jpeg,         // image/jpeg
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Pdf,          // application/pdf
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Icon        => "image/x-icon",
            Self::Javascript  => "text/javascript",
            Self::Jpeg        => "image/jpeg",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    /// Maps a file extension (without the dot, any case) to a content type.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "css"          => Self::Css,
            "csv"          => Self::Csv,
            "gif"          => Self::Gif,
            "htm" | "html" => Self::Html,
            "ico"          => Self::Icon,
            "js" | "mjs"   => Self::Javascript,
            "jpg" | "jpeg" => Self::Jpeg,
            "json"         => Self::Json,
            "pdf"          => Self::Pdf,
            "png"          => Self::Png,
            "svg"          => Self::Svg,
            "txt"          => Self::Text,
            "xml"          => Self::Xml,
            _              => Self::OctetStream,
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

enum Payload {
    Full(Bytes),
    Stream(TransportBody),
}

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use enplex::{Response, StatusCode};
///
/// Response::json(&serde_json::json!({"id": 1}));
/// Response::text("hello");
/// Response::status(StatusCode::NO_CONTENT);
/// Response::redirect("/login");
/// ```
///
/// # Setters
///
/// ```rust
/// use enplex::{Response, StatusCode};
///
/// let mut res = Response::new();
/// res.set_status(StatusCode::CREATED).set_header("location", "/users/42");
/// assert!(res.send_json(&serde_json::json!({"id": 42})));
/// assert!(!res.send("again"));
/// ```
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Payload,
    sent: bool,
    failure: Option<Error>,
}

impl Response {
    /// `200 OK`, no headers, nothing sent yet.
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Payload::Full(Bytes::new()),
            sent: false,
            failure: None,
        }
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::bytes(ContentType::Text, body.into())
    }

    /// `200 OK`, `application/json`.
    ///
    /// A value that fails to serialize yields a failed response, which the
    /// router hands to the error handlers.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        let mut res = Self::new();
        res.send_json(value);
        res
    }

    /// `200 OK` with an explicit content type.
    pub fn bytes(content_type: ContentType, body: impl Into<Bytes>) -> Self {
        let mut res = Self::new();
        res.set_content_type(content_type.as_str());
        res.send(body);
        res
    }

    /// Response with no body. The body can still be sent afterwards.
    pub fn status(code: StatusCode) -> Self {
        let mut res = Self::new();
        res.status = code;
        res
    }

    /// `302 Found` pointing at `location`.
    pub fn redirect(location: &str) -> Self {
        let mut res = Self::new();
        res.send_redirect(location);
        res
    }

    /// A failed response: the router discards it and runs the error handlers.
    pub fn error(err: impl Into<BoxError>) -> Self {
        Self::failed(Error::Handler(err.into()))
    }

    pub(crate) fn failed(err: Error) -> Self {
        let mut res = Self::status(StatusCode::INTERNAL_SERVER_ERROR);
        res.failure = Some(err);
        res
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub(crate) fn stream(content_type: ContentType, body: TransportBody) -> Self {
        let mut res = Self::new();
        res.set_content_type(content_type.as_str());
        res.body = Payload::Stream(body);
        res.sent = true;
        res
    }

    // ── Setters ──────────────────────────────────────────────────────────────

    pub fn set_status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    /// Sets (replaces) a header. Invalid names or values are logged and skipped.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds a header without replacing earlier values of the same name.
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.append(name, value);
        }
        self
    }

    /// Appends a `Set-Cookie` header: `name=value` followed by `; key=value`
    /// for each attribute.
    pub fn set_cookie(&mut self, name: &str, value: &str, attributes: &[(&str, &str)]) -> &mut Self {
        let mut cookie = format!("{name}={value}");
        for (key, val) in attributes {
            if val.is_empty() {
                cookie.push_str(&format!("; {key}"));
            } else {
                cookie.push_str(&format!("; {key}={val}"));
            }
        }
        self.append_header(SET_COOKIE.as_str(), &cookie)
    }

    /// Sends a raw body. Returns `false` and leaves the response untouched if
    /// a body was already sent.
    pub fn send(&mut self, body: impl Into<Bytes>) -> bool {
        if self.sent {
            warn!(status = %self.status, "response body already sent, ignoring");
            return false;
        }
        self.body = Payload::Full(body.into());
        self.sent = true;
        true
    }

    /// Serializes `value` as the body with `content-type: application/json`.
    pub fn send_json<T: Serialize + ?Sized>(&mut self, value: &T) -> bool {
        if self.sent {
            warn!(status = %self.status, "response body already sent, ignoring");
            return false;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.set_content_type(ContentType::Json.as_str());
                self.send(bytes)
            }
            Err(e) => {
                self.status = StatusCode::INTERNAL_SERVER_ERROR;
                self.failure = Some(Error::Json(e));
                self.sent = true;
                false
            }
        }
    }

    /// `302 Found` to `location` with an empty body.
    pub fn send_redirect(&mut self, location: &str) -> bool {
        if self.sent {
            warn!(status = %self.status, "response body already sent, ignoring redirect");
            return false;
        }
        self.status = StatusCode::FOUND;
        self.set_header(LOCATION.as_str(), location);
        self.send(Bytes::new())
    }

    fn set_content_type(&mut self, value: &'static str) {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn is_sent(&self) -> bool { self.sent }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The buffered body, `None` for streamed bodies.
    pub fn body(&self) -> Option<&Bytes> {
        match &self.body {
            Payload::Full(b) => Some(b),
            Payload::Stream(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    pub(crate) fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }

    pub(crate) fn into_http(self) -> http::Response<TransportBody> {
        let body = match self.body {
            Payload::Full(bytes) => Full::new(bytes)
                .map_err(|never| -> BoxError { match never {} })
                .boxed_unsync(),
            Payload::Stream(stream) => stream,
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("sent", &self.sent)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
        (Ok(n), Ok(v)) => Some((n, v)),
        _ => {
            warn!(header = name, "invalid response header, skipping");
            None
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let Some((name, value)) = header_pair(name, value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Response {
        self.finish(Response::json(value))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Response::text(body))
    }

    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> Response {
        self.finish(Response::bytes(content_type, body))
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        self.finish(Response::new())
    }

    fn finish(self, mut res: Response) -> Response {
        if res.failure.is_none() {
            res.status = self.status;
        }
        res.headers.extend(self.headers);
        res
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// `Result<T, E>` converts too: `Ok` becomes the response, `Err` becomes a
/// failed response that the router sends through the error handlers. This is
/// what lets handlers use `?`.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for () {
    fn into_response(self) -> Response { Response::new() }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a [`StatusCode`] directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Response {
        let mut res = self.1.into_response();
        if !res.is_failure() {
            res.status = self.0;
        }
        res
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<BoxError>,
{
    fn into_response(self) -> Response {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => Response::error(e),
        }
    }
}

/// Serializes the wrapped value as `application/json`.
///
/// ```rust
/// use enplex::{Json, Request};
///
/// async fn user(_req: Request) -> Json<serde_json::Value> {
///     Json(serde_json::json!({"id": 1, "name": "alice"}))
/// }
/// ```
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response { Response::json(&self.0) }
}
