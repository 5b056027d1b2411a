//! Incoming HTTP request type.
//!
//! The body is not touched until someone asks for it. The first call to
//! [`Request::bytes`] drains the transport body and caches it, the first call
//! to [`Request::body`] parses the cached bytes according to `content-type`.
//! Both are idempotent. The router calls [`Request::body`] itself for write
//! methods before the handler runs.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap};
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{BoxError, Error};
use crate::method::Method;

pub(crate) type TransportBody = UnsyncBoxBody<Bytes, BoxError>;

enum RawBody {
    Pending(TransportBody),
    Read(Bytes),
}

/// A request body parsed according to its `content-type`.
///
/// Parsing is lenient: a body that claims to be JSON but does not parse is
/// kept as [`Body::Text`] instead of failing the request.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Form(HashMap<String, String>),
    Text(String),
}

impl Body {
    fn parse(content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some("application/json") => serde_json::from_slice(bytes)
                .map(Self::Json)
                .unwrap_or_else(|_| Self::Text(String::from_utf8_lossy(bytes).into_owned())),
            Some("application/x-www-form-urlencoded") => {
                Self::Form(url::form_urlencoded::parse(bytes).into_owned().collect())
            }
            _ => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON view of structured bodies. Form fields become string values.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Json(v) => Some(v.clone()),
            Self::Form(fields) => Some(serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect(),
            )),
            Self::Empty | Self::Text(_) => None,
        }
    }
}

/// The cheap-to-clone part of a request: everything except the body.
///
/// Error and not-found handlers receive this, because the [`Request`] itself
/// has usually been consumed by the time they run.
#[derive(Clone, Debug)]
pub struct RequestHead {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestHead {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// An incoming HTTP request.
pub struct Request {
    method: Method,
    path: String,
    query_string: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    raw: RawBody,
    parsed: Option<Body>,
    params: HashMap<String, String>,
    extensions: Extensions,
}

impl Request {
    /// Wraps an `http::Request`. Methods outside [`Method`]'s named set
    /// become [`Method::Extension`].
    ///
    /// Any body type works, which keeps the router testable without a socket:
    ///
    /// ```rust
    /// let req = enplex::Request::from_http(
    ///     http::Request::get("/users/42?full=1").body(String::new()).unwrap(),
    /// );
    /// assert_eq!(req.path(), "/users/42");
    /// assert_eq!(req.query("full"), Some("1"));
    /// ```
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method).unwrap_or(Method::Extension);
        let path = parts.uri.path().to_owned();
        let query_string = parts.uri.query().map(str::to_owned);
        let query = query_string
            .as_deref()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        Self {
            method,
            path,
            query_string,
            query,
            headers: parts.headers,
            remote_addr: None,
            raw: RawBody::Pending(body.map_err(Into::into).boxed_unsync()),
            parsed: None,
            params: HashMap::new(),
            extensions: parts.extensions,
        }
    }

    pub(crate) fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// A decoded query parameter. Repeated keys keep the last value.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.params
    }

    /// Typed per-request storage for middleware-provided values.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Reads the whole transport body once and caches it.
    ///
    /// A failed read leaves the cached body empty.
    pub async fn bytes(&mut self) -> Result<Bytes, Error> {
        let bytes = match std::mem::replace(&mut self.raw, RawBody::Read(Bytes::new())) {
            RawBody::Read(b) => b,
            RawBody::Pending(body) => body.collect().await.map_err(Error::Body)?.to_bytes(),
        };
        self.raw = RawBody::Read(bytes.clone());
        Ok(bytes)
    }

    /// The parsed body. Never fails: unreadable bodies become [`Body::Empty`].
    pub async fn body(&mut self) -> &Body {
        if self.parsed.is_none() {
            let parsed = match self.bytes().await {
                Ok(bytes) => Body::parse(self.header("content-type"), &bytes),
                Err(e) => {
                    warn!(path = %self.path, "request body unreadable: {e}");
                    Body::Empty
                }
            };
            self.parsed = Some(parsed);
        }
        self.parsed.get_or_insert(Body::Empty)
    }

    /// The parsed body if something already parsed it.
    pub fn parsed_body(&self) -> Option<&Body> {
        self.parsed.as_ref()
    }

    /// Deserializes the raw body as JSON, regardless of `content-type`.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method,
            path: self.path.clone(),
            query: self.query_string.clone(),
            headers: self.headers.clone(),
            remote_addr: self.remote_addr,
        }
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}
