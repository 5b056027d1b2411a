//! Xio: a retrying HTTP client.
//!
//! Every call is bounded per attempt by a timeout and retried with
//! exponential backoff until it succeeds or the attempt ceiling is hit.
//! Successful bodies are decoded by `content-type`: JSON becomes
//! [`Payload::Json`], anything else [`Payload::Text`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use enplex::xio::{RequestOptions, Xio};
//!
//! # async fn run() -> Result<(), enplex::xio::Error> {
//! let xio = Xio::new();
//! let payload = xio
//!     .request(
//!         "https://api.example.com/items",
//!         RequestOptions::new()
//!             .header("authorization", "Bearer token")
//!             .timeout(Duration::from_secs(2))
//!             .max_attempts(5),
//!     )
//!     .await?;
//! println!("{payload:?}");
//! # Ok(())
//! # }
//! ```
//!
//! Options override the defaults field by field, the retry settings too:
//! setting only `max_attempts` keeps the default delay and backoff.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::method::Method;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_BACKOFF: f64 = 2.0;

// ── Retry policy ──────────────────────────────────────────────────────────────

/// How often and how patiently a call is retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first one included. At least 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub delay: Duration,
    /// Factor applied to the wait after every failed attempt. At least 1.
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Applies `overrides` field by field, clamping to the valid ranges.
    pub fn merge(self, overrides: &RetryOverrides) -> Self {
        let backoff = overrides.backoff.unwrap_or(self.backoff);
        Self {
            max_attempts: overrides.max_attempts.unwrap_or(self.max_attempts).max(1),
            delay: overrides.delay.unwrap_or(self.delay),
            backoff: if backoff.is_finite() && backoff >= 1.0 { backoff } else { 1.0 },
        }
    }

    /// The waits between consecutive attempts: `max_attempts - 1` values.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::successors(Some(self.delay), |d| Some(scale(*d, self.backoff)))
            .take(self.max_attempts.saturating_sub(1) as usize)
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Per-call retry overrides; `None` keeps the default.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RetryOverrides {
    pub max_attempts: Option<u32>,
    pub delay: Option<Duration>,
    pub backoff: Option<f64>,
}

// ── Request options ───────────────────────────────────────────────────────────

/// Per-call options. Unset fields fall back to the defaults: `GET`,
/// `accept: application/json`, 10 s timeout, 3 attempts, 1 s delay, ×2.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    /// Merged over the default headers; same-named caller headers win.
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub retry: RetryOverrides,
    pub body: Option<Bytes>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.retry.max_attempts = Some(n);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.retry.delay = Some(delay);
        self
    }

    pub fn backoff(mut self, factor: f64) -> Self {
        self.retry.backoff = Some(factor);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body and sets `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.header(CONTENT_TYPE.as_str(), "application/json").body(bytes))
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// A decoded response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    fn decode(content_type: Option<&str>, bytes: &[u8]) -> Result<Self, ErrorKind> {
        if content_type.is_some_and(|ct| ct.contains("application/json")) {
            return serde_json::from_slice(bytes).map(Self::Json).map_err(ErrorKind::Decode);
        }
        Ok(Self::Text(String::from_utf8_lossy(bytes).into_owned()))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(_) => None,
        }
    }

    /// Deserializes a JSON payload into `T`. Text payloads are parsed as JSON.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        match self {
            Self::Json(v) => serde_json::from_value(v),
            Self::Text(s) => serde_json::from_str(&s),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why an attempt (or the whole call) failed.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Status(StatusCode),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("undecodable JSON body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The call was never attempted: bad URL or header.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A failed Xio call, carrying the cause of the last attempt.
#[derive(Debug, Error)]
#[error("xio: {method} {url} failed after {attempts} attempt(s): {kind}")]
pub struct Error {
    pub method: Method,
    pub url: String,
    pub attempts: u32,
    #[source]
    pub kind: ErrorKind,
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_))
    }

    /// The status of the last attempt, for HTTP-status failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self.kind {
            ErrorKind::Status(s) => Some(s),
            _ => None,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

/// The client. Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug, Default)]
pub struct Xio {
    client: reqwest::Client,
}

impl Xio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest` client (proxies, TLS roots, pool sizes).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub async fn get(&self, url: &str) -> Result<Payload, Error> {
        self.request(url, RequestOptions::default()).await
    }

    /// Performs the call, retrying failed attempts per the merged policy.
    pub async fn request(&self, url: &str, options: RequestOptions) -> Result<Payload, Error> {
        let method = options.method.unwrap_or(Method::Get);
        let fail = |attempts, kind| Error { method, url: url.to_owned(), attempts, kind };

        let wire_method = http::Method::try_from(method)
            .map_err(|e| fail(0, ErrorKind::InvalidRequest(e.to_string())))?;
        let target = parse_url(url).map_err(|kind| fail(0, kind))?;
        let headers = merge_headers(&options.headers).map_err(|kind| fail(0, kind))?;
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let policy = RetryPolicy::default().merge(&options.retry);

        let mut delays = policy.delays();
        let mut attempts = 0;
        loop {
            let outcome = self
                .attempt(&wire_method, &target, &headers, options.body.as_ref(), timeout)
                .await;
            attempts += 1;

            let kind = match outcome {
                Ok(payload) => {
                    debug!(%method, url, attempts, "xio call succeeded");
                    return Ok(payload);
                }
                Err(kind) => kind,
            };

            let Some(delay) = delays.next() else {
                warn!(%method, url, attempts, "xio call failed: {kind}");
                return Err(fail(attempts, kind));
            };
            warn!(
                %method,
                url,
                attempt = attempts,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "xio attempt failed, retrying: {kind}",
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        method: &http::Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&Bytes>,
        timeout: Duration,
    ) -> Result<Payload, ErrorKind> {
        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            builder = builder.body(body.clone());
        }

        let call = async move {
            let res = builder.send().await.map_err(ErrorKind::Transport)?;
            let status = res.status();
            if !status.is_success() {
                return Err(ErrorKind::Status(status));
            }
            let content_type = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let bytes = res.bytes().await.map_err(ErrorKind::Transport)?;
            Payload::decode(content_type.as_deref(), &bytes)
        };

        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| ErrorKind::Timeout(timeout))?
    }
}

/// One-off call with a fresh client.
pub async fn request(url: &str, options: RequestOptions) -> Result<Payload, Error> {
    Xio::new().request(url, options).await
}

fn parse_url(url: &str) -> Result<Url, ErrorKind> {
    if url.trim().is_empty() {
        return Err(ErrorKind::InvalidRequest("URL is required".to_owned()));
    }
    Url::parse(url).map_err(|e| ErrorKind::InvalidRequest(format!("bad URL `{url}`: {e}")))
}

fn merge_headers(overrides: &[(String, String)]) -> Result<HeaderMap, ErrorKind> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in overrides {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| ErrorKind::InvalidRequest(format!("bad header name `{name}`: {e}")))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| ErrorKind::InvalidRequest(format!("bad value for `{name}`: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
