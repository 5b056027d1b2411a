//! Unified error type.

use thiserror::Error;

/// Boxed, thread-safe error used for handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by enplex's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values. This type covers infrastructure
/// failures and the failures that are routed to the error handlers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("http: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("unsupported method `{0}`")]
    UnsupportedMethod(String),

    /// A handler or middleware returned an error.
    #[error("handler failed: {0}")]
    Handler(BoxError),

    /// A handler or middleware panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("failed to read request body: {0}")]
    Body(BoxError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_owned()
        };
        Self::Panic(msg)
    }
}
