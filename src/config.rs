//! File-based configuration.
//!
//! Everything here has a programmatic equivalent; the file form exists so a
//! deployment can tune the bind address and client retry policy without a
//! rebuild.
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8080"
//! static_dir = "./public"
//!
//! [client]
//! timeout_ms = 5000
//!
//! [client.retry]
//! max_attempts = 5
//! delay_ms = 200
//! backoff = 1.5
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;
use crate::xio::{RequestOptions, RetryOverrides, RetryPolicy};

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: "0.0.0.0:3000".to_owned(), static_dir: None }
    }
}

/// Client defaults. Absent fields fall back to the built-in Xio defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub timeout_ms: Option<u64>,
    pub retry: RetryConfig,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
    pub backoff: Option<f64>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// The configured retry policy, merged over the defaults.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default().merge(&self.retry_overrides())
    }

    /// Request options carrying the configured timeout and retry overrides.
    pub fn client_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: self.client.timeout_ms.map(Duration::from_millis),
            retry: self.retry_overrides(),
            ..RequestOptions::default()
        }
    }

    fn retry_overrides(&self) -> RetryOverrides {
        let retry = &self.client.retry;
        RetryOverrides {
            max_attempts: retry.max_attempts,
            delay: retry.delay_ms.map(Duration::from_millis),
            backoff: retry.backoff,
        }
    }
}
