use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::StatusCode;
use tracing::{debug, warn};

use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Sliding-window limit: at most `max` requests per client within `window`.
#[derive(Clone, Copy, Debug)]
pub struct RateLimit {
    pub window: Duration,
    pub max: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self { window: Duration::from_secs(60), max: 100 }
    }
}

/// Per-client request log shared by every connection task.
///
/// Clients whose hits have all left the window are dropped from the map by a
/// sweep that runs at most once per window.
pub struct RateLimiter {
    limit: RateLimit,
    hits: DashMap<String, VecDeque<Instant>>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(limit: RateLimit) -> Self {
        Self { limit, hits: DashMap::new(), last_sweep: Mutex::new(Instant::now()) }
    }

    /// Records a hit for `client` at `now`. Returns `false` when the client
    /// is over the limit; rejected hits are not recorded.
    pub fn check(&self, client: &str, now: Instant) -> bool {
        self.sweep(now);

        let mut log = self.hits.entry(client.to_owned()).or_default();
        while log.front().is_some_and(|&hit| self.expired(hit, now)) {
            log.pop_front();
        }
        if log.len() >= self.limit.max {
            return false;
        }
        log.push_back(now);
        true
    }

    /// Number of clients currently tracked.
    pub fn tracked(&self) -> usize {
        self.hits.len()
    }

    fn expired(&self, hit: Instant, now: Instant) -> bool {
        now.saturating_duration_since(hit) > self.limit.window
    }

    fn sweep(&self, now: Instant) {
        // Another task is already sweeping.
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) < self.limit.window {
            return;
        }
        *last = now;
        let before = self.hits.len();
        self.hits
            .retain(|_, log| log.back().is_some_and(|&hit| !self.expired(hit, now)));
        debug!(evicted = before.saturating_sub(self.hits.len()), "rate limiter swept");
    }
}

/// The client key: first `x-forwarded-for` entry, else the peer IP.
fn client_key(req: &Request) -> String {
    req.header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_owned())
        .or_else(|| req.remote_addr().map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Rejects clients over the limit with `429` and
/// `{"error":"Too many requests"}`.
pub fn rate_limit(limit: RateLimit) -> impl Middleware {
    let limiter = Arc::new(RateLimiter::new(limit));
    move |req: Request, next: Next| {
        let limiter = Arc::clone(&limiter);
        async move {
            let client = client_key(&req);
            if !limiter.check(&client, Instant::now()) {
                warn!(client = %client, "rate limit exceeded");
                return Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .json(&serde_json::json!({ "error": "Too many requests" }));
            }
            next.run(req).await
        }
    }
}
