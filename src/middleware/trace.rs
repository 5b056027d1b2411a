use std::time::Instant;

use tracing::{info, info_span, Instrument};

use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// One `request` span per request carrying method and path; logs status and
/// latency when the response comes back. Register it first so its span
/// covers everything after it.
pub fn trace() -> impl Middleware {
    |req: Request, next: Next| {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        async move {
            let started = Instant::now();
            let res = next.run(req).await;
            info!(
                status = res.status_code().as_u16(),
                latency_ms = started.elapsed().as_millis() as u64,
                "request completed",
            );
            res
        }
        .instrument(span)
    }
}
