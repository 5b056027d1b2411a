use std::sync::Arc;

use http::StatusCode;

use crate::method::Method;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// CORS settings. The defaults allow any origin.
#[derive(Clone, Debug)]
pub struct CorsOptions {
    pub origin: String,
    pub methods: String,
    pub allowed_headers: String,
    pub exposed_headers: Option<String>,
    pub credentials: bool,
    /// `Access-Control-Max-Age` in seconds; `None` omits the header.
    pub max_age: Option<u64>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: "*".to_owned(),
            methods: "GET,HEAD,PUT,PATCH,POST,DELETE".to_owned(),
            allowed_headers: "*".to_owned(),
            exposed_headers: None,
            credentials: false,
            max_age: Some(86_400),
        }
    }
}

impl CorsOptions {
    fn apply(&self, res: &mut Response) {
        res.set_header("access-control-allow-origin", &self.origin)
            .set_header("access-control-allow-methods", &self.methods)
            .set_header("access-control-allow-headers", &self.allowed_headers);
        if let Some(exposed) = &self.exposed_headers {
            res.set_header("access-control-expose-headers", exposed);
        }
        if self.credentials {
            res.set_header("access-control-allow-credentials", "true");
        }
        if let Some(max_age) = self.max_age {
            res.set_header("access-control-max-age", &max_age.to_string());
        }
    }
}

/// Adds CORS headers to every response and answers `OPTIONS` preflights with
/// `204 No Content` without running the rest of the pipeline.
pub fn cors(options: CorsOptions) -> impl Middleware {
    let options = Arc::new(options);
    move |req: Request, next: Next| {
        let options = Arc::clone(&options);
        async move {
            let mut res = if req.method() == Method::Options {
                Response::status(StatusCode::NO_CONTENT)
            } else {
                next.run(req).await
            };
            options.apply(&mut res);
            res
        }
    }
}
