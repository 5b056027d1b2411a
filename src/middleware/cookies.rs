use std::collections::HashMap;

use crate::middleware::{Middleware, Next};
use crate::request::Request;

/// Cookies sent by the client, stored in the request extensions by
/// [`cookies()`].
///
/// ```rust,no_run
/// use enplex::Request;
/// use enplex::middleware::Cookies;
///
/// async fn whoami(req: Request) -> String {
///     let session = req.extensions().get::<Cookies>().and_then(|c| c.get("session"));
///     session.unwrap_or("anonymous").to_owned()
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookies(HashMap<String, String>);

impl Cookies {
    /// Parses a `Cookie` header value (`a=1; b=2`). Pairs without `=` are
    /// skipped; values are kept verbatim.
    pub fn parse(header: &str) -> Self {
        let pairs = header
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self(pairs)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parses the `Cookie` header into [`Cookies`] for later middleware and
/// handlers. Requests without the header get an empty set.
pub fn cookies() -> impl Middleware {
    |mut req: Request, next: Next| async move {
        let jar = req.header("cookie").map(Cookies::parse).unwrap_or_default();
        req.extensions_mut().insert(jar);
        next.run(req).await
    }
}
