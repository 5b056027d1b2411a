//! Path patterns with `:name` placeholders.
//!
//! A pattern is compiled once, at registration, into a list of segments.
//! Matching walks the request path segment by segment, so a pattern with
//! `n` segments only ever matches paths with exactly `n` segments.

use std::collections::HashMap;

use crate::handler::BoxedHandler;
use crate::method::Method;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `prefix:name`. Captures the non-empty rest of the segment after `prefix`.
    Param { prefix: String, name: String },
}

/// A compiled path pattern such as `/users/:id/posts/:postId`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|seg| match seg.split_once(':') {
                Some((prefix, name)) if !name.is_empty() => Segment::Param {
                    prefix: prefix.to_owned(),
                    name: name.to_owned(),
                },
                _ => Segment::Literal(seg.to_owned()),
            })
            .collect();
        Self { source: pattern.to_owned(), segments }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter names in declaration order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Matches the whole `path` (no query string) and returns the captures.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();
        let mut parts = path.split('/');

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(lit) => {
                    if lit != part {
                        return None;
                    }
                }
                Segment::Param { prefix, name } => {
                    let value = part.strip_prefix(prefix.as_str())?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.clone(), value.to_owned());
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

/// A registered `(method, pattern, handler)` triple.
pub(crate) struct Route {
    pub(crate) method: Method,
    pub(crate) pattern: PathPattern,
    pub(crate) handler: BoxedHandler,
}
