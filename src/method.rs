//! HTTP method as a typed enum.
//!
//! Covers the RFC 9110 methods. Anything else arrives as
//! [`Method::Extension`], which never matches a route, so such
//! requests run the middleware and end on the not-found path.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
    /// Any method outside the list above (`PROPFIND`, `PURGE`, ...).
    Extension,
}

impl Method {
    /// Returns the uppercase wire representation (e.g. `"GET"`).
    /// [`Extension`](Self::Extension) reads as `"EXTENSION"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect   => "CONNECT",
            Self::Delete    => "DELETE",
            Self::Get       => "GET",
            Self::Head      => "HEAD",
            Self::Options   => "OPTIONS",
            Self::Patch     => "PATCH",
            Self::Post      => "POST",
            Self::Put       => "PUT",
            Self::Trace     => "TRACE",
            Self::Extension => "EXTENSION",
        }
    }

    /// Write methods: the router reads and parses the body before the handler runs.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    /// Safe methods, eligible for static-file serving.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }
}

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
/// Only the named methods parse; `Extension` is never produced here.
impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            other     => Err(Error::UnsupportedMethod(other.to_owned())),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = Error;

    fn try_from(m: &http::Method) -> Result<Self, Self::Error> {
        m.as_str().parse()
    }
}

impl TryFrom<Method> for http::Method {
    type Error = Error;

    fn try_from(m: Method) -> Result<Self, Self::Error> {
        Ok(match m {
            Method::Connect   => http::Method::CONNECT,
            Method::Delete    => http::Method::DELETE,
            Method::Get       => http::Method::GET,
            Method::Head      => http::Method::HEAD,
            Method::Options   => http::Method::OPTIONS,
            Method::Patch     => http::Method::PATCH,
            Method::Post      => http::Method::POST,
            Method::Put       => http::Method::PUT,
            Method::Trace     => http::Method::TRACE,
            Method::Extension => return Err(Error::UnsupportedMethod(m.to_string())),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
