//! Prepared request descriptor.
//!
//! A [`PreparedRequest`] is the immutable-enough unit of work handed to an
//! adapter: method, absolute URL, headers and an optional body. The adapter
//! references it (and clones it across redirect hops) but never mutates the
//! caller's copy.
//!
//! # Examples
//!
//! ```
//! use weave_http::PreparedRequest;
//! use http::Method;
//!
//! let req = PreparedRequest::new(Method::GET, "https://example.com/data")
//!     .unwrap()
//!     .with_header("accept", "application/json")
//!     .with_body(r#"{"probe": true}"#);
//! assert_eq!(req.method, Method::GET);
//! assert!(req.is_secure());
//! ```

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use url::Url;

use crate::error::{Result, WeaveError};

/// A fully prepared HTTP request, ready to be issued through a transport
/// pool.
///
/// Owned by the caller; the adapter works on clones. Connection metadata
/// observed while sending is surfaced on the resulting
/// [`Response`](crate::Response), not written back here.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Request method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl PreparedRequest {
    /// Build a request from a method and an absolute URL.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| WeaveError::Connection(format!("invalid url {url:?}: {e}")))?;
        Ok(PreparedRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// Shorthand for a bodyless GET.
    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::GET, url)
    }

    /// Attach a header, replacing any previous value under the same name.
    /// Invalid names or values are ignored rather than panicking; the
    /// transport rejects anything the wire cannot carry.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// True for `https` targets.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Host component of the target URL, if any.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_parts() {
        let req = PreparedRequest::new(Method::POST, "http://example.com/submit")
            .unwrap()
            .with_header("content-type", "application/json")
            .with_body("{}");
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url.path(), "/submit");
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");
        assert_eq!(req.body.as_deref(), Some(b"{}".as_ref()));
    }

    #[test]
    fn rejects_relative_url() {
        let err = PreparedRequest::get("/no-scheme").unwrap_err();
        assert!(matches!(err, WeaveError::Connection(_)));
    }

    #[test]
    fn secure_detection() {
        assert!(PreparedRequest::get("https://example.com/").unwrap().is_secure());
        assert!(!PreparedRequest::get("http://example.com/").unwrap().is_secure());
    }

    #[test]
    fn invalid_header_is_dropped() {
        let req = PreparedRequest::get("http://example.com/")
            .unwrap()
            .with_header("bad header name", "x");
        assert!(req.headers.is_empty());
    }
}
