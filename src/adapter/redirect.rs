//! Redirect resolution.
//!
//! The adapter decides *when* to follow a redirect; *where* it goes and what
//! the follow-up request looks like is the [`RedirectResolver`]'s call. The
//! resolver must be a pure function of (resolved response, originating
//! request): the only state threaded across hops is the
//! [`RedirectContext`] the adapter carries by value.
//!
//! [`DefaultRedirectPolicy`] implements the conventional behavior: `3xx` +
//! `Location`, method demotion to GET on 303 (and on 301/302 for POST),
//! body dropped on demotion, and credential headers stripped when the hop
//! changes host.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{AUTHORIZATION, COOKIE, LOCATION, PROXY_AUTHORIZATION};
use http::{Method, StatusCode};

use crate::error::{Result, WeaveError};
use crate::options::SendOptions;
use crate::request::PreparedRequest;
use crate::response::Response;

/// Parameters threaded through one redirect chain.
///
/// Created at `send` time, cloned across hops with a refreshed start
/// instant, discarded when the chain settles.
#[derive(Clone)]
pub(crate) struct RedirectContext {
    /// Issue time of the current hop, on a monotonic clock.
    pub(crate) start: Instant,
    /// Hops already followed in this chain.
    pub(crate) redirect_count: usize,
    /// The response object the external caller is holding, once the chain
    /// grew past its first hop.
    pub(crate) origin: Option<Response>,
    /// Options snapshot every hop inherits.
    pub(crate) options: SendOptions,
}

impl RedirectContext {
    pub(crate) fn new(options: &SendOptions) -> Self {
        RedirectContext {
            start: Instant::now(),
            redirect_count: 0,
            origin: None,
            options: options.clone(),
        }
    }

    /// Elapsed time of the current hop.
    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Context for the next hop: same chain state, fresh clock.
    pub(crate) fn for_next_hop(&self) -> Self {
        let mut next = self.clone();
        next.start = Instant::now();
        next
    }
}

/// Decides whether a resolved response requires a follow-up request.
///
/// Implementations must be pure: same inputs, same answer, no retained
/// state.
pub trait RedirectResolver: Send + Sync {
    /// Return the follow-up request demanded by `response`, or `None` when
    /// the chain terminates here.
    fn next_request(
        &self,
        response: &Response,
        request: &PreparedRequest,
    ) -> Result<Option<PreparedRequest>>;
}

impl<T: RedirectResolver + ?Sized> RedirectResolver for Arc<T> {
    fn next_request(
        &self,
        response: &Response,
        request: &PreparedRequest,
    ) -> Result<Option<PreparedRequest>> {
        (**self).next_request(response, request)
    }
}

/// Conventional `Location`-driven redirect policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRedirectPolicy;

impl DefaultRedirectPolicy {
    fn demotes_to_get(status: StatusCode, method: &Method) -> bool {
        match status {
            StatusCode::SEE_OTHER => *method != Method::HEAD,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => *method == Method::POST,
            _ => false,
        }
    }
}

impl RedirectResolver for DefaultRedirectPolicy {
    fn next_request(
        &self,
        response: &Response,
        request: &PreparedRequest,
    ) -> Result<Option<PreparedRequest>> {
        let status = response.status()?;
        if !status.is_redirection() {
            return Ok(None);
        }

        let headers = response.headers()?;
        let Some(location) = headers.get(LOCATION) else {
            return Ok(None);
        };
        let location = location
            .to_str()
            .map_err(|_| WeaveError::Connection("redirect location is not valid ascii".into()))?;

        let base = response.url()?;
        let target = base
            .join(location)
            .map_err(|e| WeaveError::Connection(format!("invalid redirect location {location:?}: {e}")))?;

        let mut next = request.clone();
        let crossed_host = next.url.host_str() != target.host_str();
        next.url = target;

        if Self::demotes_to_get(status, &next.method) {
            next.method = Method::GET;
            next.body = None;
            next.headers.remove(http::header::CONTENT_LENGTH);
            next.headers.remove(http::header::CONTENT_TYPE);
        }

        if crossed_host {
            next.headers.remove(AUTHORIZATION);
            next.headers.remove(COOKIE);
            next.headers.remove(PROXY_AUTHORIZATION);
        }

        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieJar;
    use crate::response::{BodyState, ResolvedState};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};

    fn resolved(status: StatusCode, url: &str, location: Option<&str>) -> Response {
        let request = PreparedRequest::get(url).unwrap();
        let mut headers = HeaderMap::new();
        if let Some(loc) = location {
            headers.insert(LOCATION, HeaderValue::from_str(loc).unwrap());
        }
        Response::new_resolved(ResolvedState {
            status,
            reason: None,
            headers,
            url: request.url.clone(),
            request,
            elapsed: Duration::ZERO,
            conn: None,
            cookies: Arc::new(CookieJar::new()),
            body: BodyState::Complete(Bytes::new()),
            history: Vec::new(),
            next_hint: None,
        })
    }

    #[test]
    fn non_redirect_terminates() {
        let resp = resolved(StatusCode::OK, "http://example.com/a", None);
        let req = resp.request();
        assert!(DefaultRedirectPolicy
            .next_request(&resp, &req)
            .unwrap()
            .is_none());
    }

    #[test]
    fn redirect_without_location_terminates() {
        let resp = resolved(StatusCode::FOUND, "http://example.com/a", None);
        let req = resp.request();
        assert!(DefaultRedirectPolicy
            .next_request(&resp, &req)
            .unwrap()
            .is_none());
    }

    #[test]
    fn relative_location_joins_base() {
        let resp = resolved(
            StatusCode::FOUND,
            "http://example.com/a/b",
            Some("../next?x=1"),
        );
        let req = resp.request();
        let next = DefaultRedirectPolicy.next_request(&resp, &req).unwrap().unwrap();
        assert_eq!(next.url.as_str(), "http://example.com/next?x=1");
    }

    #[test]
    fn see_other_demotes_to_get_and_drops_body() {
        let resp = resolved(StatusCode::SEE_OTHER, "http://example.com/form", Some("/done"));
        let req = PreparedRequest::new(Method::POST, "http://example.com/form")
            .unwrap()
            .with_header("content-type", "application/json")
            .with_body("{}");
        let next = DefaultRedirectPolicy.next_request(&resp, &req).unwrap().unwrap();
        assert_eq!(next.method, Method::GET);
        assert!(next.body.is_none());
        assert!(!next.headers.contains_key(http::header::CONTENT_TYPE));
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let resp = resolved(
            StatusCode::TEMPORARY_REDIRECT,
            "http://example.com/upload",
            Some("/upload2"),
        );
        let req = PreparedRequest::new(Method::PUT, "http://example.com/upload")
            .unwrap()
            .with_body("data");
        let next = DefaultRedirectPolicy.next_request(&resp, &req).unwrap().unwrap();
        assert_eq!(next.method, Method::PUT);
        assert_eq!(next.body.as_deref(), Some(b"data".as_ref()));
    }

    #[test]
    fn cross_host_strips_credentials() {
        let resp = resolved(
            StatusCode::MOVED_PERMANENTLY,
            "http://example.com/secure",
            Some("http://other.example.net/landing"),
        );
        let req = PreparedRequest::get("http://example.com/secure")
            .unwrap()
            .with_header("authorization", "Bearer token")
            .with_header("cookie", "sid=abc");
        let next = DefaultRedirectPolicy.next_request(&resp, &req).unwrap().unwrap();
        assert!(!next.headers.contains_key(AUTHORIZATION));
        assert!(!next.headers.contains_key(COOKIE));
        assert_eq!(next.url.host_str(), Some("other.example.net"));
    }

    #[test]
    fn malformed_location_is_a_connection_error() {
        let resp = resolved(StatusCode::FOUND, "http://example.com/a", Some("http://["));
        let req = resp.request();
        let err = DefaultRedirectPolicy.next_request(&resp, &req).unwrap_err();
        assert!(matches!(err, WeaveError::Connection(_)));
    }

    #[test]
    fn hop_context_refreshes_clock_only() {
        let mut ctx = RedirectContext::new(&SendOptions::new());
        ctx.redirect_count = 3;
        let next = ctx.for_next_hop();
        assert_eq!(next.redirect_count, 3);
        assert!(next.start >= ctx.start);
    }
}
