//! Caller-facing response object.
//!
//! A [`Response`] is a cheap, clonable handle over a single state cell that
//! is either *lazy* (a promise token plus the redirect context needed to
//! resolve it later) or *resolved* (status, headers, body, history). The
//! state flips in one assignment under the cell lock, so no observer ever
//! sees a half-resolved response.
//!
//! While a response is lazy, accessors for resolved-only data return
//! [`WeaveError::Multiplexing`]; gather it first through the adapter that
//! issued it.
//!
//! # Examples
//!
//! ```ignore
//! let resp = adapter.send(request, SendOptions::multiplexed())?;
//! assert!(resp.is_lazy());
//! adapter.gather_all(None)?;
//! assert_eq!(resp.status()?, http::StatusCode::OK);
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::adapter::redirect::RedirectContext;
use crate::cookies::CookieJar;
use crate::error::{Result, WeaveError};
use crate::request::PreparedRequest;
use crate::transport::{ConnectionInfo, PromiseToken, RawBody};

/// Pending side of the state cell.
pub(crate) struct LazyState {
    pub(crate) token: PromiseToken,
    pub(crate) request: PreparedRequest,
    pub(crate) ctx: RedirectContext,
}

/// Materialized side of the state cell.
pub(crate) struct ResolvedState {
    pub(crate) status: StatusCode,
    pub(crate) reason: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) url: Url,
    pub(crate) request: PreparedRequest,
    pub(crate) elapsed: Duration,
    pub(crate) conn: Option<ConnectionInfo>,
    pub(crate) cookies: Arc<CookieJar>,
    pub(crate) body: BodyState,
    pub(crate) history: Vec<Response>,
    pub(crate) next_hint: Option<PreparedRequest>,
}

pub(crate) enum BodyState {
    /// Body handle not yet drained (stream mode).
    Unread(RawBody),
    /// Body fully consumed and cached.
    Complete(Bytes),
    /// Handle currently checked out by a consumer.
    Taken,
}

enum State {
    Lazy(LazyState),
    Resolved(Box<ResolvedState>),
}

/// An HTTP response, possibly still pending resolution.
#[derive(Clone)]
pub struct Response {
    cell: Arc<Mutex<State>>,
}

impl Response {
    pub(crate) fn new_lazy(token: PromiseToken, request: PreparedRequest, ctx: RedirectContext) -> Self {
        Response {
            cell: Arc::new(Mutex::new(State::Lazy(LazyState { token, request, ctx }))),
        }
    }

    pub(crate) fn new_resolved(state: ResolvedState) -> Self {
        Response {
            cell: Arc::new(Mutex::new(State::Resolved(Box::new(state)))),
        }
    }

    /// True while the response awaits gathering.
    pub fn is_lazy(&self) -> bool {
        matches!(&*self.cell.lock(), State::Lazy(_))
    }

    /// Identity comparison: do two handles point at the same response cell?
    pub fn ptr_eq(&self, other: &Response) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Response status.
    pub fn status(&self) -> Result<StatusCode> {
        self.with_resolved(|r| r.status)
    }

    /// Reason phrase, when the transport carried one.
    pub fn reason(&self) -> Result<Option<String>> {
        self.with_resolved(|r| r.reason.clone())
    }

    /// Response headers.
    pub fn headers(&self) -> Result<HeaderMap> {
        self.with_resolved(|r| r.headers.clone())
    }

    /// Final URL of this response.
    pub fn url(&self) -> Result<Url> {
        self.with_resolved(|r| r.url.clone())
    }

    /// Time from issue to materialization, measured on a monotonic clock.
    pub fn elapsed(&self) -> Result<Duration> {
        self.with_resolved(|r| r.elapsed)
    }

    /// Connection metadata observed by the transport.
    pub fn conn_info(&self) -> Result<Option<ConnectionInfo>> {
        self.with_resolved(|r| r.conn.clone())
    }

    /// Request-scoped cookie jar.
    pub fn cookies(&self) -> Result<Arc<CookieJar>> {
        self.with_resolved(|r| Arc::clone(&r.cookies))
    }

    /// The request this response answers. Available in both states.
    pub fn request(&self) -> PreparedRequest {
        match &*self.cell.lock() {
            State::Lazy(lazy) => lazy.request.clone(),
            State::Resolved(resolved) => resolved.request.clone(),
        }
    }

    /// Redirect hops that led here, in request order.
    pub fn history(&self) -> Result<Vec<Response>> {
        self.with_resolved(|r| r.history.clone())
    }

    /// True for 3xx responses carrying a `Location` header.
    pub fn is_redirect(&self) -> Result<bool> {
        self.with_resolved(|r| {
            r.status.is_redirection() && r.headers.contains_key(http::header::LOCATION)
        })
    }

    /// Follow-up request computed by the redirect resolver when redirect
    /// following was disabled. `None` on terminal responses.
    pub fn next_hint(&self) -> Result<Option<PreparedRequest>> {
        self.with_resolved(|r| r.next_hint.clone())
    }

    /// Full response body. Drains a blocking body handle on first call and
    /// caches the result; channel-backed bodies must go through
    /// [`Response::content_async`] or [`Response::bytes_stream`].
    pub fn content(&self) -> Result<Bytes> {
        let handle = self.checkout_body()?;
        match handle {
            CheckedOut::Cached(bytes) => Ok(bytes),
            CheckedOut::Handle(body) => {
                let read = body.read_to_end_blocking();
                self.checkin_body(read)
            }
        }
    }

    /// Full response body, awaiting channel-backed handles.
    pub async fn content_async(&self) -> Result<Bytes> {
        let handle = self.checkout_body()?;
        match handle {
            CheckedOut::Cached(bytes) => Ok(bytes),
            CheckedOut::Handle(body) => {
                let read = body.read_to_end().await;
                self.checkin_body(read)
            }
        }
    }

    /// Body decoded as UTF-8 text (lossy).
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.content()?).into_owned())
    }

    /// Body deserialized as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.content()?)?)
    }

    /// Stream of body chunks for responses gathered in stream mode over an
    /// async transport. Consumes the body handle.
    pub fn bytes_stream(&self) -> Result<BoxStream<'static, Result<Bytes>>> {
        let handle = self.checkout_body()?;
        match handle {
            CheckedOut::Cached(bytes) => {
                Ok(futures::stream::once(async move { Ok(bytes) }).boxed())
            }
            CheckedOut::Handle(RawBody::Channel(rx)) => Ok(ReceiverStream::new(rx)
                .map(|chunk| chunk.map_err(WeaveError::from))
                .boxed()),
            CheckedOut::Handle(other) => {
                // Blocking handles drain inline; there is nothing to stream.
                let read = other.read_to_end_blocking();
                let bytes = self.checkin_body(read)?;
                Ok(futures::stream::once(async move { Ok(bytes) }).boxed())
            }
        }
    }

    fn with_resolved<R>(&self, f: impl FnOnce(&ResolvedState) -> R) -> Result<R> {
        match &*self.cell.lock() {
            State::Resolved(resolved) => Ok(f(resolved)),
            State::Lazy(_) => Err(WeaveError::Multiplexing(
                "response is still lazy; gather it before inspecting".into(),
            )),
        }
    }

    fn checkout_body(&self) -> Result<CheckedOut> {
        let mut guard = self.cell.lock();
        match &mut *guard {
            State::Lazy(_) => Err(WeaveError::Multiplexing(
                "response is still lazy; gather it before reading the body".into(),
            )),
            State::Resolved(resolved) => match std::mem::replace(&mut resolved.body, BodyState::Taken) {
                BodyState::Complete(bytes) => {
                    resolved.body = BodyState::Complete(bytes.clone());
                    Ok(CheckedOut::Cached(bytes))
                }
                BodyState::Unread(handle) => Ok(CheckedOut::Handle(handle)),
                BodyState::Taken => Err(WeaveError::Multiplexing(
                    "response body is already being consumed".into(),
                )),
            },
        }
    }

    fn checkin_body(
        &self,
        read: std::result::Result<Bytes, crate::error::TransportError>,
    ) -> Result<Bytes> {
        let mut guard = self.cell.lock();
        if let State::Resolved(resolved) = &mut *guard {
            match read {
                Ok(bytes) => {
                    resolved.body = BodyState::Complete(bytes.clone());
                    Ok(bytes)
                }
                Err(err) => Err(WeaveError::from(err)),
            }
        } else {
            Err(WeaveError::Multiplexing(
                "response reverted to lazy while its body was read".into(),
            ))
        }
    }

    // --- crate-internal resolution machinery -----------------------------

    /// Token of a still-lazy response.
    pub(crate) fn promise_token(&self) -> Option<PromiseToken> {
        match &*self.cell.lock() {
            State::Lazy(lazy) => Some(lazy.token.clone()),
            State::Resolved(_) => None,
        }
    }

    /// Snapshot the lazy side without flipping the state.
    pub(crate) fn lazy_snapshot(&self) -> Option<(PromiseToken, PreparedRequest, RedirectContext)> {
        match &*self.cell.lock() {
            State::Lazy(lazy) => Some((lazy.token.clone(), lazy.request.clone(), lazy.ctx.clone())),
            State::Resolved(_) => None,
        }
    }

    /// Flip the cell to resolved in one assignment.
    pub(crate) fn complete(&self, state: ResolvedState) {
        let mut guard = self.cell.lock();
        debug_assert!(matches!(&*guard, State::Lazy(_)), "double materialization");
        *guard = State::Resolved(Box::new(state));
    }

    /// Record the follow-up request computed while redirect following was
    /// disabled.
    pub(crate) fn set_next_hint(&self, hint: PreparedRequest) {
        if let State::Resolved(resolved) = &mut *self.cell.lock() {
            resolved.next_hint = Some(hint);
        }
    }

    /// Append a redirect hop to this (resolved) response's history.
    pub(crate) fn push_history(&self, hop: Response) {
        if let State::Resolved(resolved) = &mut *self.cell.lock() {
            resolved.history.push(hop);
        }
    }

    /// Drop and return the most recent history entry.
    pub(crate) fn pop_history(&self) -> Option<Response> {
        match &mut *self.cell.lock() {
            State::Resolved(resolved) => resolved.history.pop(),
            State::Lazy(_) => None,
        }
    }

    /// Put `hop` at the front of the history sequence.
    pub(crate) fn prepend_history(&self, hop: Response) {
        if let State::Resolved(resolved) = &mut *self.cell.lock() {
            resolved.history.insert(0, hop);
        }
    }

    /// Exchange the full resolved payload (everything except `history`)
    /// between two resolved responses. A value exchange on owned state, so
    /// each caller-held handle keeps its identity while the data moves.
    pub(crate) fn exchange_payload(origin: &Response, leaf: &Response) {
        if Arc::ptr_eq(&origin.cell, &leaf.cell) {
            return;
        }
        // Lock in address order so concurrent payload exchanges cannot
        // deadlock; accessors only ever hold one cell lock.
        let (first, second) = if Arc::as_ptr(&origin.cell) < Arc::as_ptr(&leaf.cell) {
            (&origin.cell, &leaf.cell)
        } else {
            (&leaf.cell, &origin.cell)
        };
        let mut first_guard = first.lock();
        let mut second_guard = second.lock();
        if let (State::Resolved(a), State::Resolved(b)) =
            (&mut *first_guard, &mut *second_guard)
        {
            std::mem::swap(a, b);
            std::mem::swap(&mut a.history, &mut b.history);
        }
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.cell.lock() {
            State::Lazy(lazy) => f
                .debug_struct("Response")
                .field("lazy", &true)
                .field("token", &lazy.token.to_string())
                .finish_non_exhaustive(),
            State::Resolved(resolved) => f
                .debug_struct("Response")
                .field("lazy", &false)
                .field("status", &resolved.status)
                .field("url", &resolved.url.as_str())
                .field("history", &resolved.history.len())
                .finish_non_exhaustive(),
        }
    }
}

enum CheckedOut {
    Cached(Bytes),
    Handle(RawBody),
}
