//! Scripted in-memory transport pool.
//!
//! Implements both [`TransportPool`] and [`AsyncTransportPool`] over a FIFO
//! script of canned responses, so the adapter can be exercised end-to-end
//! (multiplexing, orphan races, redirect chains, failure mapping) without a
//! network. Each `issue` consumes the next script entry in order; entries
//! issued multiplexed complete into a ready queue drained by `poll_next` /
//! `poll_for`.
//!
//! # Examples
//!
//! ```
//! use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
//!
//! let pool = MemoryPool::with_connections(2);
//! pool.script(ScriptedResponse::new(200).with_body("hello"));
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use http::StatusCode;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::request::PreparedRequest;
use crate::transport::{
    AsyncTransportPool, ConnectionInfo, Exchange, HttpProtocol, IssueOptions, PromiseToken,
    RawBody, RawResponse, TransportPool,
};

/// How a script entry answers a multiplexed issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptMode {
    /// Honor the multiplex flag: pending token when requested, completed
    /// response otherwise.
    #[default]
    Multiplex,
    /// Always complete inline, even when multiplexing was requested. Used
    /// to simulate endpoints that do not support multiplexed transmission.
    Immediate,
}

/// One canned exchange.
#[derive(Debug)]
pub struct ScriptedResponse {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    mode: ScriptMode,
    token: Option<PromiseToken>,
    fail: Option<TransportError>,
}

impl ScriptedResponse {
    /// A new entry answering with `status`.
    pub fn new(status: u16) -> Self {
        ScriptedResponse {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            reason: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            mode: ScriptMode::default(),
            token: None,
            fail: None,
        }
    }

    /// Attach a response header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            self.headers.append(name, value);
        }
        self
    }

    /// Shorthand for a `Location` header.
    pub fn with_location(self, location: &str) -> Self {
        self.with_header(LOCATION.as_str(), location)
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a reason phrase.
    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    /// Complete inline even under a multiplexed issue.
    pub fn immediate(mut self) -> Self {
        self.mode = ScriptMode::Immediate;
        self
    }

    /// Correlate the completed exchange with a caller-chosen token instead
    /// of a freshly minted one.
    pub fn with_token(mut self, token: PromiseToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Fail the issue with a transport error instead of answering.
    pub fn failing(mut self, err: TransportError) -> Self {
        self.fail = Some(err);
        self
    }

    fn into_raw(self, token: Option<PromiseToken>, secure: bool) -> RawResponse {
        RawResponse {
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            token,
            conn: ConnectionInfo {
                protocol: HttpProtocol::H2,
                peer_addr: None,
                secure,
            },
            body: if self.body.is_empty() {
                RawBody::Empty
            } else {
                RawBody::Full(self.body)
            },
        }
    }
}

#[derive(Default)]
struct PoolState {
    script: VecDeque<ScriptedResponse>,
    ready: VecDeque<RawResponse>,
}

/// Scripted pool usable from both execution models.
pub struct MemoryPool {
    state: Mutex<PoolState>,
    connections: usize,
    closed: AtomicBool,
}

impl MemoryPool {
    /// A pool reporting `connections` managed connections.
    pub fn with_connections(connections: usize) -> Self {
        MemoryPool {
            state: Mutex::new(PoolState::default()),
            connections: connections.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Append a canned exchange; consumed by the next unanswered `issue`.
    pub fn script(&self, response: ScriptedResponse) {
        self.state.lock().script.push_back(response);
    }

    /// Push an already-completed raw response straight into the ready
    /// queue, bypassing `issue`. Used to stage orphan races: the adapter
    /// will drain a response whose token it never registered.
    pub fn inject_ready(&self, raw: RawResponse) {
        self.state.lock().ready.push_back(raw);
    }

    /// Completed exchanges waiting to be drained.
    pub fn ready_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    /// Script entries not yet consumed.
    pub fn script_count(&self) -> usize {
        self.state.lock().script.len()
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    fn issue_inner(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError> {
        self.ensure_open()?;

        let entry = self.state.lock().script.pop_front().ok_or_else(|| {
            TransportError::Connect(format!("no scripted response for {}", request.url))
        })?;

        if let Some(err) = entry.fail {
            return Err(err);
        }

        let secure = request.is_secure();
        if let Some(hook) = &options.on_post_connection {
            hook(&ConnectionInfo {
                protocol: HttpProtocol::H2,
                peer_addr: None,
                secure,
            });
        }
        if let (Some(progress), Some(body)) = (&options.on_upload_body, &request.body) {
            let total = body.len() as u64;
            progress(total, Some(total));
        }

        if options.multiplex && entry.mode == ScriptMode::Multiplex {
            let token = entry.token.clone().unwrap_or_default();
            let raw = entry.into_raw(Some(token.clone()), secure);
            self.state.lock().ready.push_back(raw);
            Ok(Exchange::Pending(token))
        } else {
            Ok(Exchange::Completed(entry.into_raw(None, secure)))
        }
    }

    fn poll_next_inner(&self) -> Result<Option<RawResponse>, TransportError> {
        self.ensure_open()?;
        Ok(self.state.lock().ready.pop_front())
    }

    fn poll_for_inner(
        &self,
        token: &PromiseToken,
    ) -> Result<Option<RawResponse>, TransportError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        let idx = state
            .ready
            .iter()
            .position(|raw| raw.token.as_ref() == Some(token));
        Ok(idx.and_then(|i| state.ready.remove(i)))
    }

    fn close_inner(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.script.clear();
        state.ready.clear();
    }
}

impl TransportPool for MemoryPool {
    fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError> {
        self.issue_inner(request, options)
    }

    fn poll_next(&self) -> Result<Option<RawResponse>, TransportError> {
        self.poll_next_inner()
    }

    fn poll_for(&self, token: &PromiseToken) -> Result<Option<RawResponse>, TransportError> {
        self.poll_for_inner(token)
    }

    fn connection_count(&self) -> usize {
        self.connections
    }

    fn close(&self) {
        self.close_inner();
    }
}

#[async_trait]
impl AsyncTransportPool for MemoryPool {
    async fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError> {
        self.issue_inner(request, options)
    }

    async fn poll_next(&self) -> Result<Option<RawResponse>, TransportError> {
        self.poll_next_inner()
    }

    async fn poll_for(
        &self,
        token: &PromiseToken,
    ) -> Result<Option<RawResponse>, TransportError> {
        self.poll_for_inner(token)
    }

    fn connection_count(&self) -> usize {
        self.connections
    }

    async fn close(&self) {
        self.close_inner();
    }
}
