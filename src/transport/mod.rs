//! Transport pool boundary.
//!
//! The adapter never talks to sockets. It hands a [`PreparedRequest`] to a
//! [`TransportPool`] (or its async twin) and gets back either a completed
//! [`RawResponse`] or an opaque [`PromiseToken`] correlating a multiplexed
//! exchange still in flight. Connection establishment, TLS, wire framing,
//! keep-alive and per-exchange timeouts all live behind these traits.
//!
//! Two drain primitives exist:
//!
//! - [`TransportPool::poll_next`] hands out the next completed exchange in
//!   readiness order (used by drain-all gathering). It may block until
//!   something is ready and returns `None` only when nothing is in flight.
//! - [`TransportPool::poll_for`] retrieves one specific exchange by token
//!   (used by targeted gathering). An unknown token yields `Ok(None)`.
//!
//! The crate ships a scripted in-memory implementation in
//! [`memory`](crate::transport::memory) for tests and demos.

pub mod memory;

use std::fmt;
use std::io::Read;
use std::net::SocketAddr;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use uuid::Uuid;

use crate::error::TransportError;
use crate::options::{ClientCert, PostConnectionHook, UploadProgressHook, VerifyMode};
use crate::proxy::ProxySelection;
use crate::request::PreparedRequest;

/// Opaque correlation id for an in-flight multiplexed exchange.
///
/// Minted by the pool that accepted the exchange; the adapter only compares
/// and hashes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PromiseToken(Uuid);

impl PromiseToken {
    /// Mint a fresh token. Called by pool implementations only.
    pub fn new() -> Self {
        PromiseToken(Uuid::new_v4())
    }
}

impl Default for PromiseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PromiseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Application protocol negotiated for an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpProtocol {
    /// HTTP/1.1.
    H1,
    /// HTTP/2.
    H2,
    /// HTTP/3.
    H3,
}

/// Metadata about the connection an exchange went over.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Negotiated protocol.
    pub protocol: HttpProtocol,
    /// Remote peer, when known.
    pub peer_addr: Option<SocketAddr>,
    /// Whether the connection is TLS-protected.
    pub secure: bool,
}

impl ConnectionInfo {
    /// Plaintext HTTP/1.1 placeholder, for pools that do not track peers.
    pub fn unknown() -> Self {
        ConnectionInfo {
            protocol: HttpProtocol::H1,
            peer_addr: None,
            secure: false,
        }
    }
}

/// Body handle attached to a raw response.
///
/// Pools choose whichever variant matches how they buffer: an owned payload,
/// a blocking reader, or a channel of chunks for the async model.
pub enum RawBody {
    /// No body.
    Empty,
    /// Fully buffered payload.
    Full(Bytes),
    /// Incrementally readable payload (blocking pools).
    Reader(Box<dyn Read + Send>),
    /// Chunked payload fed by the pool (async pools).
    Channel(tokio::sync::mpsc::Receiver<Result<Bytes, TransportError>>),
}

impl RawBody {
    /// Drain the body to completion without awaiting. Only valid for the
    /// `Empty`, `Full` and `Reader` variants; a `Channel` body belongs to
    /// the async model.
    pub fn read_to_end_blocking(self) -> Result<Bytes, TransportError> {
        match self {
            RawBody::Empty => Ok(Bytes::new()),
            RawBody::Full(bytes) => Ok(bytes),
            RawBody::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| TransportError::Connect(format!("body read failed: {e}")))?;
                Ok(Bytes::from(buf))
            }
            RawBody::Channel(_) => Err(TransportError::Connect(
                "channel-backed body requires async consumption".into(),
            )),
        }
    }

    /// Drain the body to completion, awaiting chunk channels.
    pub async fn read_to_end(self) -> Result<Bytes, TransportError> {
        match self {
            RawBody::Channel(mut rx) => {
                let mut buf = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
            other => other.read_to_end_blocking(),
        }
    }
}

impl fmt::Debug for RawBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawBody::Empty => f.write_str("RawBody::Empty"),
            RawBody::Full(bytes) => write!(f, "RawBody::Full({} bytes)", bytes.len()),
            RawBody::Reader(_) => f.write_str("RawBody::Reader"),
            RawBody::Channel(_) => f.write_str("RawBody::Channel"),
        }
    }
}

/// A completed exchange as the transport saw it.
#[derive(Debug)]
pub struct RawResponse {
    /// Response status.
    pub status: StatusCode,
    /// Reason phrase, when the wire carried one.
    pub reason: Option<String>,
    /// Response headers.
    pub headers: HeaderMap,
    /// Correlation token for exchanges issued multiplexed.
    pub token: Option<PromiseToken>,
    /// Connection the exchange went over.
    pub conn: ConnectionInfo,
    /// Body handle.
    pub body: RawBody,
}

/// Outcome of issuing a request.
#[derive(Debug)]
pub enum Exchange {
    /// The pool completed the exchange inline.
    Completed(RawResponse),
    /// The exchange rides a multiplexed connection; resolve later with the
    /// token.
    Pending(PromiseToken),
}

/// Per-issue options forwarded to the pool.
#[derive(Clone, Default)]
pub struct IssueOptions {
    /// Ask for multiplexed transmission when the connection supports it.
    pub multiplex: bool,
    /// Proxy to route through, already validated by the adapter.
    pub proxy: Option<ProxySelection>,
    /// TLS verification inputs.
    pub verify: VerifyMode,
    /// Client certificate to present.
    pub client_cert: Option<ClientCert>,
    /// Invoked by the pool right after the connection is acquired.
    pub on_post_connection: Option<PostConnectionHook>,
    /// Upload progress callback.
    pub on_upload_body: Option<UploadProgressHook>,
}

impl fmt::Debug for IssueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueOptions")
            .field("multiplex", &self.multiplex)
            .field("proxy", &self.proxy.as_ref().map(|p| p.url.as_str().to_string()))
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}

/// Blocking transport pool contract.
pub trait TransportPool: Send + Sync {
    /// Issue a request. Returns a completed response, or a promise token
    /// when the exchange was accepted onto a multiplexed connection.
    fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError>;

    /// Hand out the next completed exchange, in readiness order. May block
    /// until one is ready; `Ok(None)` means nothing is in flight.
    fn poll_next(&self) -> Result<Option<RawResponse>, TransportError>;

    /// Retrieve the exchange correlated to `token`. `Ok(None)` means the
    /// pool does not recognize the token.
    fn poll_for(&self, token: &PromiseToken) -> Result<Option<RawResponse>, TransportError>;

    /// Number of connections the pool manages; feeds the adapter's
    /// in-flight ceiling.
    fn connection_count(&self) -> usize;

    /// Release every connection. Outstanding promises are forgotten.
    fn close(&self);
}

/// Cooperative transport pool contract; identical semantics to
/// [`TransportPool`] with suspension instead of blocking.
#[async_trait]
pub trait AsyncTransportPool: Send + Sync {
    /// See [`TransportPool::issue`].
    async fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError>;

    /// See [`TransportPool::poll_next`].
    async fn poll_next(&self) -> Result<Option<RawResponse>, TransportError>;

    /// See [`TransportPool::poll_for`].
    async fn poll_for(
        &self,
        token: &PromiseToken,
    ) -> Result<Option<RawResponse>, TransportError>;

    /// See [`TransportPool::connection_count`].
    fn connection_count(&self) -> usize;

    /// See [`TransportPool::close`].
    async fn close(&self);
}

impl<P: TransportPool + ?Sized> TransportPool for std::sync::Arc<P> {
    fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError> {
        (**self).issue(request, options)
    }

    fn poll_next(&self) -> Result<Option<RawResponse>, TransportError> {
        (**self).poll_next()
    }

    fn poll_for(&self, token: &PromiseToken) -> Result<Option<RawResponse>, TransportError> {
        (**self).poll_for(token)
    }

    fn connection_count(&self) -> usize {
        (**self).connection_count()
    }

    fn close(&self) {
        (**self).close()
    }
}

#[async_trait]
impl<P: AsyncTransportPool + ?Sized> AsyncTransportPool for std::sync::Arc<P> {
    async fn issue(
        &self,
        request: &PreparedRequest,
        options: &IssueOptions,
    ) -> Result<Exchange, TransportError> {
        (**self).issue(request, options).await
    }

    async fn poll_next(&self) -> Result<Option<RawResponse>, TransportError> {
        (**self).poll_next().await
    }

    async fn poll_for(
        &self,
        token: &PromiseToken,
    ) -> Result<Option<RawResponse>, TransportError> {
        (**self).poll_for(token).await
    }

    fn connection_count(&self) -> usize {
        (**self).connection_count()
    }

    async fn close(&self) {
        (**self).close().await
    }
}
