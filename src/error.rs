//! Error types and result handling.
//!
//! Two layers of errors exist in this crate:
//!
//! - [`TransportError`] is what a transport pool reports at the adapter
//!   boundary (connect failures, timeouts, TLS problems, ...). It never
//!   reaches the caller directly.
//! - [`WeaveError`] is the caller-facing taxonomy. Every transport failure is
//!   translated into it by the adapter, so the concrete pool implementation
//!   never leaks through the public surface.
//!
//! # Examples
//!
//! ```
//! use weave_http::{TransportError, WeaveError};
//!
//! let raw = TransportError::Timeout("read deadline exceeded".into());
//! let err = WeaveError::from_transport(raw);
//! assert!(matches!(err, WeaveError::Timeout(_)));
//! ```

use crate::request::PreparedRequest;

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WeaveError>;

/// Failure reported by a [`TransportPool`](crate::transport::TransportPool)
/// implementation.
///
/// This is the only error vocabulary a pool is allowed to speak. The adapter
/// maps each kind onto the public [`WeaveError`] taxonomy before anything
/// escapes to the caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// DNS, socket or protocol-level failure, including illegal header
    /// framing reported by the wire codec.
    #[error("connection failure: {0}")]
    Connect(String),

    /// The exchange exceeded a deadline enforced by the pool.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Certificate validation failed during the TLS handshake.
    #[error("certificate rejected: {0}")]
    Certificate(String),

    /// The proxy refused or broke the tunnel.
    #[error("proxy failure: {0}")]
    Proxy(String),

    /// The pool was asked to operate after being closed.
    #[error("transport pool is closed")]
    Closed,
}

/// The error taxonomy exposed to callers of the adapter.
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// DNS, socket or protocol-level trouble coming from the transport.
    /// Retry policy, if any, belongs to the pool; the adapter never retries.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport gave up waiting on the remote.
    #[error("timeout: {0}")]
    Timeout(String),

    /// TLS certificate verification failed.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Proxy-related failure, including a malformed proxy URL detected
    /// before any transport call was made.
    #[error("proxy error: {0}")]
    Proxy(String),

    /// A redirect chain exceeded the configured hop limit. Carries the
    /// follow-up request that would have been issued next, for diagnostics.
    #[error("exceeded {limit} redirects")]
    TooManyRedirects {
        /// The configured hop limit that was exceeded.
        limit: usize,
        /// The request computed for the hop that was refused.
        next: Option<Box<PreparedRequest>>,
    },

    /// Multiplexing protocol mismatch: a lazy exchange can no longer be
    /// resolved consistently. Raised when a redirect hop silently downgrades
    /// from lazy to resolved, when a response is inspected before it was
    /// gathered, or when a promise is presented to a pool that no longer
    /// recognizes it (typically: gathering after close).
    #[error("multiplexing error: {0}")]
    Multiplexing(String),

    /// Body decoding helper failure (`Response::json`).
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl WeaveError {
    /// Translate a transport-level failure into the public taxonomy.
    pub fn from_transport(err: TransportError) -> Self {
        match err {
            TransportError::Connect(msg) => WeaveError::Connection(msg),
            TransportError::Timeout(msg) => WeaveError::Timeout(msg),
            TransportError::Certificate(msg) => WeaveError::Certificate(msg),
            TransportError::Proxy(msg) => WeaveError::Proxy(msg),
            TransportError::Closed => {
                WeaveError::Multiplexing("transport pool is closed".into())
            }
        }
    }

    /// True when the error came from the connection layer rather than from
    /// adapter-level coordination.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WeaveError::Connection(_)
                | WeaveError::Timeout(_)
                | WeaveError::Certificate(_)
                | WeaveError::Proxy(_)
        )
    }
}

impl From<TransportError> for WeaveError {
    fn from(err: TransportError) -> Self {
        WeaveError::from_transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kinds_map_onto_taxonomy() {
        assert!(matches!(
            WeaveError::from_transport(TransportError::Connect("refused".into())),
            WeaveError::Connection(_)
        ));
        assert!(matches!(
            WeaveError::from_transport(TransportError::Timeout("read".into())),
            WeaveError::Timeout(_)
        ));
        assert!(matches!(
            WeaveError::from_transport(TransportError::Certificate("expired".into())),
            WeaveError::Certificate(_)
        ));
        assert!(matches!(
            WeaveError::from_transport(TransportError::Proxy("502 from tunnel".into())),
            WeaveError::Proxy(_)
        ));
    }

    #[test]
    fn closed_pool_is_a_multiplexing_error() {
        let err = WeaveError::from_transport(TransportError::Closed);
        assert!(matches!(err, WeaveError::Multiplexing(_)));
        assert!(!err.is_transport());
    }

    #[test]
    fn display_is_stable() {
        let err = WeaveError::TooManyRedirects { limit: 5, next: None };
        assert_eq!(err.to_string(), "exceeded 5 redirects");
    }
}
