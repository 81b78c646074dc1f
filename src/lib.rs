#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # Weave-HTTP: Multiplexed Promise Resolution for HTTP Clients
//!
//! This crate implements the adapter layer of an HTTP client: it turns a
//! prepared request into a materialized response, optionally without
//! blocking the caller, by delegating connection establishment and
//! byte-level framing to an external transport pool.
//!
//! ## Overview
//!
//! When a request is issued over a multiplexed connection, the transport
//! returns an opaque *promise token* instead of a response. The adapter
//! registers the token against a still-lazy [`Response`] and hands that back
//! immediately; the caller keeps working. Later — explicitly, or implicitly
//! when backpressure kicks in — completed raw responses are *gathered* out
//! of the pool, matched to their registrations, and materialized in place,
//! following redirect chains transparently along the way.
//!
//! ## Key Features
//!
//! - **Lazy responses**: issue many requests over one connection, resolve
//!   them together later
//! - **Drain-all and targeted gathering**: resolve everything pending, or
//!   exactly the responses you care about
//! - **Transparent redirect chains**: the handle you hold ends up with the
//!   final hop's data and an ordered history of intermediate hops
//! - **Orphan reconciliation**: raw responses that complete before their
//!   registration is visible are buffered and retried, never lost
//! - **Backpressure**: a ceiling on in-flight promises bounds memory when
//!   callers issue faster than they gather
//! - **Two execution models**: a thread-based adapter and a cooperative
//!   async adapter with identical observable semantics
//!
//! ## Client Usage
//!
//! ```
//! use weave_http::adapter::WeaveAdapter;
//! use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
//! use weave_http::{PreparedRequest, SendOptions};
//!
//! # fn main() -> weave_http::Result<()> {
//! let pool = MemoryPool::with_connections(2);
//! pool.script(ScriptedResponse::new(200).with_body("alpha"));
//! pool.script(ScriptedResponse::new(200).with_body("beta"));
//!
//! let adapter = WeaveAdapter::new(pool);
//!
//! let first = adapter.send(
//!     PreparedRequest::get("https://example.com/a")?,
//!     SendOptions::multiplexed(),
//! )?;
//! let second = adapter.send(
//!     PreparedRequest::get("https://example.com/b")?,
//!     SendOptions::multiplexed(),
//! )?;
//! assert!(first.is_lazy() && second.is_lazy());
//!
//! adapter.gather_all(None)?;
//! assert_eq!(first.text()?, "alpha");
//! assert_eq!(second.text()?, "beta");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - **[adapter]** - the promise resolution engine (both execution models)
//! - **[transport]** - pool traits, raw responses, the in-memory transport
//! - **[error]** - error taxonomy and result handling
//! - **[cookies]** - minimal cookie holder fed at resolution time
//! - **[proxy]** - proxy selection and validation

pub mod adapter;
pub mod cookies;
pub mod error;
pub mod options;
pub mod proxy;
pub mod request;
pub mod response;
pub mod transport;

pub use adapter::{AsyncWeaveAdapter, DefaultRedirectPolicy, RedirectResolver, WeaveAdapter};
pub use cookies::CookieJar;
pub use error::{Result, TransportError, WeaveError};
pub use options::{AdapterConfig, SendOptions, VerifyMode};
pub use request::PreparedRequest;
pub use response::Response;
pub use transport::{ConnectionInfo, PromiseToken};

#[cfg(test)]
mod tests;
