//! Per-send options and adapter configuration.
//!
//! [`SendOptions`] carries everything a single `send` needs beyond the
//! request itself: body streaming, TLS verification inputs, proxies, the
//! multiplex flag, redirect policy knobs and the callback hooks. The
//! redirect machinery snapshots these options into its context so every hop
//! of a chain sees the same configuration.

use std::fmt;
use std::sync::Arc;

use crate::cookies::CookieJar;
use crate::error::Result;
use crate::proxy::ProxyMap;
use crate::request::PreparedRequest;
use crate::response::Response;
use crate::transport::ConnectionInfo;

/// Default redirect hop ceiling.
pub const DEFAULT_MAX_REDIRECTS: usize = 30;

/// Default multiplier applied to the pool's connection count to derive the
/// in-flight promise ceiling.
pub const DEFAULT_IN_FLIGHT_FACTOR: usize = 124;

/// Default orphan buffer capacity.
pub const DEFAULT_ORPHAN_CAPACITY: usize = 32;

/// Callback invoked right after the transport acquired a connection.
pub type PostConnectionHook = Arc<dyn Fn(&ConnectionInfo) + Send + Sync>;

/// Upload progress callback: `(bytes_sent, total_if_known)`.
pub type UploadProgressHook = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Certificate-revocation check, run on secure redirect hops when the
/// caller opted in. Receives the hop request and the fresh connection info.
pub type RevocationCheck =
    Arc<dyn Fn(&PreparedRequest, &ConnectionInfo) -> Result<()> + Send + Sync>;

/// Response-level hook, dispatched once a response is fully resolved.
pub type ResponseHook = Arc<dyn Fn(&Response) + Send + Sync>;

/// TLS verification mode for a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum VerifyMode {
    /// Verify against the platform trust store.
    #[default]
    Full,
    /// Verify against a caller-supplied CA bundle (path or PEM payload).
    CaBundle(String),
    /// Skip verification entirely.
    Disabled,
}

impl VerifyMode {
    /// True unless verification was explicitly disabled.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, VerifyMode::Disabled)
    }
}

/// Client certificate material (paths or PEM payloads; the transport
/// decides which it accepts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCert {
    /// Certificate chain.
    pub cert: String,
    /// Private key, when not bundled with the certificate.
    pub key: Option<String>,
    /// Key passphrase.
    pub password: Option<String>,
}

/// Options for a single `send` call.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// Defer body consumption to the caller instead of eagerly reading it
    /// at resolution time.
    pub stream: bool,
    /// TLS verification mode.
    pub verify: VerifyMode,
    /// Client certificate to present.
    pub client_cert: Option<ClientCert>,
    /// Proxy mapping consulted per request.
    pub proxies: ProxyMap,
    /// Request multiplexed transmission; the response comes back lazy when
    /// the transport honors it.
    pub multiplex: bool,
    /// Follow redirects transparently.
    pub allow_redirects: bool,
    /// Redirect hop ceiling. Zero means the ceiling is taken from
    /// [`DEFAULT_MAX_REDIRECTS`].
    pub max_redirects: usize,
    /// Session-scoped cookie jar; cookies from every resolved hop are
    /// folded into it.
    pub cookie_jar: Arc<CookieJar>,
    /// Connection-acquired callback.
    pub on_post_connection: Option<PostConnectionHook>,
    /// Upload progress callback.
    pub on_upload_body: Option<UploadProgressHook>,
    /// Opt-in revocation check for secure redirect hops.
    pub revocation_check: Option<RevocationCheck>,
    /// Response hooks, run on the fully resolved response.
    pub hooks: Vec<ResponseHook>,
}

impl SendOptions {
    /// Options with redirect following on and everything else default.
    pub fn new() -> Self {
        SendOptions {
            allow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            ..Default::default()
        }
    }

    /// Same as [`SendOptions::new`] with the multiplex flag raised.
    pub fn multiplexed() -> Self {
        SendOptions {
            multiplex: true,
            ..Self::new()
        }
    }

    /// Effective redirect ceiling.
    pub fn redirect_limit(&self) -> usize {
        if self.max_redirects == 0 {
            DEFAULT_MAX_REDIRECTS
        } else {
            self.max_redirects
        }
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("stream", &self.stream)
            .field("verify", &self.verify)
            .field("multiplex", &self.multiplex)
            .field("allow_redirects", &self.allow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("proxies", &self.proxies.len())
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

/// Adapter-level configuration.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Ceiling on concurrently pending multiplexed exchanges before a
    /// synchronous full drain kicks in. `None` derives
    /// `pool.connection_count() * DEFAULT_IN_FLIGHT_FACTOR`.
    pub max_in_flight_multiplexed: Option<usize>,
    /// Capacity of the orphan buffer; the oldest entry is evicted once the
    /// buffer is full.
    pub orphan_capacity: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            max_in_flight_multiplexed: None,
            orphan_capacity: DEFAULT_ORPHAN_CAPACITY,
        }
    }
}

impl AdapterConfig {
    /// Resolve the effective in-flight ceiling for a pool with
    /// `connections` connections.
    pub fn in_flight_ceiling(&self, connections: usize) -> usize {
        self.max_in_flight_multiplexed
            .unwrap_or_else(|| connections.max(1) * DEFAULT_IN_FLIGHT_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_redirects() {
        let opts = SendOptions::new();
        assert!(opts.allow_redirects);
        assert!(!opts.multiplex);
        assert_eq!(opts.redirect_limit(), DEFAULT_MAX_REDIRECTS);
    }

    #[test]
    fn multiplexed_raises_flag() {
        assert!(SendOptions::multiplexed().multiplex);
    }

    #[test]
    fn ceiling_derivation() {
        let config = AdapterConfig::default();
        assert_eq!(config.in_flight_ceiling(4), 4 * DEFAULT_IN_FLIGHT_FACTOR);
        // A zero-connection pool still gets a usable ceiling.
        assert_eq!(config.in_flight_ceiling(0), DEFAULT_IN_FLIGHT_FACTOR);

        let pinned = AdapterConfig {
            max_in_flight_multiplexed: Some(2),
            ..Default::default()
        };
        assert_eq!(pinned.in_flight_ceiling(64), 2);
    }

    #[test]
    fn verify_mode_enabled() {
        assert!(VerifyMode::Full.is_enabled());
        assert!(VerifyMode::CaBundle("/etc/ssl/ca.pem".into()).is_enabled());
        assert!(!VerifyMode::Disabled.is_enabled());
    }
}
