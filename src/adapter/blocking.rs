//! Thread-based adapter.
//!
//! [`WeaveAdapter`] turns prepared requests into responses over a blocking
//! [`TransportPool`]. Requests issued with the multiplex flag come back
//! *lazy*: the exchange rides a shared connection and the response
//! materializes later, when the caller (or backpressure) gathers completed
//! exchanges out of the pool.
//!
//! Any thread may call [`send`](WeaveAdapter::send) and
//! [`gather_all`](WeaveAdapter::gather_all) concurrently: the promise ledger
//! and orphan buffer serialize internally, and whole gather passes serialize
//! on a dedicated mutex so two drains never interleave on the same raw
//! responses.
//!
//! # Examples
//!
//! ```
//! use weave_http::adapter::WeaveAdapter;
//! use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
//! use weave_http::{PreparedRequest, SendOptions};
//!
//! let pool = MemoryPool::with_connections(2);
//! pool.script(ScriptedResponse::new(200).with_body("hello"));
//!
//! let adapter = WeaveAdapter::new(pool);
//! let resp = adapter
//!     .send(
//!         PreparedRequest::get("https://example.com/data").unwrap(),
//!         SendOptions::multiplexed(),
//!     )
//!     .unwrap();
//! assert!(resp.is_lazy());
//!
//! adapter.gather_all(None).unwrap();
//! assert_eq!(resp.status().unwrap(), http::StatusCode::OK);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::adapter::redirect::{DefaultRedirectPolicy, RedirectContext, RedirectResolver};
use crate::adapter::registry::{OrphanBuffer, PromiseLedger};
use crate::cookies::CookieJar;
use crate::error::{Result, WeaveError};
use crate::options::{AdapterConfig, PostConnectionHook, SendOptions};
use crate::proxy::ProxySelection;
use crate::request::PreparedRequest;
use crate::response::{BodyState, ResolvedState, Response};
use crate::transport::{Exchange, IssueOptions, RawResponse, TransportPool};

/// Blocking HTTP adapter with multiplexed promise resolution.
pub struct WeaveAdapter<P: TransportPool> {
    pool: P,
    resolver: Arc<dyn RedirectResolver>,
    ledger: PromiseLedger,
    orphans: OrphanBuffer,
    gather_lock: Mutex<()>,
    proxies: Mutex<HashMap<String, ProxySelection>>,
    max_in_flight: usize,
    closed: AtomicBool,
}

impl<P: TransportPool> WeaveAdapter<P> {
    /// Adapter with the default configuration and redirect policy.
    pub fn new(pool: P) -> Self {
        Self::with_config(pool, AdapterConfig::default())
    }

    /// Adapter with an explicit configuration.
    pub fn with_config(pool: P, config: AdapterConfig) -> Self {
        let max_in_flight = config.in_flight_ceiling(pool.connection_count());
        WeaveAdapter {
            pool,
            resolver: Arc::new(DefaultRedirectPolicy),
            ledger: PromiseLedger::new(),
            orphans: OrphanBuffer::new(config.orphan_capacity),
            gather_lock: Mutex::new(()),
            proxies: Mutex::new(HashMap::new()),
            max_in_flight,
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the redirect resolver.
    pub fn with_resolver(mut self, resolver: impl RedirectResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Number of promises still pending resolution.
    pub fn pending_promises(&self) -> usize {
        self.ledger.len()
    }

    /// Send a prepared request.
    ///
    /// With `options.multiplex` set and a transport that honors it, the
    /// returned response is lazy and resolves on a later gather. Otherwise
    /// the response comes back fully materialized.
    pub fn send(&self, request: PreparedRequest, options: SendOptions) -> Result<Response> {
        self.ensure_open()?;

        // Bound in-flight promises before issuing another multiplexed
        // exchange; a caller outpacing its gathers drains synchronously.
        if options.multiplex && self.ledger.len() >= self.max_in_flight {
            debug!(
                pending = self.ledger.len(),
                ceiling = self.max_in_flight,
                "in-flight ceiling reached; draining before issuing"
            );
            self.gather_all(None)?;
        }

        self.send_inner(request, RedirectContext::new(&options))
    }

    /// Drain completed exchanges until the transport has nothing ready and
    /// the ledger is empty. `max_fetch` bounds how many raw responses are
    /// consumed. A no-op when nothing is pending.
    pub fn gather_all(&self, max_fetch: Option<usize>) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.gather_lock.lock();
        if self.ledger.is_empty() {
            return Ok(());
        }
        self.drain_all(max_fetch)
    }

    /// Resolve exactly the given responses (plus any redirect descendants
    /// they spawn). Already-resolved entries are skipped. With an empty
    /// target list this degrades to [`gather_all`](Self::gather_all).
    pub fn gather(&self, targets: &[Response], max_fetch: Option<usize>) -> Result<()> {
        self.ensure_open()?;
        if targets.is_empty() {
            return self.gather_all(max_fetch);
        }
        let _guard = self.gather_lock.lock();
        if self.ledger.is_empty() {
            return Ok(());
        }
        self.gather_targets(targets.to_vec(), max_fetch)
    }

    /// Release the transport pool and every proxy handle. Outstanding lazy
    /// responses are forgotten; gathering them afterwards fails with a
    /// multiplexing error.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Wait out any in-flight gather pass before tearing down its state.
        let _guard = self.gather_lock.lock();
        self.pool.close();
        self.proxies.lock().clear();
        self.ledger.clear();
        self.orphans.clear();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(WeaveError::Multiplexing("adapter is closed".into()))
        } else {
            Ok(())
        }
    }

    fn send_inner(&self, request: PreparedRequest, ctx: RedirectContext) -> Result<Response> {
        let issue_options = self.issue_options(&request, &ctx)?;

        match self.pool.issue(&request, &issue_options)? {
            Exchange::Pending(token) => {
                let response = Response::new_lazy(token.clone(), request, ctx);
                self.ledger.register(token, response.clone());
                Ok(response)
            }
            Exchange::Completed(raw) => self.materialize_plain(request, raw, &ctx),
        }
    }

    fn issue_options(&self, request: &PreparedRequest, ctx: &RedirectContext) -> Result<IssueOptions> {
        let proxy = self.cached_proxy(request, &ctx.options.proxies)?;
        Ok(IssueOptions {
            multiplex: ctx.options.multiplex,
            proxy,
            verify: ctx.options.verify.clone(),
            client_cert: ctx.options.client_cert.clone(),
            on_post_connection: ctx.options.on_post_connection.clone(),
            on_upload_body: ctx.options.on_upload_body.clone(),
        })
    }

    /// Validate and cache the proxy applying to `request`, if any. The
    /// adapter owns its proxy handles for its lifetime; `close` drops them.
    fn cached_proxy(
        &self,
        request: &PreparedRequest,
        proxies: &crate::proxy::ProxyMap,
    ) -> Result<Option<ProxySelection>> {
        let Some(raw) = crate::proxy::select_proxy(&request.url, proxies) else {
            return Ok(None);
        };
        let raw = raw.to_string();
        if let Some(cached) = self.proxies.lock().get(&raw) {
            return Ok(Some(cached.clone()));
        }
        let selection = crate::proxy::prepare_proxy(&raw)?;
        self.proxies.lock().insert(raw, selection.clone());
        Ok(Some(selection))
    }

    /// One full drain-all pass structure: inner loop consumes ready raw
    /// responses (reconcilable orphans first), outer loop repeats until the
    /// ledger empties or a pass makes no progress.
    fn drain_all(&self, mut budget: Option<usize>) -> Result<()> {
        loop {
            let mut progressed = false;
            loop {
                if budget == Some(0) {
                    return Ok(());
                }

                let raw = match self.orphans.take_matching(&self.ledger) {
                    Some(raw) => Some(raw),
                    None => self.pool.poll_next().map_err(WeaveError::from)?,
                };
                let Some(raw) = raw else { break };

                if let Some(b) = budget.as_mut() {
                    *b -= 1;
                }
                progressed = true;

                let Some(token) = raw.token.clone() else {
                    warn!("transport yielded a completed exchange without a token; dropping");
                    continue;
                };

                match self.ledger.lookup(&token) {
                    Some(response) => {
                        self.materialize(response, raw)?;
                    }
                    None => {
                        // Registration may not be visible yet; benign race.
                        debug!(%token, "completed exchange has no registration; buffering as orphan");
                        self.orphans.push(raw);
                    }
                }
            }

            if self.ledger.is_empty() {
                return Ok(());
            }
            if !progressed {
                debug!(
                    pending = self.ledger.len(),
                    "transport has nothing ready for the remaining promises; stopping drain"
                );
                return Ok(());
            }
        }
    }

    fn gather_targets(&self, mut targets: Vec<Response>, mut budget: Option<usize>) -> Result<()> {
        // Chained redirects surface as new targets; keep going until a
        // round produces none.
        while !targets.is_empty() {
            let mut follow_ups = Vec::new();
            for response in targets.drain(..) {
                if budget == Some(0) {
                    return Ok(());
                }
                let Some(token) = response.promise_token() else {
                    continue; // already resolved
                };
                let raw = self.pool.poll_for(&token).map_err(WeaveError::from)?;
                let Some(raw) = raw else {
                    return Err(WeaveError::Multiplexing(
                        "transport pool did not recognize the promise; \
                         was the session closed before gathering?"
                            .into(),
                    ));
                };
                if let Some(b) = budget.as_mut() {
                    *b -= 1;
                }
                if let Some(next) = self.materialize(response, raw)? {
                    follow_ups.push(next);
                }
            }
            targets = follow_ups;
        }
        Ok(())
    }

    /// Materialize a lazy response from its raw transport counterpart and
    /// run the redirect state machine. Returns the follow-up lazy response
    /// when the chain advanced by one hop.
    fn materialize(&self, response: Response, raw: RawResponse) -> Result<Option<Response>> {
        let Some((token, request, ctx)) = response.lazy_snapshot() else {
            return Err(WeaveError::Multiplexing(
                "received a completion for an already resolved response".into(),
            ));
        };

        let cookies = Arc::new(CookieJar::new());
        cookies.store_from_headers(&request.url, &raw.headers);
        ctx.options.cookie_jar.store_from_headers(&request.url, &raw.headers);

        response.complete(ResolvedState {
            status: raw.status,
            reason: raw.reason,
            headers: raw.headers,
            url: request.url.clone(),
            request: request.clone(),
            elapsed: ctx.elapsed(),
            conn: Some(raw.conn),
            cookies,
            body: BodyState::Unread(raw.body),
            history: Vec::new(),
            next_hint: None,
        });

        if !ctx.options.allow_redirects {
            // Consult the resolver once so the caller can see where the
            // chain would have gone, then terminate.
            if let Some(hint) = self.resolver.next_request(&response, &request)? {
                response.set_next_hint(hint);
            }
            self.finish_resolved(&response, &ctx)?;
            self.ledger.remove(&token);
            return Ok(None);
        }

        if let Some(next_request) = self.resolver.next_request(&response, &request)? {
            let hop_count = ctx.redirect_count + 1;
            let limit = ctx.options.redirect_limit();
            if hop_count > limit {
                self.ledger.remove(&token);
                return Err(WeaveError::TooManyRedirects {
                    limit,
                    next: Some(Box::new(next_request)),
                });
            }

            self.ledger.remove(&token);

            let origin = ctx.origin.clone().unwrap_or_else(|| response.clone());
            let mut hop_ctx = ctx.for_next_hop();
            hop_ctx.redirect_count = hop_count;
            hop_ctx.origin = Some(origin.clone());
            hop_ctx.options.on_post_connection =
                self.hop_post_connection(&next_request, &ctx.options);

            debug!(
                hop = hop_count,
                target = %next_request.url,
                "following redirect on multiplexed exchange"
            );

            let next_response = self.send_inner(next_request, hop_ctx)?;
            if !next_response.is_lazy() {
                return Err(WeaveError::Multiplexing(
                    "a multiplexed exchange redirected to an endpoint that answered \
                     without multiplexing; mixed modes across a redirect hop are unsupported"
                        .into(),
                ));
            }

            origin.push_history(next_response.clone());
            return Ok(Some(next_response));
        }

        // Chain settled here. If it grew past its first hop, move the final
        // payload onto the handle the caller is holding and reorder history
        // into request order.
        if let Some(origin) = ctx.origin.clone() {
            if let Some(leaf) = origin.pop_history() {
                Response::exchange_payload(&origin, &leaf);
                origin.prepend_history(leaf);
            }
            self.finish_resolved(&origin, &ctx)?;
        } else {
            self.finish_resolved(&response, &ctx)?;
        }

        self.ledger.remove(&token);
        Ok(None)
    }

    /// Non-multiplexed completion path: no registration, no redirect
    /// machinery, just a materialized response.
    fn materialize_plain(
        &self,
        request: PreparedRequest,
        raw: RawResponse,
        ctx: &RedirectContext,
    ) -> Result<Response> {
        let cookies = Arc::new(CookieJar::new());
        cookies.store_from_headers(&request.url, &raw.headers);
        ctx.options.cookie_jar.store_from_headers(&request.url, &raw.headers);

        let response = Response::new_resolved(ResolvedState {
            status: raw.status,
            reason: raw.reason,
            headers: raw.headers,
            url: request.url.clone(),
            request,
            elapsed: ctx.elapsed(),
            conn: Some(raw.conn),
            cookies,
            body: BodyState::Unread(raw.body),
            history: Vec::new(),
            next_hint: None,
        });

        self.finish_resolved(&response, ctx)?;
        Ok(response)
    }

    /// Post-resolution tail: response hooks, then eager body consumption
    /// unless the caller asked to stream. Cookies were already extracted
    /// into both jars hop by hop, in chain order.
    fn finish_resolved(&self, response: &Response, ctx: &RedirectContext) -> Result<()> {
        for hook in &ctx.options.hooks {
            hook(response);
        }

        if !ctx.options.stream {
            response.content()?;
        }
        Ok(())
    }

    /// Hook installed on redirect hops: forwards connection info to the
    /// caller's hook and runs the revocation check when the hop target is
    /// secure and verification is on.
    fn hop_post_connection(
        &self,
        next_request: &PreparedRequest,
        options: &SendOptions,
    ) -> Option<PostConnectionHook> {
        let forward = options.on_post_connection.clone();
        let revocation = if next_request.is_secure() && options.verify.is_enabled() {
            options.revocation_check.clone()
        } else {
            None
        };

        if forward.is_none() && revocation.is_none() {
            return None;
        }

        let hop_request = next_request.clone();
        Some(Arc::new(move |info: &crate::transport::ConnectionInfo| {
            if let Some(forward) = &forward {
                forward(info);
            }
            if let Some(check) = &revocation {
                if let Err(err) = check(&hop_request, info) {
                    warn!(error = %err, url = %hop_request.url, "revocation check failed on redirect hop");
                }
            }
        }))
    }
}
