//! Pending-promise bookkeeping.
//!
//! [`PromiseLedger`] is the single source of truth for "what is still
//! pending" on one adapter instance: an opaque token maps to the lazy
//! [`Response`] that registered it. Insert and remove happen exactly once
//! per token; violating that is an implementation bug and panics rather
//! than being surfaced as a recoverable error.
//!
//! [`OrphanBuffer`] holds raw responses that arrived before their token was
//! registered. Orphans are retried against the ledger on every drain cycle
//! and consumed the first cycle they become resolvable. The buffer is
//! bounded: when full, the oldest orphan is evicted with a warning.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::warn;

use crate::response::Response;
use crate::transport::{PromiseToken, RawResponse};

/// Token → lazy response registry, scoped to one adapter instance.
///
/// All operations are short critical sections behind an internal mutex, safe
/// for concurrent senders while a gather is in progress.
#[derive(Default)]
pub(crate) struct PromiseLedger {
    entries: Mutex<HashMap<PromiseToken, Response>>,
}

impl PromiseLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a pending response under its token.
    ///
    /// # Panics
    ///
    /// Panics when the token is already present: tokens are unique per
    /// in-flight exchange, so a duplicate means the adapter (or the pool)
    /// broke its contract.
    pub(crate) fn register(&self, token: PromiseToken, response: Response) {
        let previous = self.entries.lock().insert(token.clone(), response);
        assert!(
            previous.is_none(),
            "promise token {token} registered twice"
        );
    }

    /// Remove and return the entry for `token`.
    ///
    /// # Panics
    ///
    /// Panics when the token is absent; removal is only legal exactly once,
    /// at the moment the response resolves or hands off to a successor.
    pub(crate) fn remove(&self, token: &PromiseToken) -> Response {
        self.entries
            .lock()
            .remove(token)
            .unwrap_or_else(|| panic!("promise token {token} removed without registration"))
    }

    /// Non-destructive lookup.
    pub(crate) fn lookup(&self, token: &PromiseToken) -> Option<Response> {
        self.entries.lock().get(token).cloned()
    }

    pub(crate) fn contains(&self, token: &PromiseToken) -> bool {
        self.entries.lock().contains_key(token)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry (adapter close).
    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Bounded arrival-ordered buffer of unmatched raw responses.
pub(crate) struct OrphanBuffer {
    entries: Mutex<VecDeque<RawResponse>>,
    capacity: usize,
}

impl OrphanBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        OrphanBuffer {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Buffer a raw response whose token is not yet registered. Evicts the
    /// oldest orphan when the buffer is full.
    pub(crate) fn push(&self, raw: RawResponse) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    token = ?evicted.token,
                    "orphan buffer full; evicting oldest unmatched response"
                );
            }
        }
        entries.push_back(raw);
    }

    /// Remove and return the first orphan whose token is now present in the
    /// ledger; arrival order decides priority.
    pub(crate) fn take_matching(&self, ledger: &PromiseLedger) -> Option<RawResponse> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|raw| {
            raw.token
                .as_ref()
                .is_some_and(|token| ledger.contains(token))
        })?;
        entries.remove(idx)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }
}
