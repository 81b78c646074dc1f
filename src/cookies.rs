//! Minimal cookie storage.
//!
//! The adapter extracts `Set-Cookie` headers into jars at resolution time;
//! matching, expiry and path semantics belong to whatever jar the embedding
//! session supplies. This holder only keeps the last value seen per
//! (domain, name) pair so tests and demos have something observable.

use std::collections::HashMap;

use http::header::{HeaderMap, SET_COOKIE};
use parking_lot::Mutex;
use url::Url;

/// A thread-safe, last-write-wins cookie holder.
///
/// Shared between the session layer and the adapter via `Arc`; the adapter
/// folds cookies from every resolved hop (including hook-produced history)
/// into the session-scoped jar it was handed.
#[derive(Debug, Default)]
pub struct CookieJar {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl CookieJar {
    /// Create an empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every `Set-Cookie` pair found in `headers` under the host of
    /// `url`. Malformed values are skipped.
    pub fn store_from_headers(&self, url: &Url, headers: &HeaderMap) {
        let Some(host) = url.host_str() else { return };
        let mut entries = self.entries.lock();
        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            // Only the name=value prefix matters here; attributes are the
            // session jar's concern.
            let pair = raw.split(';').next().unwrap_or("");
            if let Some((name, val)) = pair.split_once('=') {
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                entries.insert((host.to_string(), name.to_string()), val.trim().to_string());
            }
        }
    }

    /// Look up a cookie by host and name.
    pub fn get(&self, host: &str, name: &str) -> Option<String> {
        self.entries
            .lock()
            .get(&(host.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored cookies.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
