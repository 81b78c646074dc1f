//! Multiplexed promise resolution engine.
//!
//! This module is the heart of the crate: the machinery that registers
//! requests as pending lazy responses, drains completed raw responses out of
//! the transport pool, matches them back to their registration, follows
//! redirect chains while preserving response identity, and reconciles raw
//! responses that arrive before their registration is visible.
//!
//! # Module Organization
//!
//! ```text
//! adapter/
//! ├── registry    - promise ledger and orphan buffer
//! ├── redirect    - redirect context, resolver trait, default policy
//! ├── blocking    - WeaveAdapter (thread model)
//! └── nonblocking - AsyncWeaveAdapter (cooperative model)
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`WeaveAdapter`] | Blocking adapter; any thread may send and gather |
//! | [`AsyncWeaveAdapter`] | Cooperative adapter over an async pool |
//! | [`RedirectResolver`] | Pluggable redirect decision function |
//! | [`DefaultRedirectPolicy`] | Conventional `Location`-driven policy |
//!
//! # Resolution Flow
//!
//! `send` issues the request through the pool. A multiplexed issue yields a
//! promise token; the still-lazy response registers under it and returns to
//! the caller immediately. `gather_all` (explicit, or triggered by the
//! in-flight ceiling) drains the pool: each completed raw response is looked
//! up in the ledger — matches materialize and run the redirect machine,
//! misses buffer as orphans and retry on every later cycle. Targeted
//! `gather` resolves exactly the requested responses plus the redirect
//! descendants they spawn.

pub(crate) mod registry;

pub mod blocking;
pub mod nonblocking;
pub mod redirect;

pub use blocking::WeaveAdapter;
pub use nonblocking::AsyncWeaveAdapter;
pub use redirect::{DefaultRedirectPolicy, RedirectResolver};
