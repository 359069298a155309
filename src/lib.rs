//! apigate - sidecar decision proxy with a windowed allow/deny cache.
//!
//! apigate sits between an application and a remote decision service and
//! answers allow/deny checks with sub-millisecond latency in the common case.
//! It does this by rebuilding a local decision cache on a fixed cadence,
//! bulk-querying the upstream for exactly the keys that were active in the
//! previous window.
//!
//! # Subsystems
//!
//! - **Decision cache engine** ([`engine`]): a time-phased cache lifecycle.
//!   Mid-window, a *prefetch* bulk-resolves every key tracked so far; at the
//!   window boundary, a *swap* atomically installs the prefetched map.
//! - **Pseudonymization** ([`pseudonym`]): emails leave the host only as
//!   keyed HMAC-SHA-256 tokens; user-agents are compressed to short
//!   xxHash-64 tokens.
//! - **Log shipper** ([`shipper`]): buffers per-request activity entries and
//!   bulk-ships them on a size threshold or periodic tick.
//! - **HTTP surface** ([`server`]): the JSON API the application calls.

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod pseudonym;
pub mod server;
pub mod shipper;
pub mod upstream;
