//! Windowed decision cache engine.
//!
//! The engine answers allow/deny checks from a local cache that is rebuilt
//! on a fixed cadence. Each window it tracks every opaque key it sees; a
//! *prefetch* fires [`FETCH_OFFSET`](crate::config::FETCH_OFFSET) before the
//! window boundary and bulk-resolves the tracked keys into a pending map; at
//! the boundary a *swap* atomically installs the pending map as the current
//! cache. Separating the two gives the batch call a budget to complete, so
//! swaps install a populated cache instead of triggering a thundering herd
//! of misses.
//!
//! # Cache semantics
//!
//! The cache maps opaque keys to booleans; absence means *unknown*, not
//! *deny*. A check consults every non-empty key of the request:
//!
//! 1. any known key with a deny verdict blocks the request;
//! 2. all keys known and allowed lets it through;
//! 3. anything else is a miss, resolved synchronously through the batch
//!    endpoint and written back into the current window's cache.
//!
//! Until the first swap the engine is in *warmup* and allows everything
//! (while still tracking keys so the first prefetch has work to do).
//!
//! # Locking
//!
//! One readers/writer lock guards the maps, the tracking set, and the warmup
//! flag. It is never held across an await: the batch call on a miss runs
//! between a read and a write critical section, and the prefetch network
//! call runs in its own task. Request counters are atomics updated outside
//! the lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::GateResult;
use crate::models::{CheckRequest, CheckResponse};
use crate::pseudonym::{Pseudonymizer, compress_user_agent};
use crate::upstream::UpstreamClient;

/// Decision cache engine. One per process, shared behind an [`Arc`].
pub struct DecisionEngine {
    config: Arc<Config>,
    upstream: UpstreamClient,
    pseudonymizer: Pseudonymizer,
    state: RwLock<EngineState>,
    // Window telemetry, read and zeroed at swap time.
    total_requests: AtomicU64,
    live_checks: AtomicU64,
}

/// Mutable engine state, guarded by the engine's readers/writer lock.
struct EngineState {
    /// Decisions served during the current window.
    current: HashMap<String, bool>,
    /// Decisions staged by the last prefetch, installed at the next swap.
    pending: Option<HashMap<String, bool>>,
    /// Keys observed this window, drained at prefetch time.
    tracked: HashSet<String>,
    /// True until the first swap, then false forever.
    warmup: bool,
    /// Size of the last prefetch batch, for the window-stats line.
    last_batch_size: u64,
}

/// Request with its identity fields resolved to cacheable form: the email is
/// already a pseudonymized token, the user-agent stays raw and is compressed
/// only when used as a key.
struct ResolvedRequest {
    ip: String,
    email_token: String,
    user_agent: String,
}

impl ResolvedRequest {
    /// The opaque keys this request contributes: IP literal, email token,
    /// compressed user-agent. Order mirrors the fields; empties are skipped.
    fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(3);
        if !self.ip.is_empty() {
            keys.push(self.ip.clone());
        }
        if !self.email_token.is_empty() {
            keys.push(self.email_token.clone());
        }
        if !self.user_agent.is_empty() {
            keys.push(compress_user_agent(&self.user_agent));
        }
        keys
    }
}

/// Partial-knowledge cache consultation.
///
/// Returns `Some(false)` when any key is a known deny, `Some(true)` when
/// every key is known and allowed, `None` (miss) otherwise. An empty key
/// set is always a miss.
fn consult(cache: &HashMap<String, bool>, keys: &[String]) -> Option<bool> {
    if keys.is_empty() {
        return None;
    }
    let mut all_known = true;
    for key in keys {
        match cache.get(key) {
            Some(false) => return Some(false),
            Some(true) => {}
            None => all_known = false,
        }
    }
    if all_known { Some(true) } else { None }
}

impl DecisionEngine {
    /// Create an engine in warmup with empty maps. Call
    /// [`start`](Self::start) to launch the refresh loop.
    pub fn new(config: Arc<Config>, upstream: UpstreamClient) -> Self {
        let pseudonymizer = Pseudonymizer::new(
            config.email_encryption_key.clone(),
            config.email_encryption_format,
        );
        Self {
            config,
            upstream,
            pseudonymizer,
            state: RwLock::new(EngineState {
                current: HashMap::new(),
                pending: None,
                tracked: HashSet::new(),
                warmup: true,
                last_batch_size: 0,
            }),
            total_requests: AtomicU64::new(0),
            live_checks: AtomicU64::new(0),
        }
    }

    /// Launch the background refresh loop.
    ///
    /// The loop is daemonic: it runs for the life of the process and has no
    /// external cancellation. Prefetch and swap fire on absolute deadlines
    /// so slow iterations do not drift the window.
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let window = self.config.window();
        let fetch_interval = self.config.fetch_interval();

        tokio::spawn(async move {
            info!(
                window_secs = window.as_secs(),
                fetch_interval_secs = fetch_interval.as_secs(),
                "starting cache refresh loop"
            );

            let start = Instant::now();
            let mut next_fetch = start + fetch_interval;
            let mut next_swap = start + window;

            loop {
                sleep_until(next_fetch).await;
                engine.prefetch();
                next_fetch += window;

                sleep_until(next_swap).await;
                engine.swap();
                next_swap += window;
            }
        });
    }

    /// Pseudonymize an email with the configured key and format. Returns the
    /// input unchanged when pseudonymization is disabled.
    pub fn pseudonymize_email(&self, email: &str) -> String {
        self.pseudonymizer.token(email)
    }

    /// Answer an allow/deny check.
    ///
    /// Never blocks beyond the upstream client timeout, and only on a cache
    /// miss. Upstream failures propagate to the caller without mutating the
    /// cache; the caller decides fail-open or fail-closed.
    pub async fn check(&self, request: CheckRequest) -> GateResult<CheckResponse> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let resolved = self.resolve(request);
        let keys = resolved.keys();

        // Track before consulting anything, warmup included, so the next
        // prefetch resolves these keys.
        {
            let mut state = self.state_write();
            for key in &keys {
                state.tracked.insert(key.clone());
            }
        }

        {
            let state = self.state_read();
            if state.warmup {
                return Ok(CheckResponse::success(true, "Warmup: Allowed"));
            }
            match consult(&state.current, &keys) {
                Some(true) => return Ok(CheckResponse::success(true, "Cache Hit")),
                Some(false) => return Ok(CheckResponse::success(false, "Cache Hit: Blocked")),
                None => {}
            }
        }

        if keys.is_empty() {
            return Ok(CheckResponse::error("No keys provided"));
        }

        // Miss: resolve through the batch endpoint so each key gets its own
        // verdict and both allows and denies are cacheable.
        self.live_checks.fetch_add(1, Ordering::Relaxed);
        let results = self.upstream.check_batch(&keys).await?;

        let mut allowed = true;
        {
            let mut state = self.state_write();
            for decision in &results {
                state.current.insert(decision.key.clone(), decision.allow);
                if !decision.allow {
                    allowed = false;
                }
            }
        }

        let message = if allowed {
            "Allowed (Live Check)"
        } else {
            "Blocked (Live Check)"
        };
        Ok(CheckResponse::success(allowed, message))
    }

    /// Drain the tracking set and bulk-resolve it into the pending map.
    /// First phase of the refresh cycle; [`start`](Self::start) fires it
    /// mid-window.
    ///
    /// The set is reset *before* the network call: checks arriving while the
    /// batch is in flight populate the next window's set, not the one being
    /// fetched. On upstream failure the pending map is left untouched.
    pub fn prefetch(self: &Arc<Self>) {
        let keys: Vec<String> = {
            let mut state = self.state_write();
            let keys: Vec<String> = state.tracked.drain().collect();
            if !keys.is_empty() {
                state.last_batch_size = keys.len() as u64;
            }
            keys
        };

        if keys.is_empty() {
            debug!("no keys tracked this window, skipping prefetch");
            return;
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            info!(keys = keys.len(), "prefetching decisions for next window");
            match engine.upstream.check_batch(&keys).await {
                Ok(results) => {
                    let fresh: HashMap<String, bool> = results
                        .into_iter()
                        .map(|decision| (decision.key, decision.allow))
                        .collect();
                    engine.state_write().pending = Some(fresh);
                    debug!("prefetch complete, pending cache staged");
                }
                Err(error) => {
                    warn!(%error, "prefetch failed, pending cache left untouched");
                }
            }
        });
    }

    /// Install the pending map as current and end warmup. Second phase of
    /// the refresh cycle; [`start`](Self::start) fires it at the window
    /// boundary.
    ///
    /// A missed prefetch installs a fresh empty map instead of keeping the
    /// old one: no verdict outlives a single window, at the cost of that
    /// window falling through to live checks.
    pub fn swap(&self) {
        let batch_size = {
            let mut state = self.state_write();
            state.warmup = false;
            state.current = state.pending.take().unwrap_or_default();
            std::mem::take(&mut state.last_batch_size)
        };

        let total = self.total_requests.swap(0, Ordering::Relaxed);
        let live = self.live_checks.swap(0, Ordering::Relaxed);
        info!(
            total_requests = total,
            live_upstream_checks = live,
            prefetched_keys = batch_size,
            "window stats"
        );
    }

    fn resolve(&self, request: CheckRequest) -> ResolvedRequest {
        let email_token = if request.email.is_empty() {
            request.email
        } else {
            self.pseudonymizer.token(&request.email)
        };
        ResolvedRequest {
            ip: request.ip_address,
            email_token,
            user_agent: request.user_agent,
        }
    }

    fn state_read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn state_write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
