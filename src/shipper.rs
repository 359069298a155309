//! Buffered activity-log shipper.
//!
//! Entries are appended to an in-memory buffer and shipped in bulk, either
//! when the buffer reaches the configured batch size or on a periodic tick.
//! Every flush drains the buffer under the lock and performs the network
//! call outside it, so producers are never blocked on the upstream.
//!
//! A failed shipment is logged and dropped. No retry, no reinsertion:
//! bounded memory and stable entry order across windows are worth more here
//! than delivery guarantees.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::LogEntry;
use crate::pseudonym::Pseudonymizer;
use crate::upstream::UpstreamClient;

/// Buffered log shipper. `Clone` shares the buffer and the HTTP pool.
#[derive(Clone)]
pub struct LogShipper {
    upstream: UpstreamClient,
    pseudonymizer: Pseudonymizer,
    batch_size: usize,
    flush_interval: Duration,
    buffer: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogShipper {
    /// Create an empty shipper. Call [`start`](Self::start) to launch the
    /// periodic flush ticker.
    pub fn new(config: &Config, upstream: UpstreamClient) -> Self {
        let pseudonymizer = Pseudonymizer::new(
            config.email_encryption_key.clone(),
            config.email_encryption_format,
        );
        Self {
            upstream,
            pseudonymizer,
            batch_size: config.log_batch_size,
            flush_interval: config.flush_interval(),
            buffer: Arc::new(Mutex::new(Vec::with_capacity(config.log_batch_size))),
        }
    }

    /// Enqueue one entry.
    ///
    /// The email is pseudonymized here, before the entry ever sits in the
    /// buffer, so the identifier exists in the clear only for the lifetime
    /// of the request. Reaching the batch size triggers an asynchronous
    /// flush.
    pub fn queue(&self, mut entry: LogEntry) {
        if !entry.email.is_empty() {
            entry.email = self.pseudonymizer.token(&entry.email);
        }

        let should_flush = {
            let mut buffer = self.lock_buffer();
            buffer.push(entry);
            buffer.len() >= self.batch_size
        };

        if should_flush {
            self.trigger_flush();
        }
    }

    /// Launch the periodic flush ticker. It runs until `shutdown` is
    /// cancelled; cancel it before calling [`stop`](Self::stop) so the final
    /// flush cannot race a tick.
    pub fn start(&self, shutdown: CancellationToken) {
        let shipper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(shipper.flush_interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => shipper.trigger_flush(),
                }
            }
            debug!("log shipper ticker stopped");
        });
    }

    /// Ship whatever is buffered and wait for the shipment to finish. Called
    /// once at shutdown.
    pub async fn stop(&self) {
        let batch = self.drain();
        if batch.is_empty() {
            return;
        }
        info!(entries = batch.len(), "flushing remaining log entries on shutdown");
        Self::ship(self.upstream.clone(), batch).await;
    }

    /// Drain the buffer and ship it in a detached task.
    fn trigger_flush(&self) {
        let batch = self.drain();
        if batch.is_empty() {
            return;
        }
        let upstream = self.upstream.clone();
        tokio::spawn(Self::ship(upstream, batch));
    }

    fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.lock_buffer())
    }

    async fn ship(upstream: UpstreamClient, batch: Vec<LogEntry>) {
        match upstream.ship_logs(&batch).await {
            Ok(()) => debug!(entries = batch.len(), "flushed log batch"),
            Err(error) => {
                // Dropped on purpose; see the module doc.
                warn!(%error, entries = batch.len(), "failed to ship log batch, dropping");
            }
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of entries currently buffered.
    pub fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }
}
