//! Upstream decision-service client with connection pooling.
//!
//! One pooled client per service instance; the engine and the log shipper
//! clone it and share the pool. Persistent connections keep the cache-miss
//! path cheap: no TCP handshake per live check.
//!
//! # Error Classification
//!
//! reqwest failures are folded into [`GateError`] variants:
//! timeouts become `UpstreamTimeout`, connect failures become
//! `UpstreamConnection`, anything else `UpstreamTransport`. A non-2xx status
//! is `UpstreamStatus`, an undecodable 2xx body `UpstreamDecode`.
//!
//! No automatic retry: a failed batch is simply absent from the cache and
//! resolved again next window.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{GateError, GateResult};
use crate::models::{BatchDecision, CheckRequest, CheckResponse, LogEntry};

/// Header carrying the optional shared secret.
const API_KEY_HEADER: &str = "X-API-Key";

/// Client for the upstream decision service.
///
/// `Clone` is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl UpstreamClient {
    /// Build a pooled client from the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::ClientBuild`] if the client cannot be
    /// constructed.
    pub fn new(config: &Config) -> GateResult<Self> {
        let client = Client::builder()
            .timeout(config.upstream_timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| GateError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            api_key: config.upstream_api_key.clone(),
            timeout: config.upstream_timeout,
        })
    }

    /// Bulk decision query: a JSON array of opaque keys in, one verdict per
    /// key out.
    pub async fn check_batch(&self, keys: &[String]) -> GateResult<Vec<BatchDecision>> {
        debug!(keys = keys.len(), "querying upstream batch endpoint");

        let response = self
            .post("/api/allow/batch")
            .json(&keys)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "upstream batch returned error status");
            return Err(GateError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<BatchDecision>>()
            .await
            .map_err(|e| GateError::UpstreamDecode {
                reason: e.to_string(),
            })
    }

    /// Per-request live check. The cache engine resolves misses through
    /// [`check_batch`](Self::check_batch) so it can cache a verdict per key;
    /// this endpoint exists for callers that want a single authoritative
    /// answer without touching the cache.
    pub async fn check_one(&self, request: &CheckRequest) -> GateResult<CheckResponse> {
        let response = self
            .post("/api/allow")
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        response
            .json::<CheckResponse>()
            .await
            .map_err(|e| GateError::UpstreamDecode {
                reason: e.to_string(),
            })
    }

    /// Ship a batch of log entries to the upstream sink.
    ///
    /// The response body is ignored; only the status matters.
    pub async fn ship_logs(&self, batch: &[LogEntry]) -> GateResult<()> {
        let response = self
            .post("/api/logs")
            .json(&batch)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GateError::UpstreamStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder
    }

    fn classify(&self, error: reqwest::Error) -> GateError {
        if error.is_timeout() {
            warn!(
                url = %self.base_url,
                timeout_secs = self.timeout.as_secs(),
                "upstream request timed out"
            );
            GateError::UpstreamTimeout {
                url: self.base_url.clone(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else if error.is_connect() {
            warn!(url = %self.base_url, "failed to connect to upstream");
            GateError::UpstreamConnection {
                url: self.base_url.clone(),
                reason: error.to_string(),
            }
        } else {
            GateError::UpstreamTransport {
                reason: error.to_string(),
            }
        }
    }
}
