//! Runtime configuration for the apigate proxy.
//!
//! Every option is read from the environment with a sensible default, so the
//! proxy starts with no configuration at all (pointing at a local upstream).

use std::time::Duration;

use crate::pseudonym::TokenFormat;

/// Gap between a window's prefetch and its swap. The prefetch fires this
/// long before the window boundary so the batch call has a budget to finish
/// before the swap installs its result.
pub const FETCH_OFFSET: Duration = Duration::from_secs(5);

/// Runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the upstream decision service (batch and log endpoints).
    pub upstream_base_url: String,

    /// Cache window length in seconds. Values below 5 fall back to the
    /// default; see [`Config::window`].
    pub window_seconds: u64,

    /// Log shipper flush period in seconds; see [`Config::flush_interval`].
    pub log_flush_interval_seconds: u64,

    /// Buffered log entries that trigger an immediate flush.
    pub log_batch_size: usize,

    /// Optional shared secret sent as `X-API-Key` on every upstream call.
    pub upstream_api_key: Option<String>,

    /// HMAC key for email pseudonymization; empty disables it.
    pub email_encryption_key: String,

    /// Output format of the email token.
    pub email_encryption_format: TokenFormat,

    /// Upstream client timeout (connection + response).
    pub upstream_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_base_url: "http://localhost:8000".to_string(),
            window_seconds: 20,
            log_flush_interval_seconds: 10,
            log_batch_size: 50,
            upstream_api_key: None,
            email_encryption_key: String::new(),
            email_encryption_format: TokenFormat::Hex,
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Environment Variables
    ///
    /// - `UPSTREAM_BASE_URL` (default: `http://localhost:8000`)
    /// - `WINDOW_SECONDS` (default: 20)
    /// - `LOG_FLUSH_INTERVAL` (default: 10)
    /// - `LOG_BATCH_SIZE` (default: 50)
    /// - `UPSTREAM_API_KEY` (default: unset)
    /// - `EMAIL_ENCRYPTION_KEY` (default: unset, disables pseudonymization)
    /// - `EMAIL_ENCRYPTION_FORMAT` (`hex` or `numeric`, default: `hex`)
    /// - `UPSTREAM_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upstream_base_url: std::env::var("UPSTREAM_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(default.upstream_base_url),

            window_seconds: std::env::var("WINDOW_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.window_seconds),

            log_flush_interval_seconds: std::env::var("LOG_FLUSH_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.log_flush_interval_seconds),

            log_batch_size: std::env::var("LOG_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.log_batch_size),

            upstream_api_key: std::env::var("UPSTREAM_API_KEY")
                .ok()
                .filter(|v| !v.is_empty()),

            email_encryption_key: std::env::var("EMAIL_ENCRYPTION_KEY").unwrap_or_default(),

            email_encryption_format: std::env::var("EMAIL_ENCRYPTION_FORMAT")
                .map(|v| TokenFormat::from_name(&v))
                .unwrap_or(default.email_encryption_format),

            upstream_timeout: std::env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.upstream_timeout),
        }
    }

    /// Effective cache window. Anything below 5 seconds falls back to the
    /// 20-second default; windows that short leave the prefetch no budget.
    pub fn window(&self) -> Duration {
        if self.window_seconds < 5 {
            Duration::from_secs(20)
        } else {
            Duration::from_secs(self.window_seconds)
        }
    }

    /// Offset into the window at which the prefetch fires, clamped to at
    /// least one second.
    pub fn fetch_interval(&self) -> Duration {
        let interval = self.window().saturating_sub(FETCH_OFFSET);
        if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        }
    }

    /// Effective log flush period. Sub-second values fall back to the
    /// 10-second default.
    pub fn flush_interval(&self) -> Duration {
        if self.log_flush_interval_seconds < 1 {
            Duration::from_secs(10)
        } else {
            Duration::from_secs(self.log_flush_interval_seconds)
        }
    }
}
