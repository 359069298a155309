//! Error types for the apigate proxy.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur while serving decisions or shipping logs.
///
/// Upstream failures are classified the same way the client observes them:
/// timeout, connection failure, unexpected HTTP status, or an undecodable
/// body. All of them are recoverable at the next cache window.
#[derive(Error, Debug)]
pub enum GateError {
    /// Request is missing the fields needed to derive any decision key.
    #[error("{details}")]
    InvalidInput { details: String },

    /// Upstream did not respond within the client timeout.
    #[error("upstream request timed out after {timeout_secs}s ({url})")]
    UpstreamTimeout { url: String, timeout_secs: u64 },

    /// Could not establish a connection to the upstream.
    #[error("failed to connect to upstream {url}: {reason}")]
    UpstreamConnection { url: String, reason: String },

    /// Transport-level failure that is neither a timeout nor a connect error.
    #[error("upstream transport error: {reason}")]
    UpstreamTransport { reason: String },

    /// Upstream answered with a non-2xx status.
    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    /// Upstream answered 2xx but the body did not decode.
    #[error("failed to decode upstream response: {reason}")]
    UpstreamDecode { reason: String },

    /// The HTTP client could not be constructed at startup.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}

impl GateError {
    /// HTTP status the proxy surface reports for this error.
    ///
    /// Timeouts map to 504 so callers can distinguish a slow upstream from a
    /// broken one; every other upstream failure maps to 502.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            GateError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GateError::UpstreamConnection { .. }
            | GateError::UpstreamTransport { .. }
            | GateError::UpstreamStatus { .. }
            | GateError::UpstreamDecode { .. } => StatusCode::BAD_GATEWAY,
            GateError::ClientBuild { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error originated at the upstream decision service.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            GateError::UpstreamTimeout { .. }
                | GateError::UpstreamConnection { .. }
                | GateError::UpstreamTransport { .. }
                | GateError::UpstreamStatus { .. }
                | GateError::UpstreamDecode { .. }
        )
    }
}

/// Result type alias for proxy operations.
pub type GateResult<T> = Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let timeout = GateError::UpstreamTimeout {
            url: "http://up".to_string(),
            timeout_secs: 10,
        };
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let status = GateError::UpstreamStatus { status: 500 };
        assert_eq!(status.status_code(), StatusCode::BAD_GATEWAY);

        let invalid = GateError::InvalidInput {
            details: "missing".to_string(),
        };
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_input_display_is_bare_details() {
        let invalid = GateError::InvalidInput {
            details: "Missing required fields".to_string(),
        };
        assert_eq!(invalid.to_string(), "Missing required fields");
        assert!(!invalid.is_upstream_error());
    }

    #[test]
    fn test_upstream_classification() {
        assert!(GateError::UpstreamDecode { reason: "eof".to_string() }.is_upstream_error());
        assert!(!GateError::ClientBuild { reason: "tls".to_string() }.is_upstream_error());
    }
}
