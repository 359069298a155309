//! Wire types shared between the HTTP surface, the engine, and the upstream.

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

/// Body of an allow/deny check.
///
/// Fields are optional at the wire level; an empty string means "not
/// provided". At least one of `ip_address` and `email` must be present for
/// the request to be checkable. `email` may carry any unique user id, not
/// just an email address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub email: String,
    /// Optional; the surface fills it from the `User-Agent` header when
    /// absent from the body.
    #[serde(default)]
    pub user_agent: String,
}

impl CheckRequest {
    /// Boundary validation: a check needs at least an IP or a user id.
    pub fn validate(&self) -> GateResult<()> {
        if self.ip_address.is_empty() && self.email.is_empty() {
            return Err(GateError::InvalidInput {
                details: "Missing required fields (ip_address or email/user_id)".to_string(),
            });
        }
        Ok(())
    }
}

/// Verdict returned to the caller of a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allow: bool,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResponse {
    /// A successfully derived verdict, allow or deny.
    pub fn success(allow: bool, message: impl Into<String>) -> Self {
        Self {
            allow,
            status: "success".to_string(),
            message: Some(message.into()),
            error: None,
        }
    }

    /// A structured error verdict (always deny).
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            allow: false,
            status: "error".to_string(),
            message: Some(message.into()),
            error: None,
        }
    }

    /// Response body for a failed check, preserving the error text.
    ///
    /// Input validation failures report `status: "failure"`, everything else
    /// `status: "error"`.
    pub fn from_error(error: &GateError) -> Self {
        let status = match error {
            GateError::InvalidInput { .. } => "failure",
            _ => "error",
        };
        Self {
            allow: false,
            status: status.to_string(),
            message: None,
            error: Some(error.to_string()),
        }
    }
}

/// One element of the upstream batch response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchDecision {
    pub key: String,
    pub allow: bool,
    /// Upstream's classification of the key ("ip", "email", "user_agent").
    /// Informational; the cache does not use it.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One buffered activity record, shipped in bulk to the upstream log sink.
///
/// The `email` field is pseudonymized at queue time, before the entry ever
/// sits in the buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub endpoint: String,
    /// Defaults to `endpoint` at the boundary when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    #[serde(default)]
    pub track_request: bool,
}

impl LogEntry {
    /// Boundary validation for the log route.
    pub fn validate(&self) -> GateResult<()> {
        if self.ip_address.is_empty()
            || self.email.is_empty()
            || self.user_agent.is_empty()
            || self.http_method.is_empty()
            || self.endpoint.is_empty()
        {
            return Err(GateError::InvalidInput {
                details: "Missing required fields".to_string(),
            });
        }
        Ok(())
    }
}
