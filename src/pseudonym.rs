//! Identity pseudonymization.
//!
//! User identifiers never leave the host in the clear: emails become keyed
//! HMAC-SHA-256 tokens that are stable across processes holding the same
//! secret (so the upstream can join records), and user-agents become short
//! unkeyed xxHash-64 tokens that only need to be stable and compact.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Output format of the email token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenFormat {
    /// Lowercase hex of the first 16 MAC bytes (32 characters).
    #[default]
    Hex,
    /// Base-10 of the first 16 MAC bytes read as a big-endian unsigned int.
    Numeric,
}

impl TokenFormat {
    /// Parse a configured format name. Anything other than `"numeric"`
    /// selects hex.
    pub fn from_name(name: &str) -> Self {
        match name {
            "numeric" => TokenFormat::Numeric,
            _ => TokenFormat::Hex,
        }
    }
}

/// Keyed one-way hash of `data`, truncated to the first 16 bytes of the MAC
/// and hex encoded.
///
/// The 16-byte truncation is a fixed part of the wire contract with the
/// upstream; do not shorten it further.
pub fn keyed_identity_hash(key: &[u8], data: &str) -> String {
    hex::encode(&mac_sum(key, data)[..16])
}

/// Keyed one-way hash of `data` rendered as a decimal string.
///
/// The first 16 MAC bytes are interpreted as a big-endian unsigned integer,
/// which fits exactly in a `u128`.
pub fn keyed_identity_hash_numeric(key: &[u8], data: &str) -> String {
    let sum = mac_sum(key, data);
    let mut truncated = [0u8; 16];
    truncated.copy_from_slice(&sum[..16]);
    u128::from_be_bytes(truncated).to_string()
}

/// Compress a user-agent into a short deterministic token.
///
/// xxHash-64 of the UA bytes, serialized big-endian, URL-safe base64,
/// truncated to the first 11 characters (the padding character never
/// survives the truncation).
pub fn compress_user_agent(user_agent: &str) -> String {
    let sum = xxhash_rust::xxh64::xxh64(user_agent.as_bytes(), 0);
    let encoded = URL_SAFE.encode(sum.to_be_bytes());
    encoded[..11].to_string()
}

fn mac_sum(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA-256 accepts keys of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Email pseudonymizer configured with a shared secret and output format.
///
/// With an empty key, pseudonymization is disabled and [`token`](Self::token)
/// passes the input through unchanged. Both the decision engine and the log
/// shipper derive their tokens from the same value so cache keys and shipped
/// log entries agree.
#[derive(Debug, Clone)]
pub struct Pseudonymizer {
    key: String,
    format: TokenFormat,
}

impl Pseudonymizer {
    pub fn new(key: impl Into<String>, format: TokenFormat) -> Self {
        Self {
            key: key.into(),
            format,
        }
    }

    /// Whether a secret is configured.
    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty()
    }

    /// Pseudonymize an email. Empty input or a missing key returns the input
    /// unchanged.
    pub fn token(&self, email: &str) -> String {
        if email.is_empty() || self.key.is_empty() {
            return email.to_string();
        }
        match self.format {
            TokenFormat::Hex => keyed_identity_hash(self.key.as_bytes(), email),
            TokenFormat::Numeric => keyed_identity_hash_numeric(self.key.as_bytes(), email),
        }
    }
}
