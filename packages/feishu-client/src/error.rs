//! Error types for the Feishu client.

use std::time::Duration;
use thiserror::Error;

/// Result type for Feishu client operations.
pub type Result<T> = std::result::Result<T, FeishuError>;

/// Frequency limit hit.
const CODE_RATE_LIMITED: i64 = 99991400;
/// Bitable-level "too many requests".
const CODE_TOO_MANY_REQUESTS: i64 = 1254290;
/// Concurrent write to the same table.
const CODE_WRITE_CONFLICT: i64 = 1254291;
/// Tenant/app token rejected.
const AUTH_CODES: &[i64] = &[99991661, 99991663, 99991664, 99991668, 99991671, 99991672];
/// Bitable data and schema errors.
const BITABLE_CODES: std::ops::Range<i64> = 1254000..1255000;
/// Bitable server-side failures.
const BITABLE_INTERNAL_CODES: std::ops::Range<i64> = 1255000..1256000;

/// Feishu client errors.
#[derive(Debug, Error)]
pub enum FeishuError {
    /// Configuration error (missing credentials, oversized batch)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP 429 from the gateway
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Non-2xx response
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response envelope carried a non-zero code
    #[error("API error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// Parse error (unexpected response shape)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FeishuError {
    pub fn code(&self) -> Option<i64> {
        match self {
            FeishuError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        match self {
            FeishuError::RateLimited { .. } => true,
            FeishuError::Status { status, .. } => *status == 429,
            FeishuError::Api { code, .. } => {
                matches!(*code, CODE_RATE_LIMITED | CODE_TOO_MANY_REQUESTS)
            }
            _ => false,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        match self {
            FeishuError::Status { status, .. } => matches!(status, 401 | 403),
            FeishuError::Api { code, .. } => AUTH_CODES.contains(code),
            _ => false,
        }
    }

    /// The request reached the table but its content was rejected.
    pub fn is_schema_error(&self) -> bool {
        match self {
            FeishuError::Api { code, .. } => {
                BITABLE_CODES.contains(code)
                    && !matches!(*code, CODE_TOO_MANY_REQUESTS | CODE_WRITE_CONFLICT)
            }
            FeishuError::Status { status, .. } => matches!(status, 400 | 404 | 422),
            _ => false,
        }
    }

    /// Worth retrying unchanged: network blips, 5xx, write conflicts.
    pub fn is_transient(&self) -> bool {
        match self {
            FeishuError::Network(_) => true,
            FeishuError::Status { status, .. } => *status >= 500,
            FeishuError::Api { code, .. } => {
                *code == CODE_WRITE_CONFLICT || BITABLE_INTERNAL_CODES.contains(code)
            }
            _ => false,
        }
    }

    /// Server wait hint for rate limits.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FeishuError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Token was rejected and should be fetched again.
    pub(crate) fn invalidates_token(&self) -> bool {
        matches!(self, FeishuError::Api { code, .. } if matches!(*code, 99991663 | 99991668))
            || matches!(self, FeishuError::Status { status: 401, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i64) -> FeishuError {
        FeishuError::Api {
            code,
            msg: String::new(),
        }
    }

    #[test]
    fn test_classification() {
        assert!(api(99991400).is_rate_limited());
        assert!(api(1254290).is_rate_limited());
        assert!(!api(1254290).is_schema_error());

        assert!(api(99991663).is_auth_failure());
        assert!(FeishuError::Status { status: 403, body: String::new() }.is_auth_failure());

        assert!(api(1254045).is_schema_error());
        assert!(api(1254291).is_transient());
        assert!(api(1255001).is_transient());
        assert!(FeishuError::Status { status: 502, body: String::new() }.is_transient());
    }

    #[test]
    fn test_expired_token_invalidates_cache() {
        assert!(api(99991663).invalidates_token());
        assert!(!api(1254045).invalidates_token());
    }
}
