// ── Core error types ──
//
// User-facing errors from ledgerlink-core. Consumers never see reqwest or
// tungstenite errors directly; the `From<ledgerlink_api::Error>` impl
// translates transport-layer errors into domain variants while keeping the
// HTTP status around for retry classification.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach backend at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Resource not found: {path}")]
    NotFound { path: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            Self::NotFound { .. } => Some(404),
            Self::AuthenticationFailed { .. } => Some(401),
            Self::ValidationFailed { .. } => Some(422),
            _ => None,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ledgerlink_api::Error> for CoreError {
    fn from(err: ledgerlink_api::Error) -> Self {
        use ledgerlink_api::Error as ApiError;

        if err.is_timeout() && !matches!(err, ApiError::Timeout { .. }) {
            return CoreError::Timeout { timeout_ms: 0 };
        }

        match err {
            ApiError::Transport(ref e) if e.is_connect() || e.is_request() => {
                CoreError::ConnectionFailed {
                    url: e
                        .url()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "<unknown>".into()),
                    reason: e.to_string(),
                }
            }
            ApiError::Transport(e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Timeout { timeout_ms } => CoreError::Timeout { timeout_ms },
            ApiError::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            ApiError::InvalidToken(reason) => CoreError::AuthenticationFailed {
                message: format!("invalid bearer token: {reason}"),
            },
            ApiError::Status { status: 401 | 403, message } => {
                CoreError::AuthenticationFailed { message }
            }
            ApiError::Status { status: 404, message } => CoreError::NotFound { path: message },
            ApiError::Status { status: 422, message } => CoreError::ValidationFailed { message },
            ApiError::Status { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            ApiError::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            ApiError::Encode(e) => CoreError::Internal(format!("Encode error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_map_by_code() {
        let not_found: CoreError = ledgerlink_api::Error::Status {
            status: 404,
            message: "/orders/1".into(),
        }
        .into();
        assert!(matches!(not_found, CoreError::NotFound { .. }));

        let unavailable: CoreError = ledgerlink_api::Error::Status {
            status: 503,
            message: "down".into(),
        }
        .into();
        assert_eq!(unavailable.status(), Some(503));
    }

    #[test]
    fn unusable_token_is_an_authentication_failure() {
        let err: CoreError = ledgerlink_api::Error::InvalidToken("newline in header".into()).into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn request_timeout_status_maps_to_timeout() {
        let err: CoreError = ledgerlink_api::Error::Status {
            status: 408,
            message: "slow".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Timeout { .. }));
    }
}
