//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError`, `ConfigError`, and retry outcomes into user-facing
//! errors with actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use ledgerlink_config::ConfigError;
use ledgerlink_core::{CoreError, RetryError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    /// The request was parked in the offline queue and never completed.
    pub const QUEUED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the backend at {url}")]
    #[diagnostic(
        code(ledgerlink::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Try: ledgerlink status"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("TLS handshake with the backend failed: {reason}")]
    #[diagnostic(
        code(ledgerlink::tls_error),
        help(
            "The backend may be using a self-signed certificate.\n\
             Use --insecure (-k) to accept it, or configure ca_cert in your profile."
        )
    )]
    TlsError { reason: String },

    #[error("Channel {url} did not connect within {seconds}s")]
    #[diagnostic(
        code(ledgerlink::channel_unavailable),
        help("The channel keeps reconnecting in the background. Check the path and the backend's WebSocket endpoint.")
    )]
    ChannelUnavailable { url: String, seconds: u64 },

    #[error("{description} was queued while offline and did not complete")]
    #[diagnostic(
        code(ledgerlink::queued),
        help(
            "The backend is unreachable. Retry later, or pass --wait-online <SECS>\n\
             to keep the request queued until connectivity returns."
        )
    )]
    Queued { description: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(ledgerlink::auth_failed),
        help(
            "Verify the bearer token for this profile.\n\
             Run: ledgerlink config set-token"
        )
    )]
    AuthFailed { message: String },

    // ── Requests ─────────────────────────────────────────────────────
    #[error("Not found: {path}")]
    #[diagnostic(code(ledgerlink::not_found))]
    NotFound { path: String },

    #[error("API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    #[diagnostic(code(ledgerlink::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ledgerlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ledgerlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: ledgerlink config set api_url <URL> --profile {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No backend configured")]
    #[diagnostic(
        code(ledgerlink::no_config),
        help(
            "Pass --api-url, set LEDGERLINK_API_URL, or add a profile:\n  \
             ledgerlink config set api_url https://erp.example.com\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(ledgerlink::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out")]
    #[diagnostic(
        code(ledgerlink::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout,

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(ledgerlink::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(ledgerlink::json), help("Check the JSON body and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } | Self::ChannelUnavailable { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout => exit_code::TIMEOUT,
            Self::Queued { .. } => exit_code::QUEUED,
            Self::Validation { .. }
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason, .. } if reason.starts_with("TLS error") => {
                CliError::TlsError { reason }
            }
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::Timeout { .. } => CliError::Timeout,
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::NotFound { path } => CliError::NotFound { path },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "request".into(),
                reason: message,
            },
            CoreError::Api { message, status } => CliError::ApiError { status, message },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ledgerlink_api::Error> for CliError {
    fn from(err: ledgerlink_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

impl<E: Into<CliError>> From<RetryError<E>> for CliError {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Failed(e) => e.into(),
            RetryError::Queued { description } => CliError::Queued { description },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            err => CliError::Config(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_outcomes_map_to_exit_codes() {
        let queued: CliError = RetryError::<CoreError>::Queued {
            description: "GET /invoices".into(),
        }
        .into();
        assert_eq!(queued.exit_code(), exit_code::QUEUED);

        let failed: CliError = RetryError::Failed(ledgerlink_api::Error::Status {
            status: 503,
            message: "maintenance".into(),
        })
        .into();
        assert_eq!(failed.exit_code(), exit_code::GENERAL);
        assert_eq!(failed.to_string(), "API error (503): maintenance");
    }

    #[test]
    fn auth_and_not_found_statuses() {
        let auth: CliError = ledgerlink_api::Error::Status {
            status: 401,
            message: "expired".into(),
        }
        .into();
        assert_eq!(auth.exit_code(), exit_code::AUTH);

        let missing: CliError = ledgerlink_api::Error::Status {
            status: 404,
            message: "/invoices/9".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn config_errors_keep_their_diagnostic() {
        let err: CliError = ConfigError::UnknownProfile { name: "prod".into() }.into();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
