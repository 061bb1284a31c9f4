use thiserror::Error;

/// Top-level error type for the `ledgerlink-api` crate.
///
/// Covers every failure mode of the transport layer: HTTP, URL handling,
/// WebSocket sessions, and payload encoding. `ledgerlink-core` maps these
/// into retry decisions and user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The bearer token cannot be sent as an HTTP header value.
    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),

    // ── REST ────────────────────────────────────────────────────────
    /// Non-success HTTP status from the backend.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake or read/write failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Outbound payload could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` for request timeouts, including reqwest's own.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            Self::Status { status, .. } => *status == 408,
            _ => false,
        }
    }

    /// Returns `true` when the request never got a response: connection
    /// refused, reset, DNS failure, or a dropped WebSocket.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_connect() || e.is_request() || e.is_body(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }
}
