//! Single WebSocket session: connect, pump frames, report how it ended.
//!
//! Reconnection is deliberately not handled here. A session runs until the
//! peer closes, the stream errors, or the caller cancels; the channel layer
//! in `ledgerlink-core` decides what happens next.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerlink_api::websocket::{self, InboundMessage};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let url = url::Url::parse("wss://erp.example.com/ws/notifications")?;
//! let stream = websocket::connect(&url).await?;
//! let (_tx, rx) = mpsc::unbounded_channel();
//! let end = websocket::run_session(stream, rx, &CancellationToken::new(), |msg| {
//!     if let InboundMessage::Json(value) = msg {
//!         println!("{value}");
//!     }
//! })
//! .await?;
//! ```

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

/// The client side of an established WebSocket connection.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Payloads ─────────────────────────────────────────────────────────

/// A message received from the backend.
///
/// Text frames that parse as JSON arrive as [`Json`](Self::Json);
/// anything else is passed through untouched as [`Text`](Self::Text)
/// rather than dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Json(serde_json::Value),
    Text(String),
}

impl InboundMessage {
    /// Decode a text frame, falling back to the raw string.
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(e) => {
                tracing::trace!(error = %e, "inbound frame is not JSON, passing raw text");
                Self::Text(text.to_owned())
            }
        }
    }

    /// The JSON payload, if the frame was JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Deserialize the JSON payload into a typed message.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
                    message: e.to_string(),
                    body: value.to_string(),
                })
            }
            Self::Text(text) => Err(Error::Deserialization {
                message: "frame is not JSON".into(),
                body: text.clone(),
            }),
        }
    }
}

/// A message to send to the backend.
///
/// Strings go out verbatim; structured values are JSON-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Json(serde_json::Value),
}

impl OutboundMessage {
    /// Encode as a text frame payload.
    pub fn encode(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// Serialize any typed payload into a structured message.
    pub fn json<T: Serialize>(payload: &T) -> Result<Self, Error> {
        Ok(Self::Json(serde_json::to_value(payload)?))
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<serde_json::Value> for OutboundMessage {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

// ── Session lifecycle ────────────────────────────────────────────────

/// How a session that did not error came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    Closed { code: u16, reason: String },
    /// The stream ended without a close frame.
    StreamEnded,
    /// The caller's cancellation token fired.
    Cancelled,
}

/// Strip the query string (which carries the bearer token) for logging.
pub fn redacted(url: &Url) -> Url {
    let mut clean = url.clone();
    if clean.query().is_some() {
        clean.set_query(Some("token=<redacted>"));
    }
    clean
}

/// Perform the WebSocket handshake.
pub async fn connect(url: &Url) -> Result<WsStream, Error> {
    tracing::debug!(url = %redacted(url), "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    Ok(ws_stream)
}

/// Pump frames until the connection ends.
///
/// Every inbound text frame is decoded and handed to `on_message` in
/// arrival order. Payloads received on `outbound` are written as text
/// frames. Returns `Err` on any read or write failure.
pub async fn run_session<F>(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
    mut on_message: F,
) -> Result<SessionEnd, Error>
where
    F: FnMut(InboundMessage),
{
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Flush what was already accepted, then close. Best effort;
                // the peer may already be gone.
                while let Ok(text) = outbound.try_recv() {
                    if write.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            Some(text) = outbound.recv() => {
                write
                    .send(Message::text(text))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        on_message(InboundMessage::decode(text.as_str()));
                    }
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => on_message(InboundMessage::decode(text)),
                        Err(_) => tracing::debug!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (u16::from(cf.code), cf.reason.to_string()))
                            .unwrap_or((1005, String::new()));
                        tracing::debug!(code, reason = %reason, "WebSocket close frame received");
                        return Ok(SessionEnd::Closed { code, reason });
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/raw frames; tungstenite answers pings itself.
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => return Ok(SessionEnd::StreamEnded),
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
