// ── Channel registry ──
//
// Process-wide map from resolved endpoint URL to its `Channel`. The
// DashMap entry API makes `get_channel` race-free: concurrent callers for
// the same URL always observe a single channel and a single connection task.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ledgerlink_api::websocket;
use secrecy::ExposeSecret;
use tracing::debug;
use url::Url;

use super::Channel;
use crate::config::RealtimeConfig;
use crate::notify::Notifier;
use crate::token::TokenSource;

/// Vends one shared [`Channel`] per resolved endpoint.
///
/// Cheaply cloneable; clones share the same channel map.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    api_base_url: String,
    fallback_origin: Url,
    reconnect_delay: Duration,
    tokens: Arc<dyn TokenSource>,
    notifier: Arc<dyn Notifier>,
    channels: DashMap<String, Channel>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("api_base_url", &self.inner.api_base_url)
            .field("channels", &self.inner.channels.len())
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    pub fn new(config: &RealtimeConfig, tokens: Arc<dyn TokenSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                api_base_url: config.api_base_url.clone(),
                fallback_origin: config.fallback_origin.clone(),
                reconnect_delay: config.reconnect_delay,
                tokens,
                notifier,
                channels: DashMap::new(),
            }),
        }
    }

    /// Resolve `path` to the endpoint URL a channel for it would use,
    /// including the current bearer token.
    pub fn resolve(&self, path: &str) -> Url {
        let token = self.inner.tokens.bearer_token();
        resolve_channel_url(
            &self.inner.api_base_url,
            &self.inner.fallback_origin,
            path,
            token.as_ref().map(ExposeSecret::expose_secret),
        )
    }

    /// Return the channel for `path`, creating and connecting it on first
    /// use. Never fails; see [`resolve_channel_url`] for how bad input
    /// degrades.
    ///
    /// Must be called from within a tokio runtime.
    pub fn get_channel(&self, path: &str) -> Channel {
        let url = self.resolve(path);
        self.inner
            .channels
            .entry(url.to_string())
            .or_insert_with(|| {
                debug!(url = %websocket::redacted(&url), "creating channel");
                Channel::spawn(url, self.inner.reconnect_delay, Arc::clone(&self.inner.notifier))
            })
            .value()
            .clone()
    }

    /// Stop every channel for `path` and forget it.
    ///
    /// Channels opened under an earlier token are matched too, so a token
    /// change never strands a connection. Returns `false` if no such channel
    /// exists. Subscribers see a final `Disconnected` and nothing after it.
    /// A later `get_channel` for the same path creates a fresh channel.
    pub fn close_channel(&self, path: &str) -> bool {
        let target = without_token(&self.resolve(path));
        let mut closed = false;
        self.inner.channels.retain(|_, channel| {
            if without_token(channel.url()) == target {
                channel.close();
                closed = true;
                false
            } else {
                true
            }
        });
        closed
    }

    /// Close every channel.
    pub fn close_all(&self) {
        self.inner.channels.retain(|_, channel| {
            channel.close();
            false
        });
    }

    /// Number of open channels.
    pub fn len(&self) -> usize {
        self.inner.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.channels.is_empty()
    }
}

// ── URL resolution ───────────────────────────────────────────────

/// Build the WebSocket endpoint for a logical channel path.
///
/// Only the origin of `api_base_url` is used; its path is ignored. `http`
/// becomes `ws` and `https` becomes `wss`. If `api_base_url` is not an
/// absolute URL with a host, `fallback_origin` is used instead. A `path`
/// that would leave the origin (`//other-host/x`, `https://...`) resolves
/// to the origin root. When `token` is present it is appended as the
/// `token` query parameter.
pub fn resolve_channel_url(api_base_url: &str, fallback_origin: &Url, path: &str, token: Option<&str>) -> Url {
    let origin = Url::parse(api_base_url)
        .ok()
        .and_then(|base| websocket_origin(&base))
        .or_else(|| websocket_origin(fallback_origin))
        .unwrap_or_else(|| Url::parse("ws://localhost/").expect("static URL is valid"));

    let mut url = match origin.join(path) {
        Ok(joined) if joined.origin() == origin.origin() => joined,
        _ => origin,
    };
    url.set_fragment(None);

    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }
    url
}

/// The endpoint with any `token` query parameter removed.
fn without_token(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "token")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}

/// `scheme://host[:port]/` with the scheme mapped onto its WebSocket
/// counterpart.
fn websocket_origin(base: &Url) -> Option<Url> {
    let host = base.host_str()?;
    let scheme = match base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    let origin = match base.port() {
        Some(port) => format!("{scheme}://{host}:{port}/"),
        None => format!("{scheme}://{host}/"),
    };
    Url::parse(&origin).ok()
}
