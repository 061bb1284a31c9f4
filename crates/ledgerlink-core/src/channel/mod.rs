// ── Realtime channels ──
//
// A `Channel` owns one reconnecting WebSocket for one resolved endpoint and
// fans inbound messages out to callback subscribers. Connection state is
// published separately from data. Channels are vended by the
// `ChannelRegistry`, which guarantees one per URL.

mod registry;
mod subscribers;

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use ledgerlink_api::websocket::{self, InboundMessage, OutboundMessage, SessionEnd};
use serde::Serialize;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::notify::{Notice, Notifier};

pub use registry::{ChannelRegistry, resolve_channel_url};
use subscribers::{Callback, SubscriberSet, invoke};

// ── ConnectionStatus ─────────────────────────────────────────────

/// Connection status of a channel.
///
/// `Disconnected -> Connecting -> Connected`, `Connected -> Disconnected` on
/// a clean close, `Connecting | Connected -> Error` on failure. After
/// `Disconnected` or `Error` the channel waits its reconnect delay and
/// goes back to `Connecting`, until the channel is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

// ── Subscription ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionKind {
    Messages,
    ConnectionState,
}

/// Handle returned by [`Channel::subscribe`] and
/// [`Channel::subscribe_connection_state`].
///
/// Dropping the handle does *not* unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). Unsubscribing never closes the
/// channel.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    kind: SubscriptionKind,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    /// Stop delivery to this subscriber. Returns `false` if it was already
    /// removed or the channel no longer exists.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.channel.upgrade() else {
            return false;
        };
        match self.kind {
            SubscriptionKind::Messages => inner.messages.remove(self.id),
            SubscriptionKind::ConnectionState => inner.states.remove(self.id),
        }
    }
}

// ── Channel ──────────────────────────────────────────────────────

/// A reconnecting realtime connection to one backend endpoint.
///
/// Cheaply cloneable via `Arc<ChannelInner>`; every clone refers to the
/// same connection. Obtain channels from [`ChannelRegistry::get_channel`].
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    url: Url,
    reconnect_delay: Duration,
    status: watch::Sender<ConnectionStatus>,
    messages: SubscriberSet<InboundMessage>,
    states: SubscriberSet<StatusUpdate>,
    /// Bumped on every status change. Held while the status is written or
    /// read for a new state subscriber, never while callbacks run.
    status_version: Mutex<u64>,
    /// Sender into the live session, `None` whenever no session is open.
    outbound: ArcSwapOption<mpsc::UnboundedSender<String>>,
    has_connected: AtomicBool,
    cancel: CancellationToken,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("url", &websocket::redacted(&self.inner.url).as_str())
            .field("status", &self.status())
            .field("subscribers", &self.inner.messages.len())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Create the channel and spawn its connection task.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(url: Url, reconnect_delay: Duration, notifier: Arc<dyn Notifier>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let inner = Arc::new(ChannelInner {
            url,
            reconnect_delay,
            status,
            messages: SubscriberSet::new(),
            states: SubscriberSet::new(),
            status_version: Mutex::new(1),
            outbound: ArcSwapOption::empty(),
            has_connected: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            notifier,
        });

        tokio::spawn(connection_task(Arc::clone(&inner)));

        Self { inner }
    }

    /// The resolved endpoint URL (including the token query parameter).
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Observe status changes through a `watch` receiver.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until the channel reports `Connected`.
    ///
    /// Returns `false` if the channel was closed first.
    pub async fn connected(&self) -> bool {
        let mut rx = self.watch_status();
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => false,
            connected = async { rx.wait_for(|s| *s == ConnectionStatus::Connected).await.is_ok() } => connected,
        }
    }

    /// Register a callback for every inbound message.
    ///
    /// All current subscribers receive every message, in arrival order. A
    /// panicking callback is logged and does not affect the others.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let id = self.inner.messages.insert(Arc::new(callback));
        Subscription {
            id,
            kind: SubscriptionKind::Messages,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Register a callback for connection status changes.
    ///
    /// The callback is invoked immediately with the current status, then on
    /// every subsequent change. Each status is delivered at most once and
    /// never after a newer one, even when a change races the subscription.
    pub fn subscribe_connection_state<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        let deliver = in_order(callback);
        let id = self.inner.states.insert(Arc::clone(&deliver));
        let current = {
            let version = self.inner.status_version.lock().expect("status lock poisoned");
            StatusUpdate {
                version: *version,
                status: *self.inner.status.borrow(),
            }
        };
        invoke(deliver.as_ref(), &current);
        Subscription {
            id,
            kind: SubscriptionKind::ConnectionState,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Number of message subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.messages.len()
    }

    /// Send a message over the live connection.
    ///
    /// Strings are sent verbatim, JSON values are encoded. If the channel is
    /// not connected the message is dropped with a warning and `false` is
    /// returned; nothing is queued for later.
    pub fn send(&self, message: impl Into<OutboundMessage>) -> bool {
        let payload = message.into().encode();
        if let Some(tx) = self.inner.outbound.load_full() {
            if tx.send(payload).is_ok() {
                return true;
            }
        }
        warn!(
            url = %websocket::redacted(&self.inner.url),
            status = %self.status(),
            "channel not connected, dropping outbound message"
        );
        false
    }

    /// Serialize `payload` as JSON and [`send`](Self::send) it.
    pub fn send_json<T: Serialize>(&self, payload: &T) -> bool {
        match OutboundMessage::json(payload) {
            Ok(message) => self.send(message),
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                false
            }
        }
    }

    /// `true` if both handles refer to the same channel.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stop the connection task; the final status is `Disconnected`.
    pub(crate) fn close(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl ChannelInner {
    /// Publish a status transition to watchers and state subscribers.
    fn set_status(&self, next: ConnectionStatus) {
        let version = {
            let mut version = self.status_version.lock().expect("status lock poisoned");
            let changed = self.status.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
            if !changed {
                return;
            }
            *version += 1;
            *version
        };

        debug!(url = %websocket::redacted(&self.url), status = %next, "channel status changed");

        match next {
            ConnectionStatus::Connected => {
                if self.has_connected.swap(true, Ordering::Relaxed) {
                    self.notifier.notify(Notice::success(
                        "Realtime connection restored",
                        format!("Reconnected to {}", self.url.path()),
                    ));
                }
            }
            ConnectionStatus::Error => {
                self.notifier.notify(Notice::warning(
                    "Realtime connection error",
                    format!(
                        "Lost {}; retrying in {}ms",
                        self.url.path(),
                        self.reconnect_delay.as_millis()
                    ),
                ));
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Connecting => {}
        }

        self.states.dispatch(&StatusUpdate { version, status: next });
    }
}

/// A status change tagged with its position in the channel's history.
#[derive(Debug, Clone, Copy)]
struct StatusUpdate {
    version: u64,
    status: ConnectionStatus,
}

/// Wrap a state callback so it skips updates it has already seen or that
/// are older than the last one it accepted.
fn in_order<F>(callback: F) -> Callback<StatusUpdate>
where
    F: Fn(&ConnectionStatus) + Send + Sync + 'static,
{
    let last_seen = AtomicU64::new(0);
    Arc::new(move |update: &StatusUpdate| {
        let fresh = last_seen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seen| {
                (update.version > seen).then_some(update.version)
            })
            .is_ok();
        if fresh {
            callback(&update.status);
        }
    })
}

// ── Background connection task ───────────────────────────────────

/// Main loop: connect → pump → on drop, wait the fixed delay → reconnect.
///
/// The delay is constant; exponential back-off lives in the retry
/// coordinator.
async fn connection_task(inner: Arc<ChannelInner>) {
    let cancel = inner.cancel.clone();
    let shown_url = websocket::redacted(&inner.url);

    loop {
        inner.set_status(ConnectionStatus::Connecting);

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = websocket::connect(&inner.url) => result,
        };

        match connected {
            Ok(stream) => {
                let (tx, rx) = mpsc::unbounded_channel();
                inner.outbound.store(Some(Arc::new(tx)));
                inner.set_status(ConnectionStatus::Connected);
                info!(url = %shown_url, "channel connected");

                let result = websocket::run_session(stream, rx, &cancel, |message| {
                    inner.messages.dispatch(&message);
                })
                .await;

                // Anything still buffered for this session dies with it.
                inner.outbound.store(None);

                match result {
                    Ok(SessionEnd::Cancelled) => break,
                    Ok(end) => {
                        info!(url = %shown_url, ?end, "channel disconnected");
                        inner.set_status(ConnectionStatus::Disconnected);
                    }
                    Err(e) => {
                        warn!(url = %shown_url, error = %e, "channel session failed");
                        inner.set_status(ConnectionStatus::Error);
                    }
                }
            }
            Err(e) => {
                warn!(url = %shown_url, error = %e, "channel connect failed");
                inner.set_status(ConnectionStatus::Error);
            }
        }

        debug!(
            url = %shown_url,
            delay_ms = u64::try_from(inner.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }

    inner.outbound.store(None);
    inner.set_status(ConnectionStatus::Disconnected);
    debug!(url = %shown_url, "channel task exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded() -> (Arc<Mutex<Vec<ConnectionStatus>>>, Callback<StatusUpdate>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let deliver = in_order(move |status: &ConnectionStatus| {
            sink.lock().expect("lock").push(*status);
        });
        (seen, deliver)
    }

    #[test]
    fn initial_status_racing_a_change_is_delivered_once() {
        let (seen, deliver) = recorded();
        // The change dispatch and the initial read both observe version 2.
        deliver(&StatusUpdate { version: 2, status: ConnectionStatus::Connecting });
        deliver(&StatusUpdate { version: 2, status: ConnectionStatus::Connecting });
        assert_eq!(*seen.lock().expect("lock"), vec![ConnectionStatus::Connecting]);
    }

    #[test]
    fn stale_initial_status_after_a_newer_change_is_dropped() {
        let (seen, deliver) = recorded();
        deliver(&StatusUpdate { version: 3, status: ConnectionStatus::Connected });
        deliver(&StatusUpdate { version: 2, status: ConnectionStatus::Connecting });
        deliver(&StatusUpdate { version: 4, status: ConnectionStatus::Error });
        assert_eq!(
            *seen.lock().expect("lock"),
            vec![ConnectionStatus::Connected, ConnectionStatus::Error]
        );
    }
}
