// ── Network status signal ──
//
// Process-wide `{is_online, connection_quality}` state. Connectivity events
// are authoritative; link-type hints and reachability probes refine the
// quality. Every change is published on a `watch` channel (latest value)
// and as a tagged `NetworkChange` on a `broadcast` channel (event stream).

use std::sync::Arc;
use std::time::Duration;

use ledgerlink_api::{Prober, Reachability};
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RealtimeConfig;
use crate::error::CoreError;

const EVENT_CHANNEL_SIZE: usize = 64;

// ── Status types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Good,
    Poor,
    Offline,
}

/// Snapshot of the network signal.
///
/// `is_online == false` always comes with `ConnectionQuality::Offline`; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    is_online: bool,
    connection_quality: ConnectionQuality,
}

impl NetworkStatus {
    pub const OFFLINE: Self = Self {
        is_online: false,
        connection_quality: ConnectionQuality::Offline,
    };

    /// Online with the given quality. `Offline` quality means offline.
    pub fn online(quality: ConnectionQuality) -> Self {
        match quality {
            ConnectionQuality::Offline => Self::OFFLINE,
            quality => Self {
                is_online: true,
                connection_quality: quality,
            },
        }
    }

    pub fn is_online(self) -> bool {
        self.is_online
    }

    pub fn connection_quality(self) -> ConnectionQuality {
        self.connection_quality
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::online(ConnectionQuality::Good)
    }
}

/// Why the status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    Online,
    Offline,
    ConnectionChange,
}

/// Broadcast on every status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkChange {
    pub reason: ChangeReason,
    pub status: NetworkStatus,
}

/// Effective link type as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum EffectiveLinkType {
    #[strum(serialize = "slow-2g")]
    Slow2g,
    #[strum(serialize = "2g")]
    Cellular2g,
    #[strum(serialize = "3g")]
    Cellular3g,
    #[strum(serialize = "4g")]
    Cellular4g,
}

impl EffectiveLinkType {
    pub fn quality(self) -> ConnectionQuality {
        match self {
            Self::Cellular4g => ConnectionQuality::Good,
            Self::Slow2g | Self::Cellular2g | Self::Cellular3g => ConnectionQuality::Poor,
        }
    }
}

/// Anything that can tell whether the system is currently offline.
pub trait Connectivity: Send + Sync {
    fn is_offline(&self) -> bool;
}

// ── NetworkMonitor ───────────────────────────────────────────────

/// Owner of the network status signal. Cheaply cloneable.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    status: watch::Sender<NetworkStatus>,
    events: broadcast::Sender<NetworkChange>,
    prober: Option<Prober>,
    poor_latency: Duration,
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("status", &self.status())
            .field("probe_url", &self.inner.prober.as_ref().map(|p| p.url().as_str()))
            .finish_non_exhaustive()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor {
    /// A monitor that starts online with good quality and has no probe.
    pub fn new() -> Self {
        Self::build(None, Duration::MAX)
    }

    /// A monitor whose [`probe`](Self::probe) uses `prober`. Round trips
    /// slower than `poor_latency` count as a poor connection.
    pub fn with_prober(prober: Prober, poor_latency: Duration) -> Self {
        Self::build(Some(prober), poor_latency)
    }

    /// Build the prober from the runtime config.
    pub fn from_config(config: &RealtimeConfig) -> Result<Self, CoreError> {
        let url = config
            .probe
            .url(&config.api_base_url)
            .map_err(|e| CoreError::Config {
                message: format!("invalid probe URL {:?}: {e}", config.probe.target),
            })?;
        let prober = Prober::new(url, &config.transport(), config.probe.timeout)?;
        Ok(Self::with_prober(prober, config.probe.poor_latency))
    }

    fn build(prober: Option<Prober>, poor_latency: Duration) -> Self {
        let (status, _) = watch::channel(NetworkStatus::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(MonitorInner {
                status,
                events,
                prober,
                poor_latency,
            }),
        }
    }

    pub fn status(&self) -> NetworkStatus {
        *self.inner.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Latest-value view of the status.
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.status.subscribe()
    }

    /// Stream of tagged change events, starting from now.
    pub fn subscribe(&self) -> broadcast::Receiver<NetworkChange> {
        self.inner.events.subscribe()
    }

    /// Authoritative connectivity event.
    ///
    /// Going offline forces `Offline` quality; coming back online restores
    /// `Good`. Repeating the current state changes nothing.
    pub fn set_online(&self, online: bool) -> bool {
        self.apply(|current| match (current.is_online(), online) {
            (false, true) => Some((NetworkStatus::online(ConnectionQuality::Good), ChangeReason::Online)),
            (true, false) => Some((NetworkStatus::OFFLINE, ChangeReason::Offline)),
            _ => None,
        })
    }

    /// Best-effort quality hint from the platform. Ignored while offline.
    pub fn on_link_change(&self, link: EffectiveLinkType) -> bool {
        self.apply(|current| {
            if current.is_online() {
                Some((NetworkStatus::online(link.quality()), ChangeReason::ConnectionChange))
            } else {
                debug!(%link, "ignoring link change while offline");
                None
            }
        })
    }

    /// Run one reachability probe and fold the result into the status.
    ///
    /// Without a configured prober this just returns the current status.
    pub async fn probe(&self) -> NetworkStatus {
        let Some(prober) = &self.inner.prober else {
            return self.status();
        };
        let reachability = prober.probe().await;
        self.record_probe(&reachability);
        self.status()
    }

    /// Apply a probe outcome.
    pub fn record_probe(&self, reachability: &Reachability) {
        if !reachability.reachable {
            self.set_online(false);
            return;
        }

        let quality = if reachability.latency > self.inner.poor_latency {
            ConnectionQuality::Poor
        } else {
            ConnectionQuality::Good
        };
        self.apply(|current| {
            let reason = if current.is_online() {
                ChangeReason::ConnectionChange
            } else {
                ChangeReason::Online
            };
            Some((NetworkStatus::online(quality), reason))
        });
    }

    /// Probe immediately, then on every `interval` tick until `cancel` fires.
    pub fn spawn_periodic_probe(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let status = monitor.probe().await;
                        debug!(online = status.is_online(), quality = %status.connection_quality(), "probe finished");
                    }
                }
            }
        })
    }

    fn apply(&self, decide: impl FnOnce(&NetworkStatus) -> Option<(NetworkStatus, ChangeReason)>) -> bool {
        self.inner.status.send_if_modified(|current| {
            let Some((next, reason)) = decide(current).filter(|(next, _)| *next != *current) else {
                return false;
            };
            *current = next;

            match reason {
                ChangeReason::Offline => warn!("network offline"),
                ChangeReason::Online => info!(quality = %next.connection_quality(), "network online"),
                ChangeReason::ConnectionChange => {
                    info!(quality = %next.connection_quality(), "connection quality changed");
                }
            }

            // Sent under the status lock so events keep the order of changes.
            // No receivers is fine.
            let _ = self.inner.events.send(NetworkChange { reason, status: next });
            true
        })
    }
}

impl Connectivity for NetworkMonitor {
    fn is_offline(&self) -> bool {
        !self.is_online()
    }
}
