// ── Realtime runtime ──
//
// Bundles the three process-wide services (channel registry, network
// monitor, retry coordinator) and owns the background tasks that tie them
// together: the periodic reachability probe and the queue drainer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::channel::{Channel, ChannelRegistry};
use crate::config::RealtimeConfig;
use crate::error::CoreError;
use crate::network::NetworkMonitor;
use crate::notify::Notifier;
use crate::retry::RetryCoordinator;
use crate::token::TokenSource;

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<RealtimeInner>`. [`new`](Self::new) only
/// builds the services; [`start`](Self::start) spawns the background tasks
/// and [`shutdown`](Self::shutdown) stops them together with every channel.
#[derive(Clone)]
pub struct Realtime {
    inner: Arc<RealtimeInner>,
}

struct RealtimeInner {
    config: RealtimeConfig,
    registry: ChannelRegistry,
    monitor: NetworkMonitor,
    retry: RetryCoordinator,
    /// Cancelled on shutdown, replaced on the next start.
    cancel: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Realtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realtime")
            .field("registry", &self.inner.registry)
            .field("monitor", &self.inner.monitor)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl Realtime {
    pub fn new(
        config: RealtimeConfig,
        tokens: Arc<dyn TokenSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, CoreError> {
        let monitor = NetworkMonitor::from_config(&config)?;
        let registry = ChannelRegistry::new(&config, tokens, Arc::clone(&notifier));
        let retry = RetryCoordinator::from_config(&config, Arc::new(monitor.clone()), notifier);

        Ok(Self {
            inner: Arc::new(RealtimeInner {
                config,
                registry,
                monitor,
                retry,
                cancel: Mutex::new(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    pub fn monitor(&self) -> &NetworkMonitor {
        &self.inner.monitor
    }

    pub fn retry(&self) -> &RetryCoordinator {
        &self.inner.retry
    }

    /// Shorthand for `registry().get_channel(path)`.
    pub fn channel(&self, path: &str) -> Channel {
        self.inner.registry.get_channel(path)
    }

    /// Spawn the queue drainer and, unless `probe_interval` is `None`, the
    /// periodic reachability probe (which probes once right away).
    ///
    /// Calling `start` on a running instance restarts the tasks.
    pub async fn start(&self, probe_interval: Option<Duration>) {
        self.stop_tasks().await;

        let cancel = CancellationToken::new();
        let mut handles = self.inner.task_handles.lock().await;

        handles.push(
            self.inner
                .retry
                .spawn_queue_drainer(&self.inner.monitor, cancel.child_token()),
        );
        if let Some(interval) = probe_interval {
            handles.push(
                self.inner
                    .monitor
                    .spawn_periodic_probe(interval, cancel.child_token()),
            );
        }

        *self.inner.cancel.lock().await = cancel;
        info!(tasks = handles.len(), "realtime services started");
    }

    /// [`start`](Self::start) with the configured probe interval.
    pub async fn start_default(&self) {
        self.start(Some(self.inner.config.probe.interval)).await;
    }

    /// Stop background tasks and close every channel.
    pub async fn shutdown(&self) {
        self.stop_tasks().await;
        self.inner.registry.close_all();
        debug!("realtime services stopped");
    }

    async fn stop_tasks(&self) {
        self.inner.cancel.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }
}
