// ── Retry / offline coordinator ──
//
// Runs async operations with bounded exponential back-off and cooperates
// with a `Connectivity` source: nothing is attempted while offline, work is
// parked in the `RetryQueue` instead, and the queue is drained once per
// online transition.

mod queue;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RealtimeConfig, RetryPolicy};
use crate::error::CoreError;
use crate::network::{ChangeReason, Connectivity, NetworkMonitor};
use crate::notify::{Notice, Notifier};

pub use queue::{BoxError, DrainReport, QueuedAction, QueuedOperation, RetryQueue};

// ── Failure classification ───────────────────────────────────────

/// Coarse failure class used by the default retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// No response at all: refused, reset, DNS, dropped socket.
    Network,
    /// 5xx response.
    Server,
    /// Request timeout (client-side or 408).
    Timeout,
    /// 4xx response, validation failure.
    Client,
    Other,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Timeout)
    }
}

/// Errors that can be classified for retry purposes.
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;
}

fn kind_from_status(status: Option<u16>) -> FailureKind {
    match status {
        Some(408) => FailureKind::Timeout,
        Some(s) if s >= 500 => FailureKind::Server,
        Some(s) if (400..500).contains(&s) => FailureKind::Client,
        _ => FailureKind::Other,
    }
}

impl Classify for ledgerlink_api::Error {
    fn failure_kind(&self) -> FailureKind {
        if self.is_timeout() {
            FailureKind::Timeout
        } else if self.is_network() {
            FailureKind::Network
        } else {
            kind_from_status(self.status())
        }
    }
}

impl Classify for CoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::ConnectionFailed { .. } => FailureKind::Network,
            Self::Config { .. } | Self::Internal(_) => FailureKind::Other,
            _ => kind_from_status(self.status()),
        }
    }
}

// ── Options ──────────────────────────────────────────────────────

type RetryHook<E> = Arc<dyn Fn(&E, u32, u32) + Send + Sync>;
type ExhaustedHook<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;
type RetryPredicate<E> = Arc<dyn Fn(&E, u32) -> bool + Send + Sync>;

/// Per-call retry options.
///
/// `max_attempts` counts retries after the first try, so the default of 3
/// means up to 4 invocations.
pub struct RetryOptions<E> {
    pub max_attempts: u32,
    /// Back-off before the first retry; doubles on each further retry.
    pub delay: Duration,
    /// Used in notices and queue entries.
    pub description: String,
    on_retry: Option<RetryHook<E>>,
    on_max_retries_exceeded: Option<ExhaustedHook<E>>,
    should_retry: Option<RetryPredicate<E>>,
}

impl<E> Clone for RetryOptions<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: self.delay,
            description: self.description.clone(),
            on_retry: self.on_retry.clone(),
            on_max_retries_exceeded: self.on_max_retries_exceeded.clone(),
            should_retry: self.should_retry.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryOptions<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("description", &self.description)
            .field("should_retry", &self.should_retry.is_some())
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryOptions<E> {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}

impl<E> RetryOptions<E> {
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            delay: policy.base_delay,
            description: "operation".into(),
            on_retry: None,
            on_max_retries_exceeded: None,
            should_retry: None,
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Called before each back-off with `(error, retry_number, max_attempts)`;
    /// `retry_number` starts at 1.
    pub fn on_retry(mut self, hook: impl Fn(&E, u32, u32) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Called once with `(last_error, attempts_made)` when every allowed
    /// attempt failed with a retryable error.
    pub fn on_max_retries_exceeded(mut self, hook: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
        self.on_max_retries_exceeded = Some(Arc::new(hook));
        self
    }

    /// Replace the default classifier. Receives `(error, attempt)` where
    /// `attempt` is the zero-based index of the attempt that just failed.
    pub fn should_retry(mut self, predicate: impl Fn(&E, u32) -> bool + Send + Sync + 'static) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }
}

// ── RetryError ───────────────────────────────────────────────────

/// Outcome of a retry-wrapped call that did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last real error from the operation.
    Failed(E),
    /// Not attempted (or abandoned) because the system is offline; the
    /// operation was parked in the retry queue.
    Queued { description: String },
}

impl<E> RetryError<E> {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// The operation's error, if it actually failed.
    pub fn into_failed(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Queued { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => fmt::Display::fmt(e, f),
            Self::Queued { description } => {
                write!(f, "offline: {description} queued until connectivity returns")
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(e) => e.source(),
            Self::Queued { .. } => None,
        }
    }
}

/// Back-off before retry number `retry` (1-based): `base * 2^(retry-1)`.
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let factor = 1_u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

// ── RetryCoordinator ─────────────────────────────────────────────

/// Shared retry front-end. Cheaply cloneable; clones share the queue.
#[derive(Clone)]
pub struct RetryCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    connectivity: Arc<dyn Connectivity>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
    queue_max_retries: u32,
    queue: RetryQueue,
}

impl fmt::Debug for RetryCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryCoordinator")
            .field("policy", &self.inner.policy)
            .field("queue_max_retries", &self.inner.queue_max_retries)
            .field("queued", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl RetryCoordinator {
    pub fn new(
        connectivity: Arc<dyn Connectivity>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        queue_max_retries: u32,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                connectivity,
                notifier,
                policy,
                queue_max_retries,
                queue: RetryQueue::new(),
            }),
        }
    }

    pub fn from_config(
        config: &RealtimeConfig,
        connectivity: Arc<dyn Connectivity>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(connectivity, notifier, config.retry, config.queue_max_retries)
    }

    /// Options pre-filled from this coordinator's policy.
    pub fn options<E>(&self) -> RetryOptions<E> {
        RetryOptions::from_policy(&self.inner.policy)
    }

    /// Run `action` with bounded retry.
    ///
    /// Offline before the first attempt: `action` is not invoked, it is
    /// queued, and `RetryError::Queued` is returned. Otherwise failures the
    /// classifier accepts are retried after `delay * 2^(n-1)` until
    /// `max_attempts` retries are spent; the last error is returned as
    /// `RetryError::Failed`.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        action: F,
        options: RetryOptions<E>,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        if self.inner.connectivity.is_offline() {
            return Err(self.defer(options.description, action));
        }
        self.run_attempts(&action, &options)
            .await
            .map_err(|(err, attempts)| self.fail(&options.description, err, attempts))
    }

    /// [`execute_with_retry`](Self::execute_with_retry) with default
    /// options; additionally, if the final failure happens while offline,
    /// the operation is queued instead of failing.
    pub async fn retry_operation<F, Fut, T, E>(
        &self,
        action: F,
        description: impl Into<String>,
    ) -> Result<T, RetryError<E>>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        let options = self.options::<E>().description(description);
        if self.inner.connectivity.is_offline() {
            return Err(self.defer(options.description, action));
        }
        match self.run_attempts(&action, &options).await {
            Ok(value) => Ok(value),
            Err(_) if self.inner.connectivity.is_offline() => Err(self.defer(options.description, action)),
            Err((err, attempts)) => Err(self.fail(&options.description, err, attempts)),
        }
    }

    /// Append an operation to the offline queue.
    pub fn add_to_retry_queue(&self, op: QueuedOperation) {
        debug!(description = %op.description, "operation queued");
        self.inner.queue.push(op);
    }

    /// Drain the queue once.
    ///
    /// The current contents are taken in FIFO order. Operations that already
    /// failed `queue_max_retries` drain passes are dropped without running.
    /// The rest run once each; failures go back on the queue with their
    /// count bumped and wait for the *next* drain, so one pass never loops.
    pub async fn process_retry_queue(&self) -> DrainReport {
        let pending = self.inner.queue.take_all();
        let mut report = DrainReport::default();
        if pending.is_empty() {
            return report;
        }
        info!(count = pending.len(), "processing retry queue");

        for mut op in pending {
            if op.retry_count >= self.inner.queue_max_retries {
                warn!(
                    description = %op.description,
                    retry_count = op.retry_count,
                    queued_at = %op.queued_at,
                    "dropping queued operation, retry budget exhausted"
                );
                report.dropped += 1;
                continue;
            }

            match op.run().await {
                Ok(()) => {
                    debug!(description = %op.description, "queued operation succeeded");
                    report.succeeded += 1;
                }
                Err(e) => {
                    op.retry_count += 1;
                    warn!(
                        description = %op.description,
                        retry_count = op.retry_count,
                        error = %e,
                        "queued operation failed, keeping it for the next pass"
                    );
                    self.inner.queue.push(op);
                    report.requeued += 1;
                }
            }
        }

        if report.succeeded > 0 {
            self.inner.notifier.notify(Notice::success(
                "Back online",
                format!("{} queued operation(s) completed", report.succeeded),
            ));
        }
        if report.dropped > 0 {
            self.inner.notifier.notify(Notice::error(
                "Queued operations abandoned",
                format!("{} operation(s) failed too many times and were dropped", report.dropped),
            ));
        }
        report
    }

    /// Drain the queue once per `Online` event from `monitor`.
    pub fn spawn_queue_drainer(&self, monitor: &NetworkMonitor, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = self.clone();
        let monitor = monitor.clone();
        let mut events = monitor.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(change) if change.reason == ChangeReason::Online => {
                            let report = coordinator.process_retry_queue().await;
                            debug!(?report, "retry queue drained");
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "network events lagged");
                            if monitor.is_online() {
                                coordinator.process_retry_queue().await;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        })
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Descriptions of queued operations, oldest first.
    pub fn queued_descriptions(&self) -> Vec<String> {
        self.inner.queue.descriptions()
    }

    /// Forget every queued operation. Returns how many were dropped.
    pub fn clear_queue(&self) -> usize {
        self.inner.queue.clear()
    }

    // ── Internals ────────────────────────────────────────────────

    /// Attempt loop. On giving up, returns the last error with the number of
    /// attempts made; reporting the failure is left to the caller.
    async fn run_attempts<F, Fut, T, E>(&self, action: &F, options: &RetryOptions<E>) -> Result<T, (E, u32)>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::error::Error,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match action().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let attempts_made = attempt + 1;
            let retryable = self.should_retry(&err, attempt, options);

            if !retryable || attempt >= options.max_attempts {
                if let Some(hook) = options.on_max_retries_exceeded.as_ref().filter(|_| retryable) {
                    hook(&err, attempts_made);
                }
                return Err((err, attempts_made));
            }

            attempt += 1;
            let delay = backoff_delay(options.delay, attempt);
            if let Some(hook) = &options.on_retry {
                hook(&err, attempt, options.max_attempts);
            }
            info!(
                description = %options.description,
                attempt,
                max_attempts = options.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "retrying operation"
            );
            self.inner.notifier.notify(Notice::warning(
                "Retrying",
                format!(
                    "{} failed, retry {attempt} of {} in {}ms",
                    options.description,
                    options.max_attempts,
                    delay.as_millis()
                ),
            ));
            tokio::time::sleep(delay).await;
        }
    }

    /// Terminal failure: log, tell the user, hand back the last error.
    fn fail<E: std::error::Error>(&self, description: &str, err: E, attempts: u32) -> RetryError<E> {
        warn!(description = %description, attempts, error = %err, "operation failed");
        self.inner.notifier.notify(Notice::error(
            "Operation failed",
            format!("{description} failed after {attempts} attempt(s): {err}"),
        ));
        RetryError::Failed(err)
    }

    fn should_retry<E: Classify>(&self, err: &E, attempt: u32, options: &RetryOptions<E>) -> bool {
        match &options.should_retry {
            Some(predicate) => predicate(err, attempt),
            None => !self.inner.connectivity.is_offline() && err.failure_kind().is_retryable(),
        }
    }

    fn defer<F, Fut, T, E>(&self, description: String, action: F) -> RetryError<E>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        info!(description = %description, "offline, queueing operation");
        self.inner.notifier.notify(Notice::info(
            "Queued for later",
            format!("{description} will run when the connection returns"),
        ));
        self.add_to_retry_queue(QueuedOperation::new(description.clone(), action));
        RetryError::Queued { description }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;
    use crate::notify::Severity;

    // ── Fixtures ─────────────────────────────────────────────────

    #[derive(Debug, Default)]
    struct Switch(AtomicBool);

    impl Switch {
        fn offline() -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(true)))
        }

        fn online() -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(false)))
        }

        fn set_offline(&self, offline: bool) {
            self.0.store(offline, Ordering::SeqCst);
        }
    }

    impl Connectivity for Switch {
        fn is_offline(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<Notice>>);

    impl Recorder {
        fn count(&self, severity: Severity) -> usize {
            self.0
                .lock()
                .expect("recorder lock")
                .iter()
                .filter(|n| n.severity == severity)
                .count()
        }
    }

    impl Notifier for Recorder {
        fn notify(&self, notice: Notice) {
            self.0.lock().expect("recorder lock").push(notice);
        }
    }

    fn coordinator(connectivity: Arc<Switch>, notices: Arc<Recorder>) -> RetryCoordinator {
        RetryCoordinator::new(connectivity, notices, RetryPolicy::default(), 3)
    }

    fn unavailable() -> ledgerlink_api::Error {
        ledgerlink_api::Error::Status {
            status: 503,
            message: "Service Unavailable".into(),
        }
    }

    // ── Classification ───────────────────────────────────────────

    #[test]
    fn default_classification() {
        assert_eq!(unavailable().failure_kind(), FailureKind::Server);
        let invalid = ledgerlink_api::Error::Status {
            status: 422,
            message: "bad".into(),
        };
        assert_eq!(invalid.failure_kind(), FailureKind::Client);
        assert!(ledgerlink_api::Error::WebSocketConnect("refused".into()).failure_kind().is_retryable());
        assert!(!CoreError::Config { message: "x".into() }.failure_kind().is_retryable());
        assert!(CoreError::Timeout { timeout_ms: 5 }.failure_kind().is_retryable());
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
        assert!(backoff_delay(base, 200) > Duration::from_secs(1 << 31));
    }

    // ── execute_with_retry ───────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_backs_off_exponentially() {
        let notices = Arc::new(Recorder::default());
        let retry = coordinator(Switch::online(), Arc::clone(&notices));

        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let seen = Arc::clone(&calls);
        let exhausted = Arc::new(AtomicU32::new(0));
        let exhausted_hook = Arc::clone(&exhausted);

        let options = RetryOptions::<ledgerlink_api::Error>::default()
            .max_attempts(3)
            .delay(Duration::from_millis(1000))
            .description("load invoices")
            .on_max_retries_exceeded(move |_, attempts| exhausted_hook.store(attempts, Ordering::SeqCst));

        let started = Instant::now();
        let result: Result<(), _> = retry
            .execute_with_retry(
                move || {
                    seen.lock().expect("calls lock").push(Instant::now());
                    async { Err::<(), _>(unavailable()) }
                },
                options,
            )
            .await;

        let err = result.expect_err("should fail").into_failed().expect("real error");
        assert_eq!(err.status(), Some(503));

        let offsets: Vec<u128> = calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|at| at.duration_since(started).as_millis())
            .collect();
        assert_eq!(offsets, vec![0, 1000, 3000, 7000]);
        assert_eq!(exhausted.load(Ordering::SeqCst), 4);
        assert_eq!(notices.count(Severity::Warning), 3);
        assert_eq!(notices.count(Severity::Error), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_once_then_succeed() {
        let notices = Arc::new(Recorder::default());
        let retry = coordinator(Switch::online(), Arc::clone(&notices));

        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let retries = Arc::new(AtomicU32::new(0));
        let retry_hook = Arc::clone(&retries);

        let value = retry
            .execute_with_retry(
                move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { if n == 0 { Err(unavailable()) } else { Ok("posted") } }
                },
                RetryOptions::<ledgerlink_api::Error>::default().on_retry(move |_, _, _| {
                    retry_hook.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .expect("second attempt succeeds");

        assert_eq!(value, "posted");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(notices.count(Severity::Warning), 1);
        assert_eq!(notices.count(Severity::Error), 0);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let retry = coordinator(Switch::online(), Arc::new(Recorder::default()));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = retry
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err(ledgerlink_api::Error::Status {
                            status: 422,
                            message: "invalid".into(),
                        })
                    }
                },
                RetryOptions::default(),
            )
            .await;

        assert!(matches!(result, Err(RetryError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_overrides_classifier() {
        let retry = coordinator(Switch::online(), Arc::new(Recorder::default()));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = retry
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err(unavailable()) }
                },
                RetryOptions::<ledgerlink_api::Error>::default().should_retry(|_, _| false),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn offline_call_is_queued_without_running() {
        let notices = Arc::new(Recorder::default());
        let retry = coordinator(Switch::offline(), Arc::clone(&notices));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = retry
            .execute_with_retry(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<(), ledgerlink_api::Error>(()) }
                },
                RetryOptions::default().description("save draft"),
            )
            .await;

        match result {
            Err(RetryError::Queued { description }) => assert_eq!(description, "save draft"),
            other => panic!("expected queued, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(retry.queued_descriptions(), vec!["save draft"]);
        assert_eq!(notices.count(Severity::Info), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_operation_queues_when_offline_at_the_end() {
        let connectivity = Switch::online();
        let notices = Arc::new(Recorder::default());
        let retry = coordinator(Arc::clone(&connectivity), Arc::clone(&notices));
        let switch = Arc::clone(&connectivity);

        let result: Result<(), _> = retry
            .retry_operation(
                move || {
                    // The link dies during the first attempt.
                    switch.set_offline(true);
                    async { Err(ledgerlink_api::Error::WebSocketConnect("reset".into())) }
                },
                "sync ledger",
            )
            .await;

        assert!(result.expect_err("not successful").is_queued());
        assert_eq!(retry.queue_len(), 1);
        assert_eq!(notices.count(Severity::Error), 0);
        assert_eq!(notices.count(Severity::Info), 1);
    }

    // ── Queue draining ───────────────────────────────────────────

    fn recording_op(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, fail: bool) -> QueuedOperation {
        let log = Arc::clone(log);
        QueuedOperation::new(name, move || {
            log.lock().expect("log lock").push(name);
            async move { if fail { Err(unavailable()) } else { Ok(()) } }
        })
    }

    #[tokio::test]
    async fn drain_runs_in_insertion_order() {
        let retry = coordinator(Switch::online(), Arc::new(Recorder::default()));
        let log = Arc::new(Mutex::new(Vec::new()));
        retry.add_to_retry_queue(recording_op("first", &log, false));
        retry.add_to_retry_queue(recording_op("second", &log, false));

        let report = retry.process_retry_queue().await;

        assert_eq!(*log.lock().expect("log lock"), vec!["first", "second"]);
        assert_eq!(report.succeeded, 2);
        assert_eq!(retry.queue_len(), 0);
    }

    #[tokio::test]
    async fn exhausted_operation_is_dropped_unrun() {
        let notices = Arc::new(Recorder::default());
        let retry = coordinator(Switch::online(), Arc::clone(&notices));
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut tired = recording_op("tired", &log, false);
        tired.retry_count = 3;
        retry.add_to_retry_queue(tired);
        retry.add_to_retry_queue(recording_op("fresh", &log, false));

        let report = retry.process_retry_queue().await;

        assert_eq!(*log.lock().expect("log lock"), vec!["fresh"]);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.attempted(), 1);
        assert_eq!(notices.count(Severity::Error), 1);
    }

    #[tokio::test]
    async fn failures_wait_for_the_next_drain() {
        let retry = coordinator(Switch::online(), Arc::new(Recorder::default()));
        let log = Arc::new(Mutex::new(Vec::new()));
        retry.add_to_retry_queue(recording_op("flaky", &log, true));

        // One pass runs the operation exactly once, however it ends.
        for pass in 1..=3 {
            let report = retry.process_retry_queue().await;
            assert_eq!(report.requeued, 1, "pass {pass}");
            assert_eq!(log.lock().expect("log lock").len(), pass);
        }

        // Three failed passes exhaust the budget.
        let report = retry.process_retry_queue().await;
        assert_eq!(report.dropped, 1);
        assert_eq!(log.lock().expect("log lock").len(), 3);
        assert_eq!(retry.queue_len(), 0);
    }

    #[tokio::test]
    async fn drainer_reacts_to_online_transition() {
        let monitor = NetworkMonitor::new();
        monitor.set_online(false);
        let retry = RetryCoordinator::new(
            Arc::new(monitor.clone()),
            Arc::new(Recorder::default()),
            RetryPolicy::default(),
            3,
        );
        let cancel = CancellationToken::new();
        let drainer = retry.spawn_queue_drainer(&monitor, cancel.clone());

        let log = Arc::new(Mutex::new(Vec::new()));
        retry.add_to_retry_queue(recording_op("deferred", &log, false));
        monitor.set_online(true);

        for _ in 0..100 {
            if retry.queue_len() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*log.lock().expect("log lock"), vec!["deferred"]);

        cancel.cancel();
        drainer.await.expect("drainer exits cleanly");
    }
}
