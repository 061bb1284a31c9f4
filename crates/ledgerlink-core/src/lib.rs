//! Realtime and resilience layer between `ledgerlink-api` and its consumers.
//!
//! - **[`ChannelRegistry`]** vends one shared [`Channel`] per resolved
//!   endpoint. A channel keeps its WebSocket alive with a constant reconnect
//!   delay, fans inbound messages out to callback subscribers, and publishes
//!   its [`ConnectionStatus`] separately from data.
//!
//! - **[`RetryCoordinator`]** runs async operations with bounded exponential
//!   back-off, refuses to attempt work while offline, and parks it in an
//!   offline queue that is drained once per online transition.
//!
//! - **[`NetworkMonitor`]** owns the `{is_online, connection_quality}`
//!   signal, fed by connectivity events, link-type hints, and an HTTP
//!   reachability probe.
//!
//! - **[`Realtime`]** bundles the three and runs their background tasks.

pub mod channel;
pub mod config;
pub mod error;
pub mod network;
pub mod notify;
pub mod realtime;
pub mod retry;
pub mod token;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::{Channel, ChannelRegistry, ConnectionStatus, Subscription};
pub use config::{ProbeConfig, RealtimeConfig, RetryPolicy, TlsVerification};
pub use error::CoreError;
pub use network::{
    ChangeReason, ConnectionQuality, Connectivity, EffectiveLinkType, NetworkChange,
    NetworkMonitor, NetworkStatus,
};
pub use notify::{Notice, Notifier, NullNotifier, Severity, TracingNotifier};
pub use realtime::Realtime;
pub use retry::{
    Classify, DrainReport, FailureKind, QueuedOperation, RetryCoordinator, RetryError,
    RetryOptions,
};
pub use token::{SessionTokenStore, TokenSource};

// Message types travel through channels unchanged.
pub use ledgerlink_api::{InboundMessage, OutboundMessage};
