// ── User-facing notices ──
//
// Channels and the retry coordinator report noteworthy events (connection
// changes, retries, queued work, terminal failures) through a `Notifier`.
// How a notice is shown is up to the host: the CLI logs them, a GUI would
// toast them.

use std::time::Duration;

use serde::Serialize;
use strum::{Display, EnumString};

/// Notice severity, ordered from least to most alarming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// How long a notice of this severity stays on screen by default.
    pub fn default_life(self) -> Duration {
        match self {
            Self::Success | Self::Info => Duration::from_secs(3),
            Self::Warning => Duration::from_secs(5),
            Self::Error => Duration::from_secs(8),
        }
    }
}

/// A transient, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    /// Display duration.
    #[serde(with = "duration_ms")]
    pub life: Duration,
}

impl Notice {
    pub fn new(severity: Severity, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: detail.into(),
            life: severity.default_life(),
        }
    }

    pub fn success(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Success, summary, detail)
    }

    pub fn info(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Info, summary, detail)
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary, detail)
    }

    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary, detail)
    }

    /// Override the display duration.
    pub fn with_life(mut self, life: Duration) -> Self {
        self.life = life;
        self
    }
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Emits notices as `tracing` events at the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        let Notice {
            severity,
            summary,
            detail,
            ..
        } = notice;
        match severity {
            Severity::Success | Severity::Info => tracing::info!(%severity, %summary, "{detail}"),
            Severity::Warning => tracing::warn!(%summary, "{detail}"),
            Severity::Error => tracing::error!(%summary, "{detail}"),
        }
    }
}

/// Discards every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notice: Notice) {}
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}
