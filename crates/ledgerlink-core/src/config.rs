// ── Runtime connection configuration ──
//
// These types describe *how* to reach the ERP backend and how patiently to
// retry. They never touch disk; `ledgerlink-config` builds a
// `RealtimeConfig` from profiles and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use ledgerlink_api::transport::{TlsMode, TransportConfig};
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed staging backends).
    DangerAcceptInvalid,
}

/// Request-level retry defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_attempts: u32,
    /// Back-off before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Reachability probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Absolute URL, or a path resolved against the API base URL.
    pub target: String,
    /// How often the periodic probe runs.
    pub interval: Duration,
    /// Per-probe request timeout.
    pub timeout: Duration,
    /// Round trips slower than this mark the connection as poor.
    pub poor_latency: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target: "/health".into(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            poor_latency: Duration::from_millis(1500),
        }
    }
}

impl ProbeConfig {
    /// Resolve the probe target against the API base URL.
    pub fn url(&self, api_base_url: &str) -> Result<Url, url::ParseError> {
        Url::parse(&self.target).or_else(|_| Url::parse(api_base_url)?.join(&self.target))
    }
}

/// Everything the core needs to talk to one backend.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// REST base URL (e.g. `https://erp.example.com/api/v1`). Channel
    /// endpoints reuse only its origin. Kept as a string: a malformed value
    /// degrades to `fallback_origin` instead of failing.
    pub api_base_url: String,
    /// Origin used when `api_base_url` does not parse.
    pub fallback_origin: Url,
    /// Constant delay between channel reconnect attempts.
    pub reconnect_delay: Duration,
    /// Request-level retry defaults.
    pub retry: RetryPolicy,
    /// Drain passes an offline-queued operation may fail before it is dropped.
    pub queue_max_retries: u32,
    /// Reachability probe settings.
    pub probe: ProbeConfig,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".into(),
            fallback_origin: "http://localhost".parse().expect("static URL is valid"),
            reconnect_delay: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            queue_max_retries: 3,
            probe: ProbeConfig::default(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RealtimeConfig {
    /// Build a [`TransportConfig`] for the HTTP side.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RealtimeConfig::default();
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(3));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(cfg.queue_max_retries, 3);
        assert_eq!(cfg.fallback_origin.as_str(), "http://localhost/");
    }

    #[test]
    fn probe_target_resolves_relative_to_base() {
        let probe = ProbeConfig::default();
        let url = probe.url("https://erp.example.com/api/v1").expect("resolvable");
        assert_eq!(url.as_str(), "https://erp.example.com/health");
    }

    #[test]
    fn probe_target_may_be_absolute() {
        let probe = ProbeConfig {
            target: "https://status.example.com/ping".into(),
            ..ProbeConfig::default()
        };
        let url = probe.url("not a url").expect("absolute target ignores base");
        assert_eq!(url.host_str(), Some("status.example.com"));
    }
}
