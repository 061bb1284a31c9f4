//! HTTP reachability probe.
//!
//! Any HTTP response (even a 4xx or 5xx) proves the backend is reachable;
//! only transport failures count as unreachable.

use std::time::Duration;

use tokio::time::Instant;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    pub reachable: bool,
    /// Round-trip time until the response headers arrived (or the failure).
    pub latency: Duration,
    /// HTTP status, when a response came back.
    pub status: Option<u16>,
}

/// Issues lightweight GET requests against a fixed URL.
#[derive(Debug, Clone)]
pub struct Prober {
    http: reqwest::Client,
    url: Url,
}

impl Prober {
    /// Build a prober whose requests time out after `timeout`.
    pub fn new(url: Url, transport: &TransportConfig, timeout: Duration) -> Result<Self, Error> {
        let transport = TransportConfig {
            timeout,
            ..transport.clone()
        };
        Ok(Self {
            http: transport.build_client()?,
            url,
        })
    }

    /// The URL being probed.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Probe once. Never fails; failures are reported as unreachable.
    pub async fn probe(&self) -> Reachability {
        let started = Instant::now();
        let result = self.http.get(self.url.clone()).send().await;
        let latency = started.elapsed();

        match result {
            Ok(resp) => {
                tracing::trace!(url = %self.url, status = resp.status().as_u16(), "probe ok");
                Reachability {
                    reachable: true,
                    latency,
                    status: Some(resp.status().as_u16()),
                }
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "probe failed");
                Reachability {
                    reachable: false,
                    latency,
                    status: None,
                }
            }
        }
    }
}
