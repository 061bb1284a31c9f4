//! `status`: reachability report, or a live feed of network changes.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use ledgerlink_api::{Prober, Reachability};
use ledgerlink_core::{ConnectionQuality, NetworkChange, NetworkStatus, Realtime};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config::{self, Resolved};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct StatusReport {
    api_url: String,
    probe_url: String,
    is_online: bool,
    connection_quality: ConnectionQuality,
    latency_ms: u64,
    http_status: Option<u16>,
    checked_at: DateTime<Utc>,
}

impl StatusReport {
    fn new(api_url: &str, probe_url: &str, status: NetworkStatus, reach: &Reachability) -> Self {
        Self {
            api_url: api_url.to_owned(),
            probe_url: probe_url.to_owned(),
            is_online: status.is_online(),
            connection_quality: status.connection_quality(),
            latency_ms: u64::try_from(reach.latency.as_millis()).unwrap_or(u64::MAX),
            http_status: reach.status,
            checked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChangeLine {
    at: DateTime<Utc>,
    #[serde(flatten)]
    change: NetworkChange,
}

pub async fn handle(args: StatusArgs, resolved: Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let api_url = resolved.realtime.api_base_url.clone();
    let probe_cfg = resolved.realtime.probe.clone();
    let probe_url = probe_cfg
        .url(&api_url)
        .map_err(|e| CliError::Validation {
            field: "probe_path".into(),
            reason: e.to_string(),
        })?;
    let prober = Prober::new(probe_url.clone(), &resolved.realtime.transport(), probe_cfg.timeout)?;
    let rt = config::build_runtime(global, resolved)?;
    let color = output::should_color(&global.color);

    let reach = prober.probe().await;
    rt.monitor().record_probe(&reach);
    let report = StatusReport::new(&api_url, probe_url.as_str(), rt.monitor().status(), &reach);
    let out = output::render_single(
        &global.output,
        &report,
        |r| format_report(r, color),
        |r| r.connection_quality.to_string(),
    );
    output::print_output(&out, global.quiet);

    if args.watch {
        let interval = args
            .interval
            .map_or(probe_cfg.interval, Duration::from_secs);
        watch(&rt, interval, global).await;
        rt.shutdown().await;
        return Ok(());
    }

    rt.shutdown().await;
    if report.is_online {
        Ok(())
    } else {
        Err(CliError::ConnectionFailed {
            url: probe_url.to_string(),
            source: "reachability probe failed".into(),
        })
    }
}

/// Run the periodic probe and print every network change until Ctrl-C.
async fn watch(rt: &Realtime, interval: Duration, global: &GlobalOpts) {
    let mut changes = rt.monitor().subscribe();
    rt.start(Some(interval)).await;
    let color = output::should_color(&global.color);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => match event {
                Ok(change) => {
                    let line = ChangeLine { at: Utc::now(), change };
                    let out = output::render_single(
                        &global.output,
                        &line,
                        |l| format_change(l, color),
                        |l| l.change.status.connection_quality().to_string(),
                    );
                    output::print_output(&out, global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status feed lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn format_report(r: &StatusReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "API:        {}", r.api_url);
    let _ = writeln!(out, "Probe:      {}", r.probe_url);
    let _ = writeln!(out, "Online:     {}", if r.is_online { "yes" } else { "no" });
    let _ = writeln!(out, "Quality:    {}", output::paint_quality(r.connection_quality, color));
    if r.is_online {
        let _ = writeln!(out, "Latency:    {}ms", r.latency_ms);
    }
    if let Some(status) = r.http_status {
        let _ = writeln!(out, "HTTP:       {status}");
    }
    let _ = write!(out, "Checked:    {}", r.checked_at.format("%Y-%m-%d %H:%M:%S UTC"));
    out
}

fn format_change(l: &ChangeLine, color: bool) -> String {
    format!(
        "{}  {:<17}  {}",
        l.at.format("%H:%M:%S"),
        l.change.reason,
        output::paint_quality(l.change.status.connection_quality(), color)
    )
}
