//! Rendering for `--output` (table, json, json-compact, yaml, plain) and the
//! stderr side of the CLI: notices and connection-state lines go there so
//! stdout carries only data.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use ledgerlink_core::{ConnectionQuality, ConnectionStatus, Notice, Notifier, Severity};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Color is on for `always`, or for `auto` on a terminal without `NO_COLOR`.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stderr().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub fn paint_status(status: ConnectionStatus, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status {
        ConnectionStatus::Connected => status.green().to_string(),
        ConnectionStatus::Connecting => status.yellow().to_string(),
        ConnectionStatus::Disconnected => status.dimmed().to_string(),
        ConnectionStatus::Error => status.red().to_string(),
    }
}

pub fn paint_quality(quality: ConnectionQuality, color: bool) -> String {
    if !color {
        return quality.to_string();
    }
    match quality {
        ConnectionQuality::Good => quality.green().to_string(),
        ConnectionQuality::Poor => quality.yellow().to_string(),
        ConnectionQuality::Offline => quality.red().to_string(),
    }
}

// ── Notices ──────────────────────────────────────────────────────────

/// Prints retry and queue notices to stderr, one line each.
#[derive(Debug, Clone)]
pub struct ConsoleNotifier {
    pub color: bool,
    pub quiet: bool,
}

impl ConsoleNotifier {
    fn format(&self, notice: &Notice) -> String {
        let marker = match notice.severity {
            Severity::Success => "✓",
            Severity::Info => "i",
            Severity::Warning => "!",
            Severity::Error => "✗",
        };
        let line = format!("{marker} {}: {}", notice.summary, notice.detail);
        if !self.color {
            return line;
        }
        match notice.severity {
            Severity::Success => line.green().to_string(),
            Severity::Info => line.to_string(),
            Severity::Warning => line.yellow().to_string(),
            Severity::Error => line.red().to_string(),
        }
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        // Errors still surface through the command's own result.
        if self.quiet && notice.severity != Severity::Error {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", self.format(&notice));
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render rows for `--output`.
///
/// Structured formats serialize `data` as-is; `table` maps each item
/// through `to_row`; `plain` prints `id_fn` of each item on its own line.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    if let Some(out) = render_structured(format, data) {
        return out;
    }
    if matches!(format, OutputFormat::Plain) {
        return data.iter().map(id_fn).collect::<Vec<_>>().join("\n");
    }
    let rows: Vec<R> = data.iter().map(to_row).collect();
    render_table(&rows)
}

/// Render one record. `detail_fn` builds the human view used for `table`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    if let Some(out) = render_structured(format, data) {
        return out;
    }
    if matches!(format, OutputFormat::Plain) {
        id_fn(data)
    } else {
        detail_fn(data)
    }
}

/// Write rendered output to stdout. Nothing is printed in quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty-printed JSON.
pub(crate) fn render_json_pretty<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).expect("serialization should not fail")
}

/// Compact single-line JSON.
pub(crate) fn render_json_compact<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).expect("serialization should not fail")
}

/// The serde-backed formats; `None` for table and plain.
fn render_structured<T: serde::Serialize + ?Sized>(format: &OutputFormat, data: &T) -> Option<String> {
    match format {
        OutputFormat::Json => Some(render_json_pretty(data)),
        OutputFormat::JsonCompact => Some(render_json_compact(data)),
        OutputFormat::Yaml => Some(render_yaml(data)),
        OutputFormat::Table | OutputFormat::Plain => None,
    }
}

/// YAML output.
pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).expect("serialization should not fail")
}
