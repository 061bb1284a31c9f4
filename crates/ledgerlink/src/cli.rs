//! Clap derive structures for the `ledgerlink` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ledgerlink -- realtime channels and resilient requests for the ERP backend
#[derive(Debug, Parser)]
#[command(
    name = "ledgerlink",
    version,
    about = "Talk to the ledgerlink ERP backend from the command line",
    long_about = "Subscribe to realtime WebSocket channels, send channel messages,\n\
        issue REST requests with bounded retry and offline queueing, and\n\
        check backend reachability.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "LEDGERLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend API URL (overrides profile)
    #[arg(long, short = 'u', env = "LEDGERLINK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token (overrides profile, env var, and keyring)
    #[arg(long, env = "LEDGERLINK_TOKEN", global = true, hide_env = true)]
    pub token: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "LEDGERLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LEDGERLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "LEDGERLINK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "LEDGERLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to a realtime channel and print what arrives
    #[command(alias = "l")]
    Listen(ListenArgs),

    /// Send one message on a realtime channel
    Send(SendArgs),

    /// Issue a REST request with retry and offline queueing
    #[command(alias = "req", alias = "r")]
    Request(RequestArgs),

    /// Probe the backend and report the network status
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Manage configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Realtime ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Channel path, resolved against the API origin (e.g. /ws/orders)
    pub path: String,

    /// Exit after this many messages
    #[arg(long, short = 'n', value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,

    /// Also print connection state changes (to stderr)
    #[arg(long, short = 's')]
    pub states: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Channel path, resolved against the API origin
    pub path: String,

    /// Message body; sent as a JSON frame when it parses as JSON
    pub message: String,

    /// Send the body verbatim as a text frame, even if it looks like JSON
    #[arg(long)]
    pub raw: bool,

    /// Seconds to wait for the channel to connect
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,
}

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// HTTP method
    pub method: HttpMethod,

    /// API path, relative to the API base URL (e.g. /invoices/42)
    pub path: String,

    /// JSON request body (POST only)
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Retries after the first attempt (overrides profile)
    #[arg(long)]
    pub retries: Option<u32>,

    /// Back-off before the first retry, in milliseconds (overrides profile)
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// When the backend is unreachable, keep the request queued and wait
    /// up to this many seconds for connectivity to return
    #[arg(long, value_name = "SECS")]
    pub wait_online: Option<u64>,

    /// Seconds between reachability probes while waiting
    #[arg(long, default_value = "5", requires = "wait_online")]
    pub probe_interval: u64,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Keep probing and print every change until interrupted
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Seconds between probes in watch mode (defaults to the profile's)
    #[arg(long, requires = "watch")]
    pub interval: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the current configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Set a profile value
    Set {
        /// Config key (api_url, token_env, insecure, timeout, ...)
        key: String,
        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store a bearer token in the system keyring
    SetToken {
        /// Token value (read from stdin when omitted)
        token: Option<String>,
    },

    /// Remove the keyring token of the active profile
    DeleteToken,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
