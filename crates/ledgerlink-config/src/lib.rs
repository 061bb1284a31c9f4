//! Shared configuration for ledgerlink.
//!
//! TOML profiles, bearer token resolution (env + keyring + plaintext), and
//! translation to `ledgerlink_core::RealtimeConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use ledgerlink_core::{ProbeConfig, RealtimeConfig, RetryPolicy, TlsVerification};

const KEYRING_SERVICE: &str = "ledgerlink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile, falling back to `default_profile`, then `"default"`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            queue_max_retries: default_queue_max_retries(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_queue_max_retries() -> u32 {
    3
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// REST base URL (e.g., "https://erp.example.com/api/v1").
    pub api_url: String,

    /// Bearer token in plaintext. Prefer the keyring or `token_env`.
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override HTTP timeout (seconds).
    pub timeout: Option<u64>,

    /// Override channel reconnect delay.
    pub reconnect_delay_ms: Option<u64>,

    /// Override request retry count.
    pub retry_attempts: Option<u32>,

    /// Override base retry back-off.
    pub retry_delay_ms: Option<u64>,

    /// Reachability probe target (path or absolute URL).
    pub probe_path: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "ledgerlink", "ledgerlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("ledgerlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// A missing file yields the defaults. Environment variables prefixed
/// `LEDGERLINK_` override file values; nested keys are separated by a
/// double underscore (`LEDGERLINK_DEFAULTS__TIMEOUT=10`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LEDGERLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the bearer token: `token_env` variable, then the system
/// keyring, then plaintext. `None` means connect unauthenticated.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    token_chain(profile, profile_name, keyring_token)
}

fn token_chain(
    profile: &Profile,
    profile_name: &str,
    keyring_lookup: impl Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Some(secret) = keyring_lookup(profile_name) {
        return Some(SecretString::from(secret));
    }

    // 3. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

fn keyring_token(profile_name: &str) -> Option<String> {
    keyring_entry(profile_name).ok()?.get_password().ok()
}

/// Store a bearer token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

/// Remove the keyring token for `profile_name`. Missing entries are fine.
pub fn delete_token(profile_name: &str) -> Result<(), ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Runtime config ──────────────────────────────────────────────────

/// Build a `RealtimeConfig` from a profile and the global defaults.
pub fn profile_to_realtime_config(profile: &Profile, defaults: &Defaults) -> Result<RealtimeConfig, ConfigError> {
    let url: url::Url = profile.api_url.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {}", profile.api_url),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("expected an http or https URL, got '{}'", url.scheme()),
        });
    }

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let base = RealtimeConfig::default();
    let mut probe: ProbeConfig = base.probe.clone();
    if let Some(ref target) = profile.probe_path {
        probe.target.clone_from(target);
    }

    Ok(RealtimeConfig {
        api_base_url: url.to_string(),
        reconnect_delay: Duration::from_millis(profile.reconnect_delay_ms.unwrap_or(defaults.reconnect_delay_ms)),
        retry: RetryPolicy {
            max_attempts: profile.retry_attempts.unwrap_or(defaults.retry_attempts),
            base_delay: Duration::from_millis(profile.retry_delay_ms.unwrap_or(defaults.retry_delay_ms)),
        },
        queue_max_retries: defaults.queue_max_retries,
        probe,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        ..base
    })
}
