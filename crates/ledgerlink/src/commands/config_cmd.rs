//! Config subcommand handlers.

use std::io::BufRead;

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking sensitive fields.
fn format_config_redacted(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "reconnect_delay_ms = {}", cfg.defaults.reconnect_delay_ms);
    let _ = writeln!(out, "retry_attempts = {}", cfg.defaults.retry_attempts);
    let _ = writeln!(out, "retry_delay_ms = {}", cfg.defaults.retry_delay_ms);
    let _ = writeln!(out, "queue_max_retries = {}", cfg.defaults.queue_max_retries);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "api_url = \"{}\"", p.api_url);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"{REDACTED}\"");
        }
        if let Some(ref env) = p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ms) = p.reconnect_delay_ms {
            let _ = writeln!(out, "reconnect_delay_ms = {ms}");
        }
        if let Some(n) = p.retry_attempts {
            let _ = writeln!(out, "retry_attempts = {n}");
        }
        if let Some(ms) = p.retry_delay_ms {
            let _ = writeln!(out, "retry_delay_ms = {ms}");
        }
        if let Some(ref path) = p.probe_path {
            let _ = writeln!(out, "probe_path = \"{path}\"");
        }
    }

    out.trim_end().to_owned()
}

/// Copy of `cfg` safe to serialize: plaintext tokens masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
    }
    cfg
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str, expected: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::Validation {
        field: field.into(),
        reason: format!("must be {expected}"),
    })
}

/// Apply `key = value` to a profile.
fn set_profile_key(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "api_url" | "api-url" => {
            let url: url::Url = parse_value("api_url", &value, "a URL")?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(CliError::Validation {
                    field: "api_url".into(),
                    reason: format!("expected an http or https URL, got '{}'", url.scheme()),
                });
            }
            profile.api_url = value;
        }
        "token" => profile.token = Some(value),
        "token_env" | "token-env" => profile.token_env = Some(value),
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        "insecure" => profile.insecure = Some(parse_value("insecure", &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(parse_value("timeout", &value, "a number (seconds)")?),
        "reconnect_delay_ms" | "reconnect-delay-ms" => {
            profile.reconnect_delay_ms = Some(parse_value(key, &value, "a number (milliseconds)")?);
        }
        "retry_attempts" | "retry-attempts" => {
            profile.retry_attempts = Some(parse_value(key, &value, "a whole number")?);
        }
        "retry_delay_ms" | "retry-delay-ms" => {
            profile.retry_delay_ms = Some(parse_value(key, &value, "a number (milliseconds)")?);
        }
        "probe_path" | "probe-path" => profile.probe_path = Some(value),
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!(
                    "unknown config key '{other}'. Valid keys: api_url, token, token_env, \
                     ca_cert, insecure, timeout, reconnect_delay_ms, retry_attempts, \
                     retry_delay_ms, probe_path"
                ),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Default", display_with = "default_marker")]
    default: bool,
    #[tabled(rename = "API URL")]
    api_url: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn default_marker(default: &bool) -> String {
    if *default { "*".into() } else { String::new() }
}

fn read_token_from_stdin() -> Result<String, CliError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);

    match args.command {
        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let out = output::render_single(&global.output, &cfg, format_config_redacted, |_| {
                "config".into()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_profile_key(profile, &key, value)?;

            ledgerlink_config::save_config_to(&path, &cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: ledgerlink config set api_url <URL>");
                return Ok(());
            }
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            let rows: Vec<ProfileRow> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name: name.clone(),
                    default: name == default,
                    api_url: p.api_url.clone(),
                })
                .collect();
            let out = output::render_list(&global.output, &rows, ProfileRow::clone, |r| r.name.clone());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load(global)?;

            if !cfg.profiles.contains_key(&name) {
                return Err(CliError::ProfileNotFound {
                    available: config::available_profiles(&cfg),
                    name,
                });
            }

            cfg.default_profile = Some(name.clone());
            ledgerlink_config::save_config_to(&path, &cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── Keyring tokens ─────────────────────────────────────────
        ConfigCommand::SetToken { token } => {
            let cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);
            let token = match token {
                Some(token) => token,
                None => read_token_from_stdin()?,
            };
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "token".into(),
                    reason: "token cannot be empty".into(),
                });
            }

            ledgerlink_config::store_token(&profile_name, &token)?;
            if !global.quiet {
                eprintln!("✓ Token stored in the system keyring for profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::DeleteToken => {
            let cfg = config::load(global)?;
            let profile_name = config::active_profile_name(global, &cfg);
            ledgerlink_config::delete_token(&profile_name)?;
            if !global.quiet {
                eprintln!("✓ Removed keyring token for profile '{profile_name}'");
            }
            Ok(())
        }
    }
}
