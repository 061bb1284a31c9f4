//! CLI configuration: thin wrapper around `ledgerlink_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --token, --insecure, --timeout, --config).

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use ledgerlink_core::{Notifier, RealtimeConfig, Realtime, SessionTokenStore};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, ConsoleNotifier};

pub use ledgerlink_config::{Config, Profile};

/// Connection settings after profile lookup and flag overrides.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub realtime: RealtimeConfig,
    pub token: Option<SecretString>,
}

/// The config file in effect: `--config` / `LEDGERLINK_CONFIG`, else the
/// platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(ledgerlink_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(ledgerlink_config::load_config_from(&config_file(global))?)
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build connection settings from the config file, profile, and CLI
/// overrides. CLI flags take priority over profile values.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load(global)?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // No profile: flags / env alone must name the backend.
        None if global.api_url.is_some() => Profile::default(),
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                available: available_profiles(&cfg),
                name: profile_name,
            });
        }
        None => {
            return Err(CliError::NoConfig {
                path: config_file(global).display().to_string(),
            });
        }
    };

    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if global.timeout.is_some() {
        profile.timeout = global.timeout;
    }

    let realtime = ledgerlink_config::profile_to_realtime_config(&profile, &cfg.defaults)?;
    let token = match global.token {
        Some(ref token) => Some(SecretString::from(token.clone())),
        None => ledgerlink_config::resolve_token(&profile, &profile_name),
    };

    Ok(Resolved {
        profile_name,
        realtime,
        token,
    })
}

/// Build the realtime runtime for a resolved profile. Notices go to stderr.
pub fn build_runtime(global: &GlobalOpts, resolved: Resolved) -> Result<Realtime, CliError> {
    let tokens = match resolved.token {
        Some(token) => SessionTokenStore::with_token(token),
        None => SessionTokenStore::new(),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier {
        color: output::should_color(&global.color),
        quiet: global.quiet,
    });
    Ok(Realtime::new(resolved.realtime, Arc::new(tokens), notifier)?)
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        "(none)".into()
    } else {
        cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
