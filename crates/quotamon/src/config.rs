//! CLI configuration: thin wrapper around `quotamon_config`.
//!
//! Adds `GlobalOpts`-aware resolution: `--config` picks the file,
//! `--remote-url` and `--interval` override whatever it says.

use std::path::PathBuf;

use quotamon_core::EngineSettings;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use quotamon_config::{Config, load_config_from, read_config_file, save_config_to};

/// The config file in effect: `--config` / `QUOTAMON_CONFIG`, else the
/// platform default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(quotamon_config::config_path)
}

/// File + environment, then flag overrides.
pub fn resolve_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = load_config_from(&config_path(global))?;
    if let Some(url) = &global.remote_url {
        cfg.remote_url = Some(url.clone());
    }
    if let Some(secs) = global.interval {
        cfg.poll_interval_secs = secs;
    }
    Ok(cfg)
}

/// Resolve, report soft problems on stderr, translate for the engine.
pub fn resolve_settings(global: &GlobalOpts) -> Result<EngineSettings, CliError> {
    let cfg = resolve_config(global)?;
    for warning in cfg.validation_warnings() {
        tracing::warn!("{warning}");
    }
    Ok(cfg.to_engine_settings()?)
}
