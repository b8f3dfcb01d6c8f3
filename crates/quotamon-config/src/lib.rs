//! Configuration for quotamon.
//!
//! One flat TOML file plus `QUOTAMON_*` environment overrides, validated
//! and translated into `quotamon_core::EngineSettings`. The CLI layers its
//! own flag overrides on top.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use quotamon_core::pool::{CLAUDE_POOL, DEFAULT_POOL, GEMINI_FLASH_POOL, GEMINI_PRO_POOL};
use quotamon_core::{
    DEFAULT_POLL_INTERVAL_SECS, EngineSettings, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
    PoolRule, Thresholds, clamp_interval,
};

/// Prefix for environment overrides, e.g. `QUOTAMON_POLL_INTERVAL_SECS=30`.
pub const ENV_PREFIX: &str = "QUOTAMON_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between polls; clamped to `[10, 3600]` when applied.
    pub poll_interval_secs: u64,

    /// Percent remaining at or below which a quota is a warning.
    pub warning_threshold: u8,

    /// Percent remaining at or below which a quota is critical.
    pub critical_threshold: u8,

    /// Optional HTTPS endpoint used when the local language server is
    /// unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,

    pub probe_timeout_secs: u64,

    pub fetch_timeout_secs: u64,

    /// Pool id -> display name.
    pub group_names: BTreeMap<String, String>,

    /// Label substring -> pool id, checked before the built-in pools.
    pub pool_rules: Vec<PoolRule>,
}

impl Default for Config {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            warning_threshold: thresholds.warning,
            critical_threshold: thresholds.critical,
            remote_url: None,
            probe_timeout_secs: 3,
            fetch_timeout_secs: 10,
            group_names: BTreeMap::new(),
            pool_rules: Vec::new(),
        }
    }
}

impl Config {
    /// Hard errors: anything the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warning_threshold > 100 {
            return Err(invalid("warning_threshold", "must be between 0 and 100"));
        }
        if self.critical_threshold > 100 {
            return Err(invalid("critical_threshold", "must be between 0 and 100"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(invalid("probe_timeout_secs", "must be greater than zero"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(invalid("fetch_timeout_secs", "must be greater than zero"));
        }
        self.parsed_remote_url()?;
        Ok(())
    }

    /// Soft problems, reported but never corrected.
    pub fn validation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.critical_threshold > self.warning_threshold {
            warnings.push(format!(
                "critical_threshold ({}) is above warning_threshold ({}); quotas will skip the warning state",
                self.critical_threshold, self.warning_threshold
            ));
        }

        let clamped = clamp_interval(self.poll_interval_secs);
        if clamped != self.poll_interval_secs {
            warnings.push(format!(
                "poll_interval_secs ({}) is outside [{MIN_POLL_INTERVAL_SECS}, {MAX_POLL_INTERVAL_SECS}]; using {clamped}",
                self.poll_interval_secs
            ));
        }

        for rule in &self.pool_rules {
            if rule.contains.trim().is_empty() || rule.pool.trim().is_empty() {
                warnings.push(format!(
                    "pool rule {{ contains = {:?}, pool = {:?} }} is incomplete and will be ignored",
                    rule.contains, rule.pool
                ));
            }
        }

        let known = self.known_pools();
        for pool_id in self.group_names.keys() {
            if !known.contains(pool_id.as_str()) {
                warnings.push(format!(
                    "group name set for '{pool_id}', which is neither a built-in pool nor a pool_rules target"
                ));
            }
        }

        warnings
    }

    fn known_pools(&self) -> BTreeSet<&str> {
        let mut known: BTreeSet<&str> =
            [CLAUDE_POOL, GEMINI_PRO_POOL, GEMINI_FLASH_POOL, DEFAULT_POOL].into();
        known.extend(self.pool_rules.iter().map(|r| r.pool.trim()));
        known
    }

    fn parsed_remote_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.remote_url.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let url = Url::parse(raw).map_err(|e| invalid("remote_url", format!("'{raw}': {e}")))?;
        match url.scheme() {
            "https" | "http" => Ok(Some(url)),
            other => Err(invalid(
                "remote_url",
                format!("unsupported scheme '{other}', expected https"),
            )),
        }
    }

    /// Validate and translate into the engine's runtime settings.
    pub fn to_engine_settings(&self) -> Result<EngineSettings, ConfigError> {
        self.validate()?;
        Ok(EngineSettings {
            poll_interval_secs: self.poll_interval_secs,
            thresholds: Thresholds::new(self.warning_threshold, self.critical_threshold),
            remote_url: self.parsed_remote_url()?,
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            group_names: self
                .group_names
                .iter()
                .filter(|(_, name)| !name.trim().is_empty())
                .map(|(pool, name)| (pool.clone(), name.trim().to_owned()))
                .collect(),
            pool_rules: self.pool_rules.clone(),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "quotamon", "quotamon").map_or_else(
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
    p.push("quotamon");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path` (if present), then environment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Defaults and the TOML file only, for edits that are saved back.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .extract()?;
    Ok(config)
}

/// Load from the canonical config path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}
