// ── Runtime engine settings ──
//
// What the engine needs to run a cycle. Built by the CLI from the
// on-disk config and pushed in through `QuotaEngine::update_settings`;
// core never reads config files.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::model::Thresholds;
use crate::pool::PoolRule;

/// Lower bound for the poll interval, in seconds.
pub const MIN_POLL_INTERVAL_SECS: u64 = 10;
/// Upper bound for the poll interval, in seconds.
pub const MAX_POLL_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Clamp a requested poll interval into `[10, 3600]` seconds.
pub fn clamp_interval(secs: u64) -> u64 {
    secs.clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Requested interval; see [`EngineSettings::poll_interval`] for the
    /// effective one.
    pub poll_interval_secs: u64,
    pub thresholds: Thresholds,
    /// Secondary source, tried when the local peer fails.
    pub remote_url: Option<Url>,
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,
    /// Pool id -> user display name.
    pub group_names: BTreeMap<String, String>,
    pub pool_rules: Vec<PoolRule>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            thresholds: Thresholds::default(),
            remote_url: None,
            probe_timeout: Duration::from_secs(3),
            fetch_timeout: Duration::from_secs(10),
            group_names: BTreeMap::new(),
            pool_rules: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Effective (clamped) poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(clamp_interval(self.poll_interval_secs))
    }
}
