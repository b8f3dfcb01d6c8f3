// ── Fetch result envelope ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::record::QuotaRecord;

/// Where a [`FetchResult`]'s records came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FetchSource {
    Local,
    Remote,
    Cache,
}

/// Account details reported by the local peer alongside its quotas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAccount {
    pub name: Option<String>,
    pub email: Option<String>,
    pub plan: Option<String>,
}

impl PeerAccount {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.plan.is_none()
    }
}

/// Outcome of one fetch cycle, delivered to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub success: bool,
    pub records: Vec<QuotaRecord>,
    pub error: Option<String>,
    pub source: FetchSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<PeerAccount>,
}

impl FetchResult {
    pub fn success(records: Vec<QuotaRecord>, source: FetchSource) -> Self {
        Self {
            success: true,
            records,
            error: None,
            source,
            timestamp: Utc::now(),
            account: None,
        }
    }

    /// Nothing to show: no source succeeded and nothing is cached.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            records: Vec::new(),
            error: Some(error.into()),
            source: FetchSource::Cache,
            timestamp: Utc::now(),
            account: None,
        }
    }

    /// The last good snapshot, re-served after a failed cycle.
    pub fn from_cache(previous: &Self, error: impl Into<String>) -> Self {
        Self {
            success: false,
            records: previous.records.clone(),
            error: Some(error.into()),
            source: FetchSource::Cache,
            timestamp: Utc::now(),
            account: previous.account.clone(),
        }
    }

    #[must_use]
    pub fn with_account(mut self, account: Option<PeerAccount>) -> Self {
        self.account = account.filter(|a| !a.is_empty());
        self
    }

    /// Whether this result carries records from an earlier cycle.
    pub fn is_stale(&self) -> bool {
        self.source == FetchSource::Cache && !self.records.is_empty()
    }
}
