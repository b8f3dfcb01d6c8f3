// ── Pool aggregate ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{QuotaRecord, format_countdown, percent_of};
use super::status::{QuotaStatus, Thresholds};

/// Records sharing one pool id, with aggregate figures. Rebuilt on every
/// request; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaGroup {
    pub pool_id: String,
    /// Derived from the pool id.
    pub display_name: String,
    /// User-assigned override, if any.
    pub custom_name: Option<String>,
    /// Members in the order they were grouped.
    pub members: Vec<QuotaRecord>,
    pub remaining: f64,
    pub capacity: f64,
    pub percent_remaining: f64,
    /// Worst member status.
    pub status: QuotaStatus,
    /// Earliest member reset time.
    pub reset_time: Option<DateTime<Utc>>,
    pub seconds_until_reset: Option<u64>,
}

impl QuotaGroup {
    /// Aggregate `members` under `pool_id`.
    ///
    /// Members are reclassified against `thresholds`, so both the group
    /// and its members reflect the thresholds in force now. A member
    /// already marked [`QuotaStatus::Unknown`] stays unknown.
    pub fn from_members(
        pool_id: impl Into<String>,
        custom_name: Option<String>,
        members: Vec<QuotaRecord>,
        thresholds: &Thresholds,
    ) -> Self {
        let pool_id = pool_id.into();
        let members: Vec<QuotaRecord> = members
            .iter()
            .map(|m| m.reclassified(thresholds))
            .collect();
        let remaining: f64 = members.iter().map(|m| m.remaining).sum();
        let capacity: f64 = members.iter().map(|m| m.capacity).sum();

        let status = members
            .iter()
            .map(|m| m.status)
            .reduce(QuotaStatus::worst)
            .unwrap_or(QuotaStatus::Unknown);

        let earliest = members
            .iter()
            .filter_map(|m| m.reset_time.map(|t| (t, m.seconds_until_reset)))
            .min_by_key(|(t, _)| *t);

        Self {
            display_name: display_name_for_pool(&pool_id),
            pool_id,
            custom_name: custom_name.filter(|n| !n.trim().is_empty()),
            members,
            remaining,
            capacity,
            percent_remaining: percent_of(remaining, capacity),
            status,
            reset_time: earliest.map(|(t, _)| t),
            seconds_until_reset: earliest.and_then(|(_, s)| s),
        }
    }

    /// The name to show: the override when set, otherwise the derived name.
    pub fn name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.display_name)
    }

    /// Countdown to the earliest member reset.
    pub fn countdown(&self) -> Option<String> {
        self.seconds_until_reset.map(format_countdown)
    }
}

/// `gemini_pro_pool` -> `Gemini Pro`.
pub fn display_name_for_pool(pool_id: &str) -> String {
    let trimmed = pool_id.trim();
    let stem = trimmed
        .strip_suffix("_pool")
        .or_else(|| trimmed.strip_suffix("-pool"))
        .unwrap_or(trimmed);

    stem.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
