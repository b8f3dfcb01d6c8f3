// ── Quota record ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{QuotaStatus, Thresholds};

/// Raw fields of a record before derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordInput {
    pub id: String,
    pub name: String,
    pub pool_id: String,
    pub remaining: f64,
    pub capacity: f64,
    pub reset_time: Option<DateTime<Utc>>,
}

/// One resource's quota snapshot. Immutable once built; every fetch
/// supersedes the previous set wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub id: String,
    pub name: String,
    pub pool_id: String,
    /// Not clamped to `capacity`.
    pub remaining: f64,
    pub capacity: f64,
    pub percent_remaining: f64,
    pub status: QuotaStatus,
    pub reset_time: Option<DateTime<Utc>>,
    /// Seconds from `last_updated` to `reset_time`, floored at zero.
    pub seconds_until_reset: Option<u64>,
    pub last_updated: DateTime<Utc>,
}

impl QuotaRecord {
    /// Non-finite `remaining` or `capacity` is stored as zero and the
    /// record is marked [`QuotaStatus::Unknown`].
    pub fn new(input: RecordInput, thresholds: &Thresholds, now: DateTime<Utc>) -> Self {
        let known = input.remaining.is_finite() && input.capacity.is_finite();
        let remaining = finite_or_zero(input.remaining);
        let capacity = finite_or_zero(input.capacity);
        let percent_remaining = percent_of(remaining, capacity);
        let seconds_until_reset = input.reset_time.map(|reset| seconds_between(now, reset));

        Self {
            id: input.id,
            name: input.name,
            pool_id: input.pool_id,
            remaining,
            capacity,
            percent_remaining,
            status: if known {
                thresholds.classify(percent_remaining)
            } else {
                QuotaStatus::Unknown
            },
            reset_time: input.reset_time,
            seconds_until_reset,
            last_updated: now,
        }
    }

    /// The same record classified against `thresholds`. Unknown records
    /// stay unknown.
    pub fn reclassified(&self, thresholds: &Thresholds) -> Self {
        let status = match self.status {
            QuotaStatus::Unknown => QuotaStatus::Unknown,
            _ => thresholds.classify(self.percent_remaining),
        };
        Self {
            status,
            ..self.clone()
        }
    }

    /// Human countdown to the reset time, if one is known.
    pub fn countdown(&self) -> Option<String> {
        self.seconds_until_reset.map(format_countdown)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// `remaining / capacity * 100`, or 0 when capacity is not positive.
pub fn percent_of(remaining: f64, capacity: f64) -> f64 {
    if capacity > 0.0 {
        remaining / capacity * 100.0
    } else {
        0.0
    }
}

/// Whole seconds from `now` until `then`, never negative.
pub fn seconds_between(now: DateTime<Utc>, then: DateTime<Utc>) -> u64 {
    u64::try_from((then - now).num_seconds()).unwrap_or(0)
}

/// Compact countdown: `now`, `45s`, `12m`, `3h 5m`, `2d 4h`.
pub fn format_countdown(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    match seconds {
        0 => "now".to_owned(),
        s if s < MINUTE => format!("{s}s"),
        s if s < HOUR => format!("{}m", s / MINUTE),
        s if s < DAY => format!("{}h {}m", s / HOUR, (s % HOUR) / MINUTE),
        s => format!("{}d {}h", s / DAY, (s % DAY) / HOUR),
    }
}
