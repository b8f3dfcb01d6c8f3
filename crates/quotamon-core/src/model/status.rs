// ── Quota status classification ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Closed classification of how much of a quota is left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QuotaStatus {
    Healthy,
    Warning,
    Critical,
    Exhausted,
    Unknown,
}

impl QuotaStatus {
    /// Sort key: lower is worse. Exhausted=0, Critical=1, Warning=2,
    /// Healthy=3, Unknown=4.
    pub fn severity_rank(self) -> u8 {
        match self {
            Self::Exhausted => 0,
            Self::Critical => 1,
            Self::Warning => 2,
            Self::Healthy => 3,
            Self::Unknown => 4,
        }
    }

    /// The worse of two statuses.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        if other.severity_rank() < self.severity_rank() {
            other
        } else {
            self
        }
    }
}

/// Warning and critical percentages.
///
/// `critical <= warning` is expected but deliberately not enforced; see
/// [`Thresholds::is_ordered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: u8,
    pub critical: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 50,
            critical: 20,
        }
    }
}

impl Thresholds {
    pub fn new(warning: u8, critical: u8) -> Self {
        Self { warning, critical }
    }

    /// Step function over percent remaining. Boundaries are inclusive:
    /// a value equal to a threshold takes that threshold's status.
    pub fn classify(&self, percent_remaining: f64) -> QuotaStatus {
        if !percent_remaining.is_finite() {
            return QuotaStatus::Unknown;
        }
        if percent_remaining <= 0.0 {
            QuotaStatus::Exhausted
        } else if percent_remaining <= f64::from(self.critical) {
            QuotaStatus::Critical
        } else if percent_remaining <= f64::from(self.warning) {
            QuotaStatus::Warning
        } else {
            QuotaStatus::Healthy
        }
    }

    /// Whether `critical <= warning`.
    pub fn is_ordered(&self) -> bool {
        self.critical <= self.warning
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn classification_boundaries_are_inclusive() {
        let t = Thresholds::default();
        assert_eq!(t.classify(-5.0), QuotaStatus::Exhausted);
        assert_eq!(t.classify(0.0), QuotaStatus::Exhausted);
        assert_eq!(t.classify(0.5), QuotaStatus::Critical);
        assert_eq!(t.classify(20.0), QuotaStatus::Critical);
        assert_eq!(t.classify(20.01), QuotaStatus::Warning);
        assert_eq!(t.classify(50.0), QuotaStatus::Warning);
        assert_eq!(t.classify(50.01), QuotaStatus::Healthy);
        assert_eq!(t.classify(100.0), QuotaStatus::Healthy);
        assert_eq!(t.classify(250.0), QuotaStatus::Healthy);
        assert_eq!(t.classify(f64::NAN), QuotaStatus::Unknown);
    }

    #[test]
    fn classification_is_monotonic() {
        let t = Thresholds::new(40, 10);
        let mut previous = QuotaStatus::Exhausted.severity_rank();
        for tenth in 0..=1000 {
            let rank = t.classify(f64::from(tenth) / 10.0).severity_rank();
            assert!(rank >= previous, "rank dropped at {tenth}");
            previous = rank;
        }
    }

    #[test]
    fn unordered_thresholds_are_reported_not_fixed() {
        let t = Thresholds::new(10, 30);
        assert!(!t.is_ordered());
        // Critical takes precedence because it is checked first.
        assert_eq!(t.classify(25.0), QuotaStatus::Critical);
        assert_eq!(t.classify(31.0), QuotaStatus::Healthy);
        assert!(Thresholds::default().is_ordered());
    }

    #[test]
    fn worst_prefers_lower_rank() {
        assert_eq!(
            QuotaStatus::Healthy.worst(QuotaStatus::Critical),
            QuotaStatus::Critical
        );
        assert_eq!(
            QuotaStatus::Unknown.worst(QuotaStatus::Healthy),
            QuotaStatus::Healthy
        );
        assert_eq!(
            QuotaStatus::Exhausted.worst(QuotaStatus::Warning),
            QuotaStatus::Exhausted
        );
    }

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(QuotaStatus::Exhausted.to_string(), "exhausted");
        assert_eq!("Critical".parse::<QuotaStatus>().unwrap(), QuotaStatus::Critical);
        assert_eq!(
            serde_json::to_string(&QuotaStatus::Warning).unwrap(),
            "\"warning\""
        );
    }
}
