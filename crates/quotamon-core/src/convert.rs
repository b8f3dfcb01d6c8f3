// ── API-to-domain conversions ──
//
// Bridges raw `quotamon_api` payloads (peer user status, remote entries)
// into `QuotaRecord`s. Missing optional data gets the documented defaults.

use chrono::{DateTime, Utc};

use quotamon_api::RemoteQuotaEntry;
use quotamon_api::peer::models::{ClientModelConfig, UserStatusResponse};

use crate::model::{PeerAccount, QuotaRecord, RecordInput, Thresholds};
use crate::pool::PoolClassifier;

/// Peer quotas are fractions; they are scaled onto this capacity.
pub const NORMALIZED_CAPACITY: f64 = 100.0;

/// Name used when neither a label nor an identifier is present.
pub const UNKNOWN_MODEL: &str = "Unknown Model";

/// Parse an RFC 3339 timestamp, dropping unparseable values.
fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Lowercase, ASCII alphanumerics kept, everything else collapsed to `-`.
pub fn slugify(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ── Local peer ──────────────────────────────────────────────────────

/// Map one model config. Configs without `quotaInfo` yield `None`.
fn record_from_model_config(
    config: &ClientModelConfig,
    classifier: &PoolClassifier,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Option<QuotaRecord> {
    let quota = config.quota_info.as_ref()?;

    let label = non_empty(config.label.as_deref());
    let model_id = config.model_id();
    let name = label.or(model_id).unwrap_or(UNKNOWN_MODEL).to_owned();
    let id = model_id.map_or_else(|| slugify(&name), str::to_owned);

    // protobuf-JSON omits a zero fraction
    let fraction = quota.remaining_fraction.unwrap_or(0.0);

    Some(QuotaRecord::new(
        RecordInput {
            pool_id: classifier.classify(&name),
            id,
            name,
            remaining: (fraction * NORMALIZED_CAPACITY).round(),
            capacity: NORMALIZED_CAPACITY,
            reset_time: parse_datetime(quota.reset_time.as_deref()),
        },
        thresholds,
        now,
    ))
}

/// All quota-bearing records from a `GetUserStatus` response, in peer order.
pub fn records_from_user_status(
    response: &UserStatusResponse,
    classifier: &PoolClassifier,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Vec<QuotaRecord> {
    response
        .model_configs()
        .iter()
        .filter_map(|c| record_from_model_config(c, classifier, thresholds, now))
        .collect()
}

/// Account details from a `GetUserStatus` response, if any are present.
pub fn account_from_user_status(response: &UserStatusResponse) -> Option<PeerAccount> {
    let status = response.user_status.as_ref()?;
    let account = PeerAccount {
        name: non_empty(status.name.as_deref()).map(str::to_owned),
        email: non_empty(status.email.as_deref()).map(str::to_owned),
        plan: status
            .plan_status
            .as_ref()
            .and_then(|p| p.plan_info.as_ref())
            .and_then(|i| non_empty(i.plan_name.as_deref()))
            .map(str::to_owned),
    };
    (!account.is_empty()).then_some(account)
}

// ── Remote endpoint ─────────────────────────────────────────────────

fn record_from_remote_entry(
    entry: &RemoteQuotaEntry,
    classifier: &PoolClassifier,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> QuotaRecord {
    let name = non_empty(entry.name.as_deref())
        .unwrap_or(UNKNOWN_MODEL)
        .to_owned();
    let pool_id = non_empty(entry.pool_id.as_deref())
        .map_or_else(|| classifier.classify(&name), str::to_owned);

    QuotaRecord::new(
        RecordInput {
            id: entry.id.clone().unwrap_or_default(),
            name,
            pool_id,
            remaining: entry.remaining.unwrap_or(0.0),
            capacity: entry
                .capacity
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(NORMALIZED_CAPACITY),
            reset_time: parse_datetime(entry.reset_time.as_deref()),
        },
        thresholds,
        now,
    )
}

/// Map remote entries with defaults for every missing field.
pub fn records_from_remote(
    entries: &[RemoteQuotaEntry],
    classifier: &PoolClassifier,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Vec<QuotaRecord> {
    entries
        .iter()
        .map(|e| record_from_remote_entry(e, classifier, thresholds, now))
        .collect()
}
