// ── Domain model ──
//
// Canonical quota types produced by the engine and consumed by every
// subscriber. Built fresh on each cycle.

pub mod fetch;
pub mod group;
pub mod record;
pub mod status;

pub use fetch::{FetchResult, FetchSource, PeerAccount};
pub use group::{QuotaGroup, display_name_for_pool};
pub use record::{QuotaRecord, RecordInput, format_countdown};
pub use status::{QuotaStatus, Thresholds};
