//! Quota engine sitting between `quotamon-api` and display consumers.
//!
//! This crate owns the domain model and every piece of runtime behavior:
//!
//! - **[`QuotaEngine`]**: Facade over the whole pipeline. [`start()`](QuotaEngine::start)
//!   arms the poll timer and the settings watcher; [`poll_now()`](QuotaEngine::poll_now)
//!   runs a single cycle for one-shot CLI invocations.
//!
//! - **[`FetchOrchestrator`]**: One cycle: local peer first, then the
//!   optional remote endpoint, then the last good snapshot. Holds the
//!   discovered connection between cycles and serializes concurrent callers.
//!
//! - **[`PollScheduler`]**: Timer, pause/resume, and fan-out to callback
//!   listeners plus a `broadcast` channel.
//!
//! - **[`Aggregator`]**: Pool grouping, worst-first ordering, custom
//!   pool names.
//!
//! - **Domain model** ([`model`]): `QuotaRecord`, `QuotaGroup`,
//!   `FetchResult`, `QuotaStatus` and threshold classification.

pub mod aggregate;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod model;
pub mod pool;
pub mod scheduler;

#[cfg(test)]
mod test_support;

// ── Primary re-exports ──────────────────────────────────────────────
pub use aggregate::Aggregator;
pub use config::{
    DEFAULT_POLL_INTERVAL_SECS, EngineSettings, MAX_POLL_INTERVAL_SECS, MIN_POLL_INTERVAL_SECS,
    clamp_interval,
};
pub use engine::QuotaEngine;
pub use error::CoreError;
pub use fetch::{
    DEFAULT_STRATEGIES, FetchOrchestrator, HttpPeerQuotaApi, HttpRemoteQuotaApi, PeerQuotaApi,
    RemoteQuotaApi, SourceStrategy,
};
pub use pool::{PoolClassifier, PoolRule};
pub use scheduler::{Listener, ListenerId, PollScheduler};

pub use model::{
    FetchResult, FetchSource, PeerAccount, QuotaGroup, QuotaRecord, QuotaStatus, RecordInput,
    Thresholds, display_name_for_pool, format_countdown,
};
