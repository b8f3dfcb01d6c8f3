// ── Quota engine ──
//
// Facade wiring the orchestrator, scheduler and aggregator around one
// settings channel. Consumers hold a cheap clone and never touch the
// parts directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use quotamon_api::{LocalPeerLocator, PeerLocator};

use crate::aggregate::Aggregator;
use crate::config::EngineSettings;
use crate::error::CoreError;
use crate::fetch::{
    FetchOrchestrator, HttpPeerQuotaApi, HttpRemoteQuotaApi, PeerQuotaApi, RemoteQuotaApi,
};
use crate::model::{FetchResult, QuotaGroup, QuotaRecord};
use crate::scheduler::{ListenerId, PollScheduler};

struct EngineInner {
    settings: watch::Sender<EngineSettings>,
    orchestrator: Arc<FetchOrchestrator>,
    scheduler: PollScheduler,
    aggregator: Arc<Aggregator>,
    watcher_cancel: Mutex<Option<CancellationToken>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(cancel) = self.watcher_cancel.get_mut().ok().and_then(Option::take) {
            cancel.cancel();
        }
        self.scheduler.stop();
    }
}

/// The quota monitoring engine.
///
/// Cheaply cloneable via `Arc<EngineInner>`. `start` arms the poll timer
/// and the settings watcher; `poll_now` works whether or not it runs.
/// Dropping the last clone stops both.
#[derive(Clone)]
pub struct QuotaEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for QuotaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaEngine")
            .field("scheduler", &self.inner.scheduler)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl QuotaEngine {
    /// Engine over the real OS locator and HTTPS clients.
    pub fn new(settings: EngineSettings) -> Result<Self, CoreError> {
        let locator = LocalPeerLocator::for_current_platform(settings.probe_timeout)?;
        Ok(Self::with_sources(
            settings,
            Arc::new(locator),
            Arc::new(HttpPeerQuotaApi::new()),
            Arc::new(HttpRemoteQuotaApi::new()),
        ))
    }

    /// Engine over caller-supplied sources.
    pub fn with_sources(
        settings: EngineSettings,
        locator: Arc<dyn PeerLocator>,
        peer_api: Arc<dyn PeerQuotaApi>,
        remote_api: Arc<dyn RemoteQuotaApi>,
    ) -> Self {
        let aggregator = Arc::new(Aggregator::new());
        aggregator.replace_custom_group_names(settings.group_names.clone());

        let (settings_tx, settings_rx) = watch::channel(settings);
        let orchestrator = Arc::new(FetchOrchestrator::new(
            locator,
            peer_api,
            remote_api,
            settings_rx.clone(),
        ));
        let scheduler = PollScheduler::new(Arc::clone(&orchestrator), settings_rx);

        Self {
            inner: Arc::new(EngineInner {
                settings: settings_tx,
                orchestrator,
                scheduler,
                aggregator,
                watcher_cancel: Mutex::new(None),
            }),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Arm the poll timer (first cycle runs immediately) and start
    /// reacting to settings changes. Idempotent.
    pub fn start(&self) {
        {
            let mut guard = self
                .inner
                .watcher_cancel
                .lock()
                .expect("watcher lock poisoned");
            if guard.is_none() {
                let cancel = CancellationToken::new();
                tokio::spawn(settings_watcher(
                    self.inner.settings.subscribe(),
                    self.inner.scheduler.clone(),
                    Arc::clone(&self.inner.aggregator),
                    cancel.clone(),
                ));
                *guard = Some(cancel);
            }
        }
        self.inner.scheduler.start();
    }

    /// Stop the timer and the settings watcher. An in-flight cycle
    /// completes. Idempotent.
    pub fn stop(&self) {
        if let Some(cancel) = self
            .inner
            .watcher_cancel
            .lock()
            .expect("watcher lock poisoned")
            .take()
        {
            cancel.cancel();
        }
        self.inner.scheduler.stop();
    }

    // ── Settings ────────────────────────────────────────────────────

    /// Replace the settings. The next cycle uses them; the timer restarts
    /// when the effective interval changed.
    pub fn update_settings(&self, settings: EngineSettings) {
        self.inner
            .aggregator
            .replace_custom_group_names(settings.group_names.clone());
        self.inner.settings.send_replace(settings);
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings.borrow().clone()
    }

    /// Set or clear a pool's display name.
    pub fn set_custom_group_name(&self, pool_id: &str, name: Option<&str>) {
        self.inner.aggregator.set_custom_group_name(pool_id, name);
        let stored = self.inner.aggregator.custom_group_name(pool_id);
        self.inner.settings.send_if_modified(|settings| match stored {
            Some(name) => {
                settings.group_names.insert(pool_id.to_owned(), name.clone()) != Some(name)
            }
            None => settings.group_names.remove(pool_id).is_some(),
        });
    }

    // ── Aggregation ─────────────────────────────────────────────────

    /// Group a result's records by pool, worst first. Group and member
    /// statuses follow the current thresholds.
    pub fn groups(&self, result: &FetchResult) -> Vec<QuotaGroup> {
        let thresholds = self.inner.settings.borrow().thresholds;
        self.inner.aggregator.group_by_pool(&result.records, &thresholds)
    }

    /// A result's records in group order.
    pub fn flat_records(&self, result: &FetchResult) -> Vec<QuotaRecord> {
        Aggregator::flatten_groups(&self.groups(result))
    }

    // ── Scheduler delegation ────────────────────────────────────────

    pub async fn poll_now(&self) -> Arc<FetchResult> {
        self.inner.scheduler.poll_now().await
    }

    pub fn pause(&self) {
        self.inner.scheduler.pause();
    }

    pub fn resume(&self) {
        self.inner.scheduler.resume();
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&FetchResult) + Send + Sync + 'static,
    {
        self.inner.scheduler.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.scheduler.remove_listener(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FetchResult>> {
        self.inner.scheduler.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.scheduler.is_paused()
    }

    pub fn current_interval(&self) -> Duration {
        self.inner.scheduler.current_interval()
    }

    pub fn last_poll_time(&self) -> Option<DateTime<Utc>> {
        self.inner.scheduler.last_poll_time()
    }

    // ── Orchestrator state ──────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.inner.orchestrator.is_connected()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.inner.orchestrator.subscribe_connected()
    }

    /// Most recent result, cached or fresh.
    pub fn last_result(&self) -> Option<Arc<FetchResult>> {
        self.inner.orchestrator.last_result()
    }
}

/// Re-sync pool names on every settings change and restart the timer
/// when the effective interval moved.
async fn settings_watcher(
    mut settings: watch::Receiver<EngineSettings>,
    scheduler: PollScheduler,
    aggregator: Arc<Aggregator>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = settings.changed() => {
                if changed.is_err() {
                    break;
                }
                let (interval, names) = {
                    let current = settings.borrow_and_update();
                    (current.poll_interval(), current.group_names.clone())
                };
                aggregator.replace_custom_group_names(names);

                if scheduler.is_running() && scheduler.current_interval() != interval {
                    info!(
                        interval_secs = interval.as_secs(),
                        "poll interval changed, restarting timer"
                    );
                    scheduler.restart();
                } else {
                    debug!("settings updated");
                }
            }
        }
    }
}
