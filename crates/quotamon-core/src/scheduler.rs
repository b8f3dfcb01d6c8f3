// ── Poll scheduler ──
//
// Drives the orchestrator on a repeating timer and fans each result out
// to callback listeners and a broadcast channel. Timer-driven cycles honor
// pause; `poll_now` never does. A cycle lock spans fetch and fan-out so
// results are delivered in completion order.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::EngineSettings;
use crate::fetch::FetchOrchestrator;
use crate::model::FetchResult;

const BROADCAST_CAPACITY: usize = 16;

/// Callback invoked with every cycle's result.
pub type Listener = Arc<dyn Fn(&FetchResult) + Send + Sync>;

/// Handle returned by [`PollScheduler::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

struct TimerHandle {
    cancel: CancellationToken,
    period: Duration,
    _task: JoinHandle<()>,
}

struct SchedulerInner {
    orchestrator: Arc<FetchOrchestrator>,
    settings: watch::Receiver<EngineSettings>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    paused: AtomicBool,
    cycle_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<TimerHandle>>,
    results: broadcast::Sender<Arc<FetchResult>>,
    last_poll: watch::Sender<Option<DateTime<Utc>>>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().ok().and_then(Option::take) {
            handle.cancel.cancel();
        }
    }
}

/// Cheaply cloneable handle; all clones drive the same timer. The timer
/// stops once the last handle is dropped.
#[derive(Clone)]
pub struct PollScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .finish_non_exhaustive()
    }
}

impl PollScheduler {
    pub fn new(
        orchestrator: Arc<FetchOrchestrator>,
        settings: watch::Receiver<EngineSettings>,
    ) -> Self {
        let (results, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(SchedulerInner {
                orchestrator,
                settings,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                paused: AtomicBool::new(false),
                cycle_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                results,
                last_poll: watch::Sender::new(None),
            }),
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Arm the timer at the configured (clamped) interval. The first cycle
    /// runs immediately, even while paused. No-op when already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut timer = self.inner.timer.lock().expect("scheduler timer lock poisoned");
        if timer.is_some() {
            return;
        }

        let period = self.inner.settings.borrow().poll_interval();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(timer_task(
            Arc::downgrade(&self.inner),
            period,
            cancel.clone(),
        ));
        info!(interval_secs = period.as_secs(), "poll scheduler started");

        *timer = Some(TimerHandle {
            cancel,
            period,
            _task: task,
        });
    }

    /// Disarm the timer. An in-flight cycle is left to finish. Idempotent.
    pub fn stop(&self) {
        let handle = self
            .inner
            .timer
            .lock()
            .expect("scheduler timer lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.cancel.cancel();
            info!("poll scheduler stopped");
        }
    }

    /// Stop then start, picking up the current interval.
    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// Gate timer-driven cycles. `poll_now` is unaffected.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        debug!("poll scheduler paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        debug!("poll scheduler resumed");
    }

    /// Run a cycle now, regardless of pause state, without touching the
    /// timer's phase.
    pub async fn poll_now(&self) -> Arc<FetchResult> {
        self.run_cycle().await
    }

    // ── Subscribers ─────────────────────────────────────────────────

    /// Register a callback. It sees results from the next cycle onward.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&FetchResult) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock().expect("listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Async alternative to callbacks. Slow receivers may observe
    /// `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<FetchResult>> {
        self.inner.results.subscribe()
    }

    // ── State ───────────────────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.inner
            .timer
            .lock()
            .expect("scheduler timer lock poisoned")
            .is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Interval of the running timer, or the configured one when stopped.
    pub fn current_interval(&self) -> Duration {
        self.inner
            .timer
            .lock()
            .expect("scheduler timer lock poisoned")
            .as_ref()
            .map_or_else(|| self.inner.settings.borrow().poll_interval(), |t| t.period)
    }

    pub fn last_poll_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_poll.borrow()
    }

    // ── Cycle ───────────────────────────────────────────────────────

    async fn run_cycle(&self) -> Arc<FetchResult> {
        let _cycle = self.inner.cycle_lock.lock().await;

        let listeners: Vec<(ListenerId, Listener)> = self
            .inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clone();

        let result = Arc::new(self.inner.orchestrator.fetch_once().await);
        self.inner.last_poll.send_replace(Some(result.timestamp));

        for (id, listener) in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&result))).is_err() {
                warn!(listener = %id, "listener panicked, continuing delivery");
            }
        }
        // No receivers is fine.
        let _ = self.inner.results.send(Arc::clone(&result));

        trace!(
            success = result.success,
            source = %result.source,
            records = result.records.len(),
            "cycle delivered"
        );
        result
    }
}

/// Holds only a weak reference between ticks so dropping every
/// scheduler handle ends the loop.
async fn timer_task(inner: Weak<SchedulerInner>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut first = true;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let scheduler = PollScheduler { inner };
                if scheduler.is_paused() && !first {
                    trace!("paused, skipping scheduled cycle");
                    continue;
                }
                first = false;
                scheduler.run_cycle().await;
            }
        }
    }
    trace!("timer task exited");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::fetch::FetchOrchestrator;
    use crate::model::QuotaStatus;
    use crate::test_support::{
        FakeLocator, FakePeer, FakeRemote, GatedPeer, connection, user_status,
    };

    fn scheduler_with(
        interval_secs: u64,
        peer_script: usize,
    ) -> (PollScheduler, watch::Sender<EngineSettings>) {
        let (tx, rx) = watch::channel(EngineSettings {
            poll_interval_secs: interval_secs,
            ..EngineSettings::default()
        });
        let locator = FakeLocator::with(vec![Ok(connection(41001))]);
        let peer = FakePeer::with((0..peer_script).map(|_| Ok(user_status(0.5))).collect());
        let remote = FakeRemote::with(Vec::new());
        let orchestrator = Arc::new(FetchOrchestrator::new(locator, peer, remote, rx.clone()));
        (PollScheduler::new(orchestrator, rx), tx)
    }

    fn gated_scheduler(peer: &Arc<GatedPeer>) -> (PollScheduler, watch::Sender<EngineSettings>) {
        let (tx, rx) = watch::channel(EngineSettings::default());
        let locator = FakeLocator::with(vec![Ok(connection(41001))]);
        let remote = FakeRemote::with(Vec::new());
        let orchestrator =
            Arc::new(FetchOrchestrator::new(locator, peer.clone(), remote, rx.clone()));
        (PollScheduler::new(orchestrator, rx), tx)
    }

    fn spawn_poll(scheduler: &PollScheduler) -> JoinHandle<Arc<FetchResult>> {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.poll_now().await })
    }

    fn counter(scheduler: &PollScheduler) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        scheduler.add_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_immediately_then_on_clamped_interval() {
        let (scheduler, _tx) = scheduler_with(5, 10);
        let count = counter(&scheduler);

        scheduler.start();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.current_interval(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(scheduler.last_poll_time().is_some());

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent() {
        let (scheduler, _tx) = scheduler_with(10_000, 10);
        let count = counter(&scheduler);

        scheduler.start();
        scheduler.start();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(3600));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn pause_gates_timer_but_not_poll_now() {
        let (scheduler, _tx) = scheduler_with(10, 10);
        let count = counter(&scheduler);

        scheduler.pause();
        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        // The start-up cycle runs regardless of pause.
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(34)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let result = scheduler.poll_now().await;
        assert!(result.success);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        scheduler.stop();
    }

    #[tokio::test]
    async fn panicking_listener_does_not_block_others() {
        let (scheduler, _tx) = scheduler_with(60, 1);
        scheduler.add_listener(|_| panic!("listener bug"));
        let count = counter(&scheduler);

        let result = scheduler.poll_now().await;
        assert!(result.success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn removed_listener_stops_receiving() {
        let (scheduler, _tx) = scheduler_with(60, 2);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = scheduler.add_listener(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        scheduler.poll_now().await;
        assert!(scheduler.remove_listener(id));
        assert!(!scheduler.remove_listener(id));
        scheduler.poll_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_every_result_in_order() {
        let (scheduler, _tx) = scheduler_with(60, 1);
        let mut rx = scheduler.subscribe();

        scheduler.poll_now().await;
        scheduler.poll_now().await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.success);
        // Peer script exhausted: the second cycle falls back to the cache.
        assert!(!second.success);
        assert!(second.is_stale());
        assert!(second.timestamp >= first.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_picks_up_new_interval() {
        let (scheduler, tx) = scheduler_with(60, 10);
        scheduler.start();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(60));

        tx.send_modify(|s| s.poll_interval_secs = 30);
        assert_eq!(scheduler.current_interval(), Duration::from_secs(60));
        scheduler.restart();
        assert_eq!(scheduler.current_interval(), Duration::from_secs(30));
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_stops_timer() {
        let (scheduler, _tx) = scheduler_with(10, 20);
        let count = counter(&scheduler);

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        drop(scheduler);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_added_mid_cycle_starts_with_next_cycle() {
        let peer = GatedPeer::with(vec![Ok(user_status(0.5)), Ok(user_status(0.4))]);
        let (scheduler, _tx) = gated_scheduler(&peer);

        let in_flight = spawn_poll(&scheduler);
        peer.entered.notified().await;
        let count = counter(&scheduler);
        peer.release.notify_one();
        assert!(in_flight.await.unwrap().success);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        peer.release.notify_one();
        assert!(scheduler.poll_now().await.success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settings_changed_mid_cycle_apply_from_next_cycle() {
        let peer = GatedPeer::with(vec![Ok(user_status(0.37)), Ok(user_status(0.37))]);
        let (scheduler, tx) = gated_scheduler(&peer);

        let in_flight = spawn_poll(&scheduler);
        peer.entered.notified().await;
        tx.send_modify(|s| s.thresholds.warning = 30);
        peer.release.notify_one();

        let first = in_flight.await.unwrap();
        assert_eq!(first.records[0].status, QuotaStatus::Warning);

        peer.release.notify_one();
        let second = scheduler.poll_now().await;
        assert_eq!(second.records[0].status, QuotaStatus::Healthy);
    }
}
