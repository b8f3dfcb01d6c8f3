// ── Fetch orchestration ──
//
// One cycle: try each source strategy in order, first success wins, and
// fall back to the last good snapshot when every source fails. The held
// peer connection and the cached snapshot live behind one async mutex,
// which doubles as the single-flight guard for concurrent callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use strum::Display;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use url::Url;

use quotamon_api::peer::models::UserStatusResponse;
use quotamon_api::{
    PeerClient, PeerConnection, PeerLocator, RemoteClient, RemoteQuotaEntry, TransportConfig,
};

use crate::config::EngineSettings;
use crate::convert;
use crate::error::CoreError;
use crate::model::{FetchResult, FetchSource};
use crate::pool::PoolClassifier;

// ── Source seams ────────────────────────────────────────────────────

/// Data-fetch call against a discovered peer.
#[async_trait]
pub trait PeerQuotaApi: Send + Sync {
    async fn user_status(
        &self,
        connection: &PeerConnection,
        timeout: Duration,
    ) -> Result<UserStatusResponse, quotamon_api::Error>;
}

/// GET against a user-configured remote endpoint.
#[async_trait]
pub trait RemoteQuotaApi: Send + Sync {
    async fn entries(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Vec<RemoteQuotaEntry>, quotamon_api::Error>;
}

/// [`PeerQuotaApi`] over loopback HTTPS.
///
/// The client is kept for as long as the connection and timeout stay the
/// same; rediscovery or a timeout change builds a new one.
#[derive(Debug, Default)]
pub struct HttpPeerQuotaApi {
    client: std::sync::Mutex<Option<CachedPeerClient>>,
}

#[derive(Debug)]
struct CachedPeerClient {
    pid: u32,
    port: u16,
    token: SecretString,
    timeout: Duration,
    client: Arc<PeerClient>,
}

impl CachedPeerClient {
    fn serves(&self, connection: &PeerConnection, timeout: Duration) -> bool {
        self.pid == connection.pid
            && self.port == connection.port
            && self.timeout == timeout
            && self.token.expose_secret() == connection.token.expose_secret()
    }
}

impl HttpPeerQuotaApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(
        &self,
        connection: &PeerConnection,
        timeout: Duration,
    ) -> Result<Arc<PeerClient>, quotamon_api::Error> {
        let mut cached = self.client.lock().expect("peer client lock poisoned");
        if let Some(hit) = cached.as_ref().filter(|c| c.serves(connection, timeout)) {
            return Ok(Arc::clone(&hit.client));
        }

        let client = Arc::new(PeerClient::loopback(
            connection.port,
            connection.token.clone(),
            timeout,
        )?);
        *cached = Some(CachedPeerClient {
            pid: connection.pid,
            port: connection.port,
            token: connection.token.clone(),
            timeout,
            client: Arc::clone(&client),
        });
        Ok(client)
    }
}

#[async_trait]
impl PeerQuotaApi for HttpPeerQuotaApi {
    async fn user_status(
        &self,
        connection: &PeerConnection,
        timeout: Duration,
    ) -> Result<UserStatusResponse, quotamon_api::Error> {
        let client = self.client_for(connection, timeout)?;
        client.user_status().await
    }
}

/// [`RemoteQuotaApi`] over HTTPS with the system trust store. One client
/// per timeout, shared across URLs.
#[derive(Debug, Default)]
pub struct HttpRemoteQuotaApi {
    client: std::sync::Mutex<Option<(Duration, Arc<RemoteClient>)>>,
}

impl HttpRemoteQuotaApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn client_for(&self, timeout: Duration) -> Result<Arc<RemoteClient>, quotamon_api::Error> {
        let mut cached = self.client.lock().expect("remote client lock poisoned");
        if let Some((_, client)) = cached.as_ref().filter(|(built_for, _)| *built_for == timeout) {
            return Ok(Arc::clone(client));
        }

        let client = Arc::new(RemoteClient::new(TransportConfig::verified(timeout))?);
        *cached = Some((timeout, Arc::clone(&client)));
        Ok(client)
    }
}

#[async_trait]
impl RemoteQuotaApi for HttpRemoteQuotaApi {
    async fn entries(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> Result<Vec<RemoteQuotaEntry>, quotamon_api::Error> {
        let client = self.client_for(timeout)?;
        client.fetch(url).await
    }
}

// ── Orchestrator ────────────────────────────────────────────────────

/// One source attempted during a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SourceStrategy {
    Local,
    Remote,
}

/// Local peer first, then the remote endpoint.
pub const DEFAULT_STRATEGIES: [SourceStrategy; 2] = [SourceStrategy::Local, SourceStrategy::Remote];

#[derive(Debug, Default)]
struct OrchestratorState {
    connection: Option<PeerConnection>,
    cache: Option<FetchResult>,
}

pub struct FetchOrchestrator {
    locator: Arc<dyn PeerLocator>,
    peer_api: Arc<dyn PeerQuotaApi>,
    remote_api: Arc<dyn RemoteQuotaApi>,
    strategies: Vec<SourceStrategy>,
    settings: watch::Receiver<EngineSettings>,
    state: Mutex<OrchestratorState>,
    connected: watch::Sender<bool>,
    last_result: watch::Sender<Option<Arc<FetchResult>>>,
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("strategies", &self.strategies)
            .field("connected", &*self.connected.borrow())
            .finish_non_exhaustive()
    }
}

impl FetchOrchestrator {
    pub fn new(
        locator: Arc<dyn PeerLocator>,
        peer_api: Arc<dyn PeerQuotaApi>,
        remote_api: Arc<dyn RemoteQuotaApi>,
        settings: watch::Receiver<EngineSettings>,
    ) -> Self {
        Self {
            locator,
            peer_api,
            remote_api,
            strategies: DEFAULT_STRATEGIES.to_vec(),
            settings,
            state: Mutex::new(OrchestratorState::default()),
            connected: watch::Sender::new(false),
            last_result: watch::Sender::new(None),
        }
    }

    /// Replace the ordered list of sources tried each cycle.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<SourceStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    // ── Read-only accessors (never wait on an in-flight cycle) ──────

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Result of the most recent completed cycle.
    pub fn last_result(&self) -> Option<Arc<FetchResult>> {
        self.last_result.borrow().clone()
    }

    // ── Cycle ───────────────────────────────────────────────────────

    /// Run one cycle. Never fails: every outcome is a [`FetchResult`].
    pub async fn fetch_once(&self) -> FetchResult {
        let mut state = self.state.lock().await;
        // Settings are fixed for the duration of the cycle.
        let settings = self.settings.borrow().clone();
        let classifier = PoolClassifier::new(settings.pool_rules.iter().cloned());

        let mut failures: Vec<(SourceStrategy, CoreError)> = Vec::new();
        for &strategy in &self.strategies {
            let attempt = match strategy {
                SourceStrategy::Local => self.fetch_local(&mut state, &settings, &classifier).await,
                SourceStrategy::Remote => self.fetch_remote(&settings, &classifier).await,
            };
            match attempt {
                Ok(result) => {
                    if !failures.is_empty() {
                        info!(source = %strategy, "fetched from fallback source");
                    }
                    state.cache = Some(result.clone());
                    self.publish(&result);
                    return result;
                }
                Err(e) => {
                    debug!(source = %strategy, error = %e, "source failed");
                    failures.push((strategy, e));
                }
            }
        }

        let message = failure_message(&failures, settings.remote_url.is_some());
        let result = match state.cache.as_ref() {
            Some(previous) => {
                warn!(error = %message, "all sources failed, serving cached snapshot");
                FetchResult::from_cache(previous, message)
            }
            None => {
                warn!(error = %message, "all sources failed, nothing cached");
                FetchResult::failure(message)
            }
        };
        self.publish(&result);
        result
    }

    async fn fetch_local(
        &self,
        state: &mut OrchestratorState,
        settings: &EngineSettings,
        classifier: &PoolClassifier,
    ) -> Result<FetchResult, CoreError> {
        let connection = match state.connection.clone() {
            Some(held) => held,
            None => {
                let discovered = self.locator.discover().await?;
                state.connection = Some(discovered.clone());
                self.connected.send_replace(true);
                discovered
            }
        };

        match self
            .peer_api
            .user_status(&connection, settings.fetch_timeout)
            .await
        {
            Ok(response) => {
                let records = convert::records_from_user_status(
                    &response,
                    classifier,
                    &settings.thresholds,
                    Utc::now(),
                );
                Ok(FetchResult::success(records, FetchSource::Local)
                    .with_account(convert::account_from_user_status(&response)))
            }
            Err(e) => {
                info!(
                    pid = connection.pid,
                    port = connection.port,
                    error = %e,
                    "peer request failed, dropping connection"
                );
                state.connection = None;
                self.connected.send_replace(false);
                Err(e.into())
            }
        }
    }

    async fn fetch_remote(
        &self,
        settings: &EngineSettings,
        classifier: &PoolClassifier,
    ) -> Result<FetchResult, CoreError> {
        let Some(url) = settings.remote_url.as_ref() else {
            return Err(CoreError::Configuration {
                message: "no remote URL configured".into(),
            });
        };
        let entries = self.remote_api.entries(url, settings.fetch_timeout).await?;
        let records =
            convert::records_from_remote(&entries, classifier, &settings.thresholds, Utc::now());
        Ok(FetchResult::success(records, FetchSource::Remote))
    }

    fn publish(&self, result: &FetchResult) {
        self.last_result.send_replace(Some(Arc::new(result.clone())));
    }
}

/// The local failure, then `; remote: ...` when a remote endpoint was
/// configured and also failed.
fn failure_message(failures: &[(SourceStrategy, CoreError)], remote_configured: bool) -> String {
    let parts: Vec<String> = failures
        .iter()
        .filter_map(|(strategy, e)| match strategy {
            SourceStrategy::Local => Some(e.to_string()),
            SourceStrategy::Remote if remote_configured => Some(format!("remote: {e}")),
            SourceStrategy::Remote => None,
        })
        .collect();

    if parts.is_empty() {
        "no quota source available".to_owned()
    } else {
        parts.join("; ")
    }
}
