// Scripted sources shared by the orchestrator, scheduler and engine tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::{Notify, watch};
use url::Url;

use quotamon_api::peer::models::UserStatusResponse;
use quotamon_api::{DiscoveryError, PeerConnection, PeerLocator, RemoteQuotaEntry};

use crate::config::EngineSettings;
use crate::fetch::{PeerQuotaApi, RemoteQuotaApi};

pub(crate) fn connection(port: u16) -> PeerConnection {
    PeerConnection {
        pid: 4321,
        token: SecretString::from("0123abcd-feed"),
        advertised_port: Some(41000),
        port,
    }
}

pub(crate) fn user_status(fraction: f64) -> UserStatusResponse {
    serde_json::from_value(serde_json::json!({
        "userStatus": {
            "email": "ada@example.com",
            "planStatus": { "planInfo": { "planName": "Pro" } },
            "cascadeModelConfigData": {
                "clientModelConfigs": [{
                    "label": "Claude Sonnet 4.5",
                    "modelOrAlias": { "model": "MODEL_CLAUDE_4_5_SONNET" },
                    "quotaInfo": { "remainingFraction": fraction }
                }]
            }
        }
    }))
    .unwrap()
}

pub(crate) fn remote_entries() -> Vec<RemoteQuotaEntry> {
    serde_json::from_value(serde_json::json!([
        { "id": "opus", "name": "Claude Opus", "remaining": 40, "capacity": 80 },
        { "id": "flash", "name": "Gemini 3 Flash", "remaining": 5 }
    ]))
    .unwrap()
}

pub(crate) fn settings_channel(
    remote_url: Option<&str>,
) -> (watch::Sender<EngineSettings>, watch::Receiver<EngineSettings>) {
    watch::channel(EngineSettings {
        remote_url: remote_url.map(|u| Url::parse(u).unwrap()),
        ..EngineSettings::default()
    })
}

/// Pops scripted discovery outcomes; not-found once the script runs out.
pub(crate) struct FakeLocator {
    script: Mutex<VecDeque<Result<PeerConnection, DiscoveryError>>>,
    pub calls: AtomicUsize,
}

impl FakeLocator {
    pub fn with(script: Vec<Result<PeerConnection, DiscoveryError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PeerLocator for FakeLocator {
    async fn discover(&self) -> Result<PeerConnection, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DiscoveryError::ProcessNotFound { rejected: 0 }))
    }
}

/// Pops scripted peer responses; times out once the script runs out.
pub(crate) struct FakePeer {
    script: Mutex<VecDeque<Result<UserStatusResponse, quotamon_api::Error>>>,
    pub ports: Mutex<Vec<u16>>,
}

impl FakePeer {
    pub fn with(script: Vec<Result<UserStatusResponse, quotamon_api::Error>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ports: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PeerQuotaApi for FakePeer {
    async fn user_status(
        &self,
        connection: &PeerConnection,
        timeout: Duration,
    ) -> Result<UserStatusResponse, quotamon_api::Error> {
        self.ports.lock().unwrap().push(connection.port);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(quotamon_api::Error::Timeout {
                timeout_secs: timeout.as_secs(),
            }))
    }
}

/// [`FakePeer`] that parks every request until the test releases it.
/// `entered` fires when a request arrives.
pub(crate) struct GatedPeer {
    peer: Arc<FakePeer>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedPeer {
    pub fn with(script: Vec<Result<UserStatusResponse, quotamon_api::Error>>) -> Arc<Self> {
        Arc::new(Self {
            peer: FakePeer::with(script),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl PeerQuotaApi for GatedPeer {
    async fn user_status(
        &self,
        connection: &PeerConnection,
        timeout: Duration,
    ) -> Result<UserStatusResponse, quotamon_api::Error> {
        self.entered.notify_one();
        self.release.notified().await;
        self.peer.user_status(connection, timeout).await
    }
}

/// Pops scripted remote responses; 503 once the script runs out.
pub(crate) struct FakeRemote {
    script: Mutex<VecDeque<Result<Vec<RemoteQuotaEntry>, quotamon_api::Error>>>,
    pub calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with(script: Vec<Result<Vec<RemoteQuotaEntry>, quotamon_api::Error>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RemoteQuotaApi for FakeRemote {
    async fn entries(
        &self,
        _url: &Url,
        _timeout: Duration,
    ) -> Result<Vec<RemoteQuotaEntry>, quotamon_api::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(quotamon_api::Error::HttpStatus {
                status: 503,
                message: "unavailable".into(),
            }))
    }
}
