// ── Peer discovery ──
//
// Finds the one local language-server process that belongs to our
// product, pulls its CSRF token off the command line, and determines
// which of its listening ports answers the probe RPC.

pub mod cmdline;
pub mod platform;
pub mod ports;
pub mod probe;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info};

pub use platform::{
    LinuxPlatform, MacPlatform, ProcessPlatform, WindowsPlatform, detect_platform,
};
pub use probe::{DEFAULT_PROBE_TIMEOUT, HttpsPortProber, PortProber};

/// Why discovery did not produce a connection.
///
/// Every variant is an expected outcome whenever the peer is not running
/// or not yet ready; callers retry on their next cycle.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("language server process not found{}", ignored_suffix(*rejected))]
    ProcessNotFound { rejected: usize },

    #[error("language server process {pid} has no CSRF token on its command line")]
    TokenMissing { pid: u32 },

    #[error("language server process {pid} has no listening ports")]
    NoListeningPorts { pid: u32 },

    #[error("no port of language server process {pid} answered the probe ({tried} tried)")]
    NoResponsivePort { pid: u32, tried: usize },

    #[error("{program} failed: {message}")]
    Command { program: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn ignored_suffix(rejected: usize) -> String {
    match rejected {
        0 => String::new(),
        1 => " (1 unrelated candidate ignored)".to_owned(),
        n => format!(" ({n} unrelated candidates ignored)"),
    }
}

/// A process whose executable matches the peer binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerProcess {
    pub pid: u32,
    pub name: String,
    pub command_line: String,
}

/// A confirmed, probe-verified way to reach the peer.
///
/// Held only until a request through it fails.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    pub pid: u32,
    pub token: SecretString,
    /// Port advertised on the command line; informational only.
    pub advertised_port: Option<u16>,
    /// Port that answered the probe.
    pub port: u16,
}

/// Produces a [`PeerConnection`] from scratch on each call.
#[async_trait]
pub trait PeerLocator: Send + Sync {
    async fn discover(&self) -> Result<PeerConnection, DiscoveryError>;
}

/// [`PeerLocator`] backed by the OS process table and a port prober.
#[derive(Clone)]
pub struct LocalPeerLocator {
    platform: Arc<dyn ProcessPlatform>,
    prober: Arc<dyn PortProber>,
}

impl std::fmt::Debug for LocalPeerLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPeerLocator")
            .field("platform", &self.platform.name())
            .finish_non_exhaustive()
    }
}

impl LocalPeerLocator {
    pub fn new(platform: Arc<dyn ProcessPlatform>, prober: Arc<dyn PortProber>) -> Self {
        Self { platform, prober }
    }

    /// Locator for the running OS with the HTTPS prober.
    pub fn for_current_platform(
        probe_timeout: std::time::Duration,
    ) -> Result<Self, crate::error::Error> {
        let platform: Arc<dyn ProcessPlatform> = match detect_platform() {
            Ok(p) => Arc::from(p),
            Err(e) => Arc::new(Unsupported(e.to_string())),
        };
        let prober = Arc::new(HttpsPortProber::new(probe_timeout)?);
        Ok(Self::new(platform, prober))
    }

    /// Probe `ports` in ascending order; the first success wins.
    async fn first_responsive(&self, pid: u32, ports: &[u16], token: &SecretString) -> Option<u16> {
        for &port in ports {
            match self.prober.probe(port, token).await {
                Ok(()) => return Some(port),
                Err(e) => debug!(pid, port, error = %e, "probe rejected"),
            }
        }
        None
    }

    /// Ports, probe, connection for one owned candidate.
    async fn connect_candidate(
        &self,
        process: &PeerProcess,
        token: SecretString,
    ) -> Result<PeerConnection, DiscoveryError> {
        let pid = process.pid;
        let advertised_port = cmdline::extract_advertised_port(&process.command_line);

        let ports = self.platform.listening_ports(pid).await?;
        if ports.is_empty() {
            return Err(DiscoveryError::NoListeningPorts { pid });
        }
        debug!(pid, ?ports, ?advertised_port, "probing candidate ports");

        let port = self
            .first_responsive(pid, &ports, &token)
            .await
            .ok_or(DiscoveryError::NoResponsivePort {
                pid,
                tried: ports.len(),
            })?;

        Ok(PeerConnection {
            pid,
            token,
            advertised_port,
            port,
        })
    }
}

#[async_trait]
impl PeerLocator for LocalPeerLocator {
    async fn discover(&self) -> Result<PeerConnection, DiscoveryError> {
        let candidates = self.platform.find_peer_processes().await?;

        let mut rejected = 0usize;
        let mut last_error = None;

        for process in &candidates {
            if !cmdline::is_owned_command_line(&process.command_line) {
                debug!(pid = process.pid, "ignoring language server owned by another product");
                rejected += 1;
                continue;
            }

            let Some(token) = cmdline::extract_token(&process.command_line) else {
                debug!(pid = process.pid, "candidate has no CSRF token");
                last_error = Some(DiscoveryError::TokenMissing { pid: process.pid });
                continue;
            };

            match self
                .connect_candidate(process, SecretString::from(token))
                .await
            {
                Ok(connection) => {
                    info!(
                        pid = connection.pid,
                        port = connection.port,
                        "language server discovered"
                    );
                    return Ok(connection);
                }
                Err(e) => {
                    debug!(pid = process.pid, error = %e, "candidate unusable");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(DiscoveryError::ProcessNotFound { rejected }))
    }
}

/// Stand-in platform for targets without a known binary; every
/// discovery reports the detection failure.
struct Unsupported(String);

#[async_trait]
impl ProcessPlatform for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError> {
        Err(DiscoveryError::UnsupportedPlatform {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
        })
    }

    async fn listening_ports(&self, _pid: u32) -> Result<Vec<u16>, DiscoveryError> {
        Err(DiscoveryError::Command {
            program: "port query".into(),
            message: self.0.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::HashMap;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::error::Error;

    const OWNED: &str = "/opt/antigravity/bin/language_server_linux_x64 \
        --csrf_token 0123abcd-0000-4000-8000-00000000beef \
        --extension_server_port 41000 --app_data_dir antigravity";
    const FOREIGN: &str = "/opt/windsurf/bin/language_server_linux_x64 \
        --csrf_token ffffffff --app_data_dir windsurf";

    struct FakePlatform {
        processes: Vec<PeerProcess>,
        ports: HashMap<u32, Vec<u16>>,
    }

    #[async_trait]
    impl ProcessPlatform for FakePlatform {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn find_peer_processes(&self) -> Result<Vec<PeerProcess>, DiscoveryError> {
            Ok(self.processes.clone())
        }

        async fn listening_ports(&self, pid: u32) -> Result<Vec<u16>, DiscoveryError> {
            Ok(self.ports.get(&pid).cloned().unwrap_or_default())
        }
    }

    /// Accepts only `good` ports and records the probe order.
    struct FakeProber {
        good: Vec<u16>,
        attempts: Mutex<Vec<u16>>,
    }

    #[async_trait]
    impl PortProber for FakeProber {
        async fn probe(&self, port: u16, _token: &SecretString) -> Result<(), Error> {
            self.attempts.lock().unwrap().push(port);
            if self.good.contains(&port) {
                Ok(())
            } else {
                Err(Error::Timeout { timeout_secs: 3 })
            }
        }
    }

    fn process(pid: u32, command_line: &str) -> PeerProcess {
        PeerProcess {
            pid,
            name: "language_server_linux_x64".into(),
            command_line: command_line.into(),
        }
    }

    fn build_locator(
        processes: Vec<PeerProcess>,
        ports: &[(u32, Vec<u16>)],
        good: &[u16],
    ) -> (LocalPeerLocator, Arc<FakeProber>) {
        let platform = Arc::new(FakePlatform {
            processes,
            ports: ports.iter().cloned().collect(),
        });
        let prober = Arc::new(FakeProber {
            good: good.to_vec(),
            attempts: Mutex::new(Vec::new()),
        });
        (LocalPeerLocator::new(platform, prober.clone()), prober)
    }

    #[tokio::test]
    async fn first_responsive_port_wins_in_ascending_order() {
        let (locator, prober) = build_locator(
            vec![process(100, OWNED)],
            &[(100, vec![41001, 41002, 41003])],
            &[41002, 41003],
        );

        let conn = locator.discover().await.unwrap();
        assert_eq!(conn.pid, 100);
        assert_eq!(conn.port, 41002);
        assert_eq!(conn.advertised_port, Some(41000));
        assert_eq!(
            conn.token.expose_secret(),
            "0123abcd-0000-4000-8000-00000000beef"
        );
        assert_eq!(*prober.attempts.lock().unwrap(), vec![41001, 41002]);
    }

    #[tokio::test]
    async fn foreign_processes_are_skipped() {
        let (locator, _) = build_locator(
            vec![process(50, FOREIGN), process(100, OWNED)],
            &[(50, vec![9000]), (100, vec![41005])],
            &[9000, 41005],
        );
        let conn = locator.discover().await.unwrap();
        assert_eq!(conn.pid, 100);
        assert_eq!(conn.port, 41005);
    }

    #[tokio::test]
    async fn only_foreign_processes_is_not_found() {
        let (locator, _) = build_locator(vec![process(50, FOREIGN)], &[(50, vec![9000])], &[9000]);
        let err = locator.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ProcessNotFound { rejected: 1 }));
        assert_eq!(
            err.to_string(),
            "language server process not found (1 unrelated candidate ignored)"
        );
    }

    #[tokio::test]
    async fn no_processes_is_not_found() {
        let (locator, _) = build_locator(Vec::new(), &[], &[]);
        let err = locator.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::ProcessNotFound { rejected: 0 }));
        assert_eq!(err.to_string(), "language server process not found");

        let many = DiscoveryError::ProcessNotFound { rejected: 3 };
        assert_eq!(
            many.to_string(),
            "language server process not found (3 unrelated candidates ignored)"
        );
    }

    #[tokio::test]
    async fn tokenless_candidate_is_excluded_but_scan_continues() {
        let tokenless = "/opt/antigravity/bin/language_server_linux_x64 --app_data_dir antigravity";
        let (locator, _) = build_locator(
            vec![process(10, tokenless), process(20, OWNED)],
            &[(20, vec![41010])],
            &[41010],
        );
        assert_eq!(locator.discover().await.unwrap().pid, 20);

        let (locator, _) = build_locator(vec![process(10, tokenless)], &[], &[]);
        assert!(matches!(
            locator.discover().await.unwrap_err(),
            DiscoveryError::TokenMissing { pid: 10 }
        ));
    }

    #[tokio::test]
    async fn process_without_ports_reports_no_listening_ports() {
        let (locator, prober) = build_locator(vec![process(100, OWNED)], &[], &[]);
        let err = locator.discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoListeningPorts { pid: 100 }));
        assert!(prober.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_port_accepting_probe_reports_attempts() {
        let (locator, prober) = build_locator(
            vec![process(100, OWNED)],
            &[(100, vec![41001, 41002])],
            &[],
        );
        let err = locator.discover().await.unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::NoResponsivePort { pid: 100, tried: 2 }
        ));
        assert_eq!(*prober.attempts.lock().unwrap(), vec![41001, 41002]);
    }

    #[tokio::test]
    async fn later_owned_candidate_is_tried_when_first_fails() {
        let (locator, _) = build_locator(
            vec![process(100, OWNED), process(200, OWNED)],
            &[(100, vec![41001]), (200, vec![42001])],
            &[42001],
        );
        let conn = locator.discover().await.unwrap();
        assert_eq!(conn.pid, 200);
        assert_eq!(conn.port, 42001);
    }

    #[test]
    fn connection_debug_hides_token() {
        let conn = PeerConnection {
            pid: 1,
            token: SecretString::from("0123abcd-secret"),
            advertised_port: None,
            port: 1,
        };
        assert!(!format!("{conn:?}").contains("0123abcd-secret"));
    }
}
