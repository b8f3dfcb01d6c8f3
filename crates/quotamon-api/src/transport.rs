// Shared transport configuration for building reqwest::Client instances.
//
// The peer client and the remote client share timeout and user-agent
// settings through this module. Only the peer client ever selects
// `TlsMode::DangerAcceptInvalid`.

use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("quotamon/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Accept any certificate. Reserved for the loopback peer, which
    /// serves a self-issued certificate.
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TransportConfig {
    /// Transport for the loopback peer: certificate validation disabled.
    pub fn loopback_peer(timeout: Duration) -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            timeout,
        }
    }

    /// Transport for any non-peer endpoint: system trust store.
    pub fn verified(timeout: Duration) -> Self {
        Self {
            tls: TlsMode::System,
            timeout,
        }
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match self.tls {
            TlsMode::System => {}
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
