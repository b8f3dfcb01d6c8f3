// Port probing
//
// Decides whether a candidate port speaks the peer protocol by sending the
// lightweight probe RPC over loopback TLS.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::peer::PeerClient;
use crate::transport::TransportConfig;

/// Default per-attempt probe timeout.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Checks one candidate port.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(&self, port: u16, token: &SecretString) -> Result<(), Error>;
}

/// Probes `https://127.0.0.1:{port}` with certificate validation disabled.
#[derive(Debug, Clone)]
pub struct HttpsPortProber {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpsPortProber {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let http = TransportConfig::loopback_peer(timeout).build_client()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl PortProber for HttpsPortProber {
    async fn probe(&self, port: u16, token: &SecretString) -> Result<(), Error> {
        let base_url = Url::parse(&format!("https://127.0.0.1:{port}"))?;
        PeerClient::with_http(self.http.clone(), base_url, token.clone(), self.timeout)
            .probe()
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn closed_port_fails_fast() {
        // Bind then drop to get a port nothing is listening on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let prober = HttpsPortProber::new(Duration::from_secs(2)).unwrap();
        let err = prober
            .probe(port, &SecretString::from("abcdef12"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_) | Error::Timeout { .. }));
    }
}
