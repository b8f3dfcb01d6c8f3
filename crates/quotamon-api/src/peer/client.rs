// Peer HTTP client
//
// Wraps `reqwest::Client` with the language server's Connect-style JSON
// RPC conventions: fixed service paths, CSRF token header, and loopback
// TLS without certificate validation.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::peer::models::{ProbeRequest, UserStatusRequest, UserStatusResponse};
use crate::transport::TransportConfig;

/// Service path of the lightweight probe RPC.
pub const PROBE_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUnleashData";

/// Service path of the quota data RPC.
pub const USER_STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";

/// Header carrying the token extracted from the peer's command line.
pub const CSRF_HEADER: &str = "X-Codeium-Csrf-Token";

const CONNECT_PROTOCOL_HEADER: &str = "Connect-Protocol-Version";

/// Raw HTTP client for one language-server port.
///
/// Built per connection: the base URL and token are fixed for the
/// lifetime of the client.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
    timeout: Duration,
}

impl std::fmt::Debug for PeerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PeerClient {
    /// Client for `https://127.0.0.1:{port}` with certificate validation
    /// disabled.
    pub fn loopback(port: u16, token: SecretString, timeout: Duration) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://127.0.0.1:{port}"))?;
        Self::new(base_url, token, &TransportConfig::loopback_peer(timeout))
    }

    /// Client for an arbitrary base URL (tests point this at a mock server).
    pub fn new(
        base_url: Url,
        token: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            token,
            timeout: transport.timeout,
        })
    }

    /// Client sharing an already-built `reqwest::Client`, so a probe sweep
    /// over many ports reuses one connection pool.
    pub fn with_http(
        http: reqwest::Client,
        base_url: Url,
        token: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            token,
            timeout,
        }
    }

    /// Send the probe RPC. Any success status with a parseable JSON body
    /// counts as a match; the body content itself is ignored.
    pub async fn probe(&self) -> Result<(), Error> {
        let _: serde_json::Value = self.post(PROBE_PATH, &ProbeRequest::default()).await?;
        Ok(())
    }

    /// Fetch the user status, including per-model quota information.
    pub async fn user_status(&self) -> Result<UserStatusResponse, Error> {
        self.post(USER_STATUS_PATH, &UserStatusRequest::default()).await
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .header(CONNECT_PROTOCOL_HEADER, "1")
            .header(CSRF_HEADER, self.token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.timeout))?;

        parse_response(resp, self.timeout).await
    }
}

/// Check the status code and deserialize the JSON body.
async fn parse_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<T, Error> {
    let status = resp.status();

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let preview: String = body.chars().take(200).collect();
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            message: preview,
        });
    }

    let body = resp
        .text()
        .await
        .map_err(|e| Error::from_send(e, timeout))?;
    trace!(bytes = body.len(), "peer response received");

    serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))
}
