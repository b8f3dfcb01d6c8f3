// Remote quota endpoint client
//
// Optional secondary source: a user-configured HTTPS URL that returns a
// JSON array of loosely-typed quota entries. Always uses the system trust
// store.

use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// One entry from a remote quota endpoint.
///
/// Every field is optional; numeric fields accept either JSON numbers or
/// numeric strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteQuotaEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "displayName", alias = "label")]
    pub name: Option<String>,
    #[serde(default, rename = "poolId", alias = "pool_id", alias = "pool")]
    pub pool_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub remaining: Option<f64>,
    #[serde(default, alias = "limit", deserialize_with = "lenient_f64")]
    pub capacity: Option<f64>,
    #[serde(default, rename = "resetTime", alias = "reset_time")]
    pub reset_time: Option<String>,
}

/// Accept `12`, `12.5`, `"12"`, or `null`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// HTTP client for a remote quota endpoint.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    transport: TransportConfig,
}

impl RemoteClient {
    pub fn new(transport: TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, transport })
    }

    /// GET `url` and parse the body as an array of [`RemoteQuotaEntry`].
    pub async fn fetch(&self, url: &Url) -> Result<Vec<RemoteQuotaEntry>, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::from_send(e, self.transport.timeout))?;

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
            .map_err(|e| Error::from_send(e, self.transport.timeout))?;
        serde_json::from_str(&body).map_err(|e| Error::deserialization(&e, &body))
    }
}
