#![allow(clippy::unwrap_used)]
// Integration tests for `PeerClient` and `RemoteClient` using wiremock.

use std::time::Duration;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quotamon_api::peer::client::{PROBE_PATH, USER_STATUS_PATH};
use quotamon_api::{Error, PeerClient, RemoteClient, TransportConfig};

const TOKEN: &str = "5b7c2f0e-8a1d-4c3e-9f6a-0123456789ab";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, PeerClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = PeerClient::with_http(
        reqwest::Client::new(),
        base_url,
        TOKEN.into(),
        Duration::from_secs(5),
    );
    (server, client)
}

fn user_status_body() -> serde_json::Value {
    json!({
        "userStatus": {
            "name": "Ada",
            "email": "ada@example.com",
            "planStatus": { "planInfo": { "planName": "Pro" } },
            "cascadeModelConfigData": {
                "clientModelConfigs": [
                    {
                        "label": "Claude Sonnet 4.5",
                        "modelOrAlias": { "model": "MODEL_CLAUDE_4_5_SONNET" },
                        "quotaInfo": { "remainingFraction": 0.37, "resetTime": "2025-06-01T12:00:00Z" }
                    },
                    {
                        "label": "Gemini 3 Flash",
                        "quotaInfo": { "resetTime": "2025-06-01T12:00:00Z" }
                    },
                    { "label": "Tab Autocomplete" }
                ]
            }
        }
    })
}

// ── Probe ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_sends_token_and_protocol_headers() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(PROBE_PATH))
        .and(header("X-Codeium-Csrf-Token", TOKEN))
        .and(header("Connect-Protocol-Version", "1"))
        .and(body_json(json!({ "wrapper_data": {} })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.probe().await.unwrap();
}

#[tokio::test]
async fn test_probe_rejects_non_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not the peer</html>"))
        .mount(&server)
        .await;

    let result = client.probe().await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_probe_rejects_error_status() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(PROBE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad csrf"))
        .mount(&server)
        .await;

    let result = client.probe().await;
    assert!(
        matches!(result, Err(Error::HttpStatus { status: 403, .. })),
        "expected HttpStatus 403, got: {result:?}"
    );
}

// ── User status ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_user_status_sends_metadata_and_parses_configs() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(USER_STATUS_PATH))
        .and(header("X-Codeium-Csrf-Token", TOKEN))
        .and(body_json(json!({
            "metadata": {
                "ideName": "antigravity",
                "extensionName": "antigravity",
                "locale": "en"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_status_body()))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.user_status().await.unwrap();
    let configs = resp.model_configs();
    assert_eq!(configs.len(), 3);
    assert_eq!(configs[0].model_id(), Some("MODEL_CLAUDE_4_5_SONNET"));
    assert_eq!(
        configs[0].quota_info.as_ref().unwrap().remaining_fraction,
        Some(0.37)
    );
    assert!(configs[1].quota_info.as_ref().unwrap().remaining_fraction.is_none());
    assert!(configs[2].quota_info.is_none());

    let status = resp.user_status.unwrap();
    assert_eq!(status.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn test_user_status_server_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(USER_STATUS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = client.user_status().await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 500, .. }), "{err:?}");
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_user_status_timeout() {
    let server = MockServer::start().await;
    let client = PeerClient::new(
        Url::parse(&server.uri()).unwrap(),
        TOKEN.into(),
        &TransportConfig::verified(Duration::from_millis(200)),
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path(USER_STATUS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user_status_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client.user_status().await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { .. }),
        "expected timeout, got: {err:?}"
    );
}

// ── Remote endpoint ─────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_fetch_parses_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/quota"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "claude", "name": "Claude Opus", "remaining": 40, "capacity": 80 },
            { "displayName": "Gemini 3 Pro", "remaining": "5" }
        ])))
        .mount(&server)
        .await;

    let client = RemoteClient::new(TransportConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/quota", server.uri())).unwrap();
    let entries = client.fetch(&url).await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].capacity, Some(80.0));
    assert_eq!(entries[1].name.as_deref(), Some("Gemini 3 Pro"));
    assert_eq!(entries[1].remaining, Some(5.0));
}

#[tokio::test]
async fn test_remote_fetch_rejects_non_array() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/quota"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "nope" })))
        .mount(&server)
        .await;

    let client = RemoteClient::new(TransportConfig::default()).unwrap();
    let url = Url::parse(&format!("{}/quota", server.uri())).unwrap();
    let result = client.fetch(&url).await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}
