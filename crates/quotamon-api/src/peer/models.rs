// Raw wire types for the language-server peer.
//
// The peer speaks protobuf-JSON, which omits fields holding their default
// value. Every field is therefore optional and defaulted here; the core
// crate decides what a missing value means.

use serde::{Deserialize, Serialize};

// ── Requests ────────────────────────────────────────────────────────

/// Metadata block sent with the data-fetch request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub ide_name: String,
    pub extension_name: String,
    pub locale: String,
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self {
            ide_name: "antigravity".into(),
            extension_name: "antigravity".into(),
            locale: "en".into(),
        }
    }
}

/// Body of `GetUserStatus`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserStatusRequest {
    pub metadata: RequestMetadata,
}

/// Body of the `GetUnleashData` probe. The peer only needs a well-formed object.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProbeRequest {
    pub wrapper_data: serde_json::Map<String, serde_json::Value>,
}

// ── Responses ───────────────────────────────────────────────────────

/// Top-level `GetUserStatus` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    #[serde(default)]
    pub user_status: Option<UserStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan_status: Option<PlanStatus>,
    #[serde(default)]
    pub cascade_model_config_data: Option<CascadeModelConfigData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    #[serde(default)]
    pub plan_info: Option<PlanInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInfo {
    #[serde(default)]
    pub plan_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeModelConfigData {
    #[serde(default)]
    pub client_model_configs: Vec<ClientModelConfig>,
}

/// One model entry as listed by the peer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientModelConfig {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub model_or_alias: Option<ModelOrAlias>,
    /// Absent for models without a quota attached.
    #[serde(default)]
    pub quota_info: Option<QuotaInfo>,
}

impl ClientModelConfig {
    /// The peer-provided model identifier, if any.
    pub fn model_id(&self) -> Option<&str> {
        self.model_or_alias
            .as_ref()
            .and_then(|m| m.model.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOrAlias {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaInfo {
    /// Fraction of the quota still available, `0.0..=1.0`. Omitted by the
    /// peer when zero.
    #[serde(default)]
    pub remaining_fraction: Option<f64>,
    /// RFC 3339 reset timestamp.
    #[serde(default)]
    pub reset_time: Option<String>,
}

impl UserStatusResponse {
    /// All model configs, flattened out of the nested envelope.
    pub fn model_configs(&self) -> &[ClientModelConfig] {
        self.user_status
            .as_ref()
            .and_then(|s| s.cascade_model_config_data.as_ref())
            .map_or(&[], |d| d.client_model_configs.as_slice())
    }
}
