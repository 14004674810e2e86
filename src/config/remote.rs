//! Externally managed configuration.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::auth::TokenProvider;
use crate::error::ParleyError;
use crate::realtime::{AvatarConfig, Voice};

/// A named preset applied on top of user-chosen options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub instructions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<AvatarConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub name: String,
}

/// Agents available in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDirectory {
    pub project_name: String,
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
}

impl AgentDirectory {
    pub fn find(&self, id_or_name: &str) -> Option<&AgentEntry> {
        self.agents
            .iter()
            .find(|agent| agent.id == id_or_name || agent.name == id_or_name)
    }
}

/// Payload served by a configuration provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub pre_defined_scenarios: HashMap<String, Scenario>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentDirectory>,
}

impl RemoteConfig {
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.pre_defined_scenarios.get(name)
    }
}

/// Source of externally managed configuration.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// `Ok(None)` means no externally managed config exists.
    async fn fetch(&self) -> Result<Option<RemoteConfig>, ParleyError>;
}

/// Fetches `GET {base}/config`.
#[derive(Debug, Clone)]
pub struct HttpConfigProvider {
    http: reqwest::Client,
    base_url: String,
}

impl HttpConfigProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn config_url(&self) -> String {
        format!("{}/config", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ConfigProvider for HttpConfigProvider {
    async fn fetch(&self) -> Result<Option<RemoteConfig>, ParleyError> {
        let response = self.http.get(self.config_url()).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(url = %self.config_url(), "no remote config served");
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParleyError::api(status.as_u16(), text));
        }
        Ok(Some(response.json().await?))
    }
}

/// The config service also hands out short-lived tokens.
#[async_trait]
impl TokenProvider for HttpConfigProvider {
    async fn fetch_token(&self) -> Result<String, ParleyError> {
        self.fetch()
            .await?
            .and_then(|config| config.token)
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ParleyError::Authentication("Config service returned no token".into()))
    }
}
