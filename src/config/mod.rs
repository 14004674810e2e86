//! Configuration system (layered: code > env > remote config provider).

pub mod auth;
pub mod remote;

pub use auth::{Credential, CredentialResolver, TokenProvider};
pub use remote::{
    AgentDirectory, AgentEntry, ConfigProvider, HttpConfigProvider, RemoteConfig, Scenario,
};

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;
use crate::lookup::SearchConfig;
use crate::realtime::{
    AvatarConfig, InputTranscription, Modality, SessionConfig, TurnDetection, Voice,
};
use crate::tools::ToolDeclaration;

pub const DEFAULT_API_VERSION: &str = "2025-05-01-preview";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
pub const DEFAULT_AVATAR_SETTLE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_PROACTIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Process-level client settings, stable across connect cycles.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub api_key: Option<Credential>,
    pub api_version: String,
    pub search: Option<SearchConfig>,
    /// Where session recordings are written; recording is off when `None`.
    pub recording_dir: Option<PathBuf>,
    pub heartbeat_interval: Duration,
    pub avatar_settle_delay: Duration,
    pub proactive_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            api_version: DEFAULT_API_VERSION.into(),
            search: None,
            recording_dir: None,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            avatar_settle_delay: DEFAULT_AVATAR_SETTLE_DELAY,
            proactive_interval: DEFAULT_PROACTIVE_INTERVAL,
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load from environment variables (`AZURE_VOICE_LIVE_*`, `AZURE_SEARCH_*`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new(env_var("AZURE_VOICE_LIVE_ENDPOINT").unwrap_or_default());
        config.api_key = env_var("AZURE_VOICE_LIVE_API_KEY").map(Credential::ApiKey);
        if let Some(version) = env_var("AZURE_VOICE_LIVE_API_VERSION") {
            config.api_version = version;
        }
        config.search = SearchConfig::from_env();
        config.recording_dir = env_var("PARLEY_RECORDING_DIR").map(PathBuf::from);
        config
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Credential::ApiKey(key.into()));
        self
    }

    /// Fill gaps from a remote config; explicit values win.
    pub fn merge_remote(mut self, remote: &RemoteConfig) -> Self {
        if self.endpoint.trim().is_empty() && !remote.endpoint.trim().is_empty() {
            self.endpoint = remote.endpoint.clone();
        }
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Whether the session talks to a bare model or a hosted agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionMode {
    #[default]
    Model,
    Agent,
}

/// Resolved target of a realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    Model { model: String },
    Agent { agent_id: String, project_name: String },
}

/// User-chosen options for one connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub mode: ConnectionMode,
    pub model: String,
    pub agent_id: Option<String>,
    pub agent_project_name: Option<String>,
    pub instructions: String,
    pub modalities: Vec<Modality>,
    pub voice: Voice,
    pub turn_detection: TurnDetection,
    pub transcription: Option<InputTranscription>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub avatar: Option<AvatarConfig>,
    pub temperature: Option<f64>,
    /// Start the activity tracker (greeting and idle nudges).
    pub proactive: bool,
    /// Declare the `search` tool when a lookup client exists.
    pub enable_search: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Model,
            model: DEFAULT_MODEL.into(),
            agent_id: None,
            agent_project_name: None,
            instructions: String::new(),
            modalities: vec![Modality::Text, Modality::Audio],
            voice: Voice::default(),
            turn_detection: TurnDetection::default(),
            transcription: Some(InputTranscription::default()),
            noise_suppression: false,
            echo_cancellation: false,
            avatar: None,
            temperature: None,
            proactive: false,
            enable_search: true,
        }
    }
}

impl ConnectOptions {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn agent(agent_id: Option<String>, project_name: impl Into<String>) -> Self {
        Self {
            mode: ConnectionMode::Agent,
            agent_id,
            agent_project_name: Some(project_name.into()),
            ..Self::default()
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_avatar(mut self, avatar: AvatarConfig) -> Self {
        self.avatar = Some(avatar);
        self
    }

    pub fn with_turn_detection(mut self, turn_detection: TurnDetection) -> Self {
        self.turn_detection = turn_detection;
        self
    }

    pub fn with_proactive(mut self, proactive: bool) -> Self {
        self.proactive = proactive;
        self
    }

    /// Apply a preset; overrides in the preset replace the current choice.
    pub fn with_scenario(mut self, scenario: &Scenario) -> Self {
        if !scenario.instructions.trim().is_empty() {
            self.instructions = scenario.instructions.clone();
        }
        if let Some(voice) = &scenario.voice {
            self.voice = voice.clone();
        }
        if let Some(avatar) = &scenario.avatar {
            self.avatar = Some(avatar.clone());
        }
        self
    }

    /// Resolve the connect target; agent mode requires an agent id.
    pub fn target(&self) -> Result<ConnectTarget, ParleyError> {
        match self.mode {
            ConnectionMode::Model => {
                if self.model.trim().is_empty() {
                    return Err(ParleyError::Configuration("Please select a model.".into()));
                }
                Ok(ConnectTarget::Model {
                    model: self.model.clone(),
                })
            }
            ConnectionMode::Agent => {
                let agent_id = self
                    .agent_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        ParleyError::Configuration("Please input/select an agent.".into())
                    })?;
                Ok(ConnectTarget::Agent {
                    agent_id: agent_id.to_string(),
                    project_name: self.agent_project_name.clone().unwrap_or_default(),
                })
            }
        }
    }

    /// Snapshot the session configuration for the handshake.
    pub fn session_config(&self, tools: Vec<ToolDeclaration>) -> SessionConfig {
        SessionConfig::builder()
            .instructions(self.instructions.clone())
            .modalities(self.modalities.clone())
            .voice(self.voice.clone())
            .turn_detection(self.turn_detection)
            .maybe_transcription(self.transcription.clone())
            .noise_suppression(self.noise_suppression)
            .echo_cancellation(self.echo_cancellation)
            .maybe_avatar(self.avatar.clone())
            .tools(tools)
            .maybe_temperature(self.temperature)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::TurnDetectionKind;

    #[test]
    fn agent_mode_without_id_is_rejected() {
        let options = ConnectOptions::agent(Some("  ".into()), "proj");
        let error = options.target().unwrap_err();
        assert!(matches!(error, ParleyError::Configuration(ref m) if m == "Please input/select an agent."));
    }

    #[test]
    fn model_mode_targets_the_model() {
        assert_eq!(
            ConnectOptions::default().target().unwrap(),
            ConnectTarget::Model {
                model: DEFAULT_MODEL.into()
            }
        );
    }

    #[test]
    fn scenario_overrides_instructions_and_keeps_other_choices() {
        let options = ConnectOptions::default()
            .with_instructions("base")
            .with_turn_detection(TurnDetection {
                kind: TurnDetectionKind::Disabled,
                ..TurnDetection::default()
            })
            .with_scenario(&Scenario {
                instructions: "You are a tutor.".into(),
                voice: Some(Voice::standard("en-US-Andrew:DragonHDLatestNeural")),
                avatar: None,
            });

        assert_eq!(options.instructions, "You are a tutor.");
        assert_eq!(options.voice.name, "en-US-Andrew:DragonHDLatestNeural");
        assert!(options.turn_detection.is_manual());
        assert!(options.avatar.is_none());
    }

    #[test]
    fn session_config_snapshot_carries_tools() {
        let config = ConnectOptions::default()
            .session_config(vec![ToolDeclaration::new("get_time", "Current time", None)]);
        assert_eq!(config.tools.len(), 1);
        assert!(config.transcription_enabled());
        assert!(!config.wants_avatar());
    }

    #[test]
    fn remote_endpoint_only_fills_gaps() {
        let remote = RemoteConfig {
            endpoint: "https://remote".into(),
            ..RemoteConfig::default()
        };
        assert_eq!(
            ClientConfig::default().merge_remote(&remote).endpoint,
            "https://remote"
        );
        assert_eq!(
            ClientConfig::new("https://local").merge_remote(&remote).endpoint,
            "https://local"
        );
    }
}
