//! Realtime session configuration and its `session.update` wire form.

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::{Display, EnumString};

use crate::tools::ToolDeclaration;

/// Output modalities requested from the service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

/// Voice family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
pub enum VoiceKind {
    #[serde(rename = "azure-standard", alias = "standard")]
    #[strum(to_string = "azure-standard", serialize = "standard")]
    Standard,
    #[serde(rename = "azure-custom", alias = "custom")]
    #[strum(to_string = "azure-custom", serialize = "custom")]
    Custom,
}

/// Synthesized voice selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Voice {
    pub kind: VoiceKind,
    pub name: String,
    /// Deployment id of a custom voice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    /// Expressiveness temperature, honoured by HD voices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl Voice {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            kind: VoiceKind::Standard,
            name: name.into(),
            endpoint_id: None,
            temperature: None,
        }
    }

    pub fn custom(name: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            kind: VoiceKind::Custom,
            name: name.into(),
            endpoint_id: Some(endpoint_id.into()),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn to_wire(&self) -> Value {
        let mut voice = Map::new();
        voice.insert("type".into(), Value::String(self.kind.to_string()));
        voice.insert("name".into(), Value::String(self.name.clone()));
        if let Some(endpoint_id) = &self.endpoint_id {
            voice.insert("endpoint_id".into(), Value::String(endpoint_id.clone()));
        }
        if let Some(temperature) = self.temperature {
            voice.insert("temperature".into(), json!(temperature));
        }
        Value::Object(voice)
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::standard("en-US-Ava:DragonHDLatestNeural")
    }
}

/// How the service decides the user finished speaking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnDetectionKind {
    ServerVad,
    AzureSemanticVad,
    /// Manual commit: the client signals end of turn itself.
    Disabled,
}

/// End-of-utterance model layered on top of turn detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EouDetectionKind {
    None,
    SemanticDetectionV1,
    SemanticDetectionV1Multilingual,
}

/// Turn-detection policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnDetection {
    pub kind: TurnDetectionKind,
    pub end_of_utterance: EouDetectionKind,
}

impl TurnDetection {
    pub fn is_manual(&self) -> bool {
        self.kind == TurnDetectionKind::Disabled
    }

    fn to_wire(self) -> Value {
        if self.is_manual() {
            return Value::Null;
        }
        let mut detection = Map::new();
        detection.insert("type".into(), Value::String(self.kind.to_string()));
        if self.end_of_utterance != EouDetectionKind::None {
            detection.insert(
                "end_of_utterance_detection".into(),
                json!({ "model": self.end_of_utterance.to_string() }),
            );
        }
        Value::Object(detection)
    }
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            kind: TurnDetectionKind::ServerVad,
            end_of_utterance: EouDetectionKind::None,
        }
    }
}

/// Input audio transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputTranscription {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for InputTranscription {
    fn default() -> Self {
        Self {
            model: "whisper-1".into(),
            language: None,
        }
    }
}

/// Video codec for avatar media.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AvatarCodec {
    H264,
    Vp8,
}

/// Pixel crop rectangle applied to avatar video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoCrop {
    pub top_left: [u32; 2],
    pub bottom_right: [u32; 2],
}

/// Avatar descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvatarConfig {
    /// Built-in character name, or the custom avatar name when `customized`.
    pub character: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub customized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<VideoCrop>,
    pub codec: AvatarCodec,
}

impl AvatarConfig {
    pub fn standard(character: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            style: Some(style.into()),
            customized: false,
            crop: None,
            codec: AvatarCodec::H264,
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            character: name.into(),
            style: None,
            customized: true,
            crop: None,
            codec: AvatarCodec::H264,
        }
    }

    fn to_wire(&self) -> Value {
        let mut video = Map::new();
        video.insert("codec".into(), Value::String(self.codec.to_string()));
        if let Some(crop) = self.crop {
            video.insert(
                "crop".into(),
                json!({ "top_left": crop.top_left, "bottom_right": crop.bottom_right }),
            );
        }

        let mut avatar = Map::new();
        avatar.insert("character".into(), Value::String(self.character.clone()));
        if let Some(style) = &self.style {
            avatar.insert("style".into(), Value::String(style.clone()));
        }
        avatar.insert("customized".into(), Value::Bool(self.customized));
        avatar.insert("video".into(), Value::Object(video));
        Value::Object(avatar)
    }
}

/// Immutable snapshot sent in the configuration handshake.
///
/// Built once per connect attempt and dropped on disconnect.
#[derive(Debug, Clone, Builder)]
pub struct SessionConfig {
    #[builder(into, default)]
    pub instructions: String,
    #[builder(default = vec![Modality::Text, Modality::Audio])]
    pub modalities: Vec<Modality>,
    #[builder(default)]
    pub voice: Voice,
    #[builder(default)]
    pub turn_detection: TurnDetection,
    pub transcription: Option<InputTranscription>,
    #[builder(default)]
    pub noise_suppression: bool,
    #[builder(default)]
    pub echo_cancellation: bool,
    pub avatar: Option<AvatarConfig>,
    #[builder(default)]
    pub tools: Vec<ToolDeclaration>,
    pub temperature: Option<f64>,
}

impl SessionConfig {
    pub fn wants_avatar(&self) -> bool {
        self.avatar.is_some()
    }

    pub fn transcription_enabled(&self) -> bool {
        self.transcription.is_some()
    }

    /// Build the `session` object of the `session.update` handshake.
    pub fn to_session_payload(&self) -> Value {
        let mut session = Map::new();
        if !self.instructions.trim().is_empty() {
            session.insert(
                "instructions".into(),
                Value::String(self.instructions.clone()),
            );
        }
        session.insert(
            "modalities".into(),
            Value::Array(
                self.modalities
                    .iter()
                    .map(|modality| Value::String(modality.to_string()))
                    .collect(),
            ),
        );
        session.insert("voice".into(), self.voice.to_wire());
        session.insert("input_audio_format".into(), Value::String("pcm16".into()));
        session.insert("output_audio_format".into(), Value::String("pcm16".into()));
        session.insert("turn_detection".into(), self.turn_detection.to_wire());
        if let Some(transcription) = &self.transcription {
            session.insert(
                "input_audio_transcription".into(),
                serde_json::to_value(transcription).unwrap_or(Value::Null),
            );
        }
        if self.noise_suppression {
            session.insert(
                "input_audio_noise_reduction".into(),
                json!({ "type": "azure_deep_noise_suppression" }),
            );
        }
        if self.echo_cancellation {
            session.insert(
                "input_audio_echo_cancellation".into(),
                json!({ "type": "server_echo_cancellation" }),
            );
        }
        if let Some(avatar) = &self.avatar {
            session.insert("avatar".into(), avatar.to_wire());
        }
        if !self.tools.is_empty() {
            session.insert(
                "tools".into(),
                Value::Array(self.tools.iter().map(ToolDeclaration::to_wire).collect()),
            );
            session.insert("tool_choice".into(), Value::String("auto".into()));
        }
        if let Some(temperature) = self.temperature {
            session.insert("temperature".into(), json!(temperature));
        }
        Value::Object(session)
    }
}
