//! Realtime wire events, client and server side.

use serde::Serialize;
use serde_json::Value;

/// A relay server advertised for avatar media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Terminal status of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    Completed,
    Cancelled,
    Incomplete,
    Failed { details: String },
}

/// Item kind announced by `response.output_item.added`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItemKind {
    Message { role: String },
    FunctionCall { name: String, call_id: String },
    Other { item_type: String },
}

/// Content part kind announced by `response.content_part.added`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Text,
    Audio,
}

/// Server events the client acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    SessionCreated {
        session_id: String,
    },
    SessionUpdated {
        session_id: Option<String>,
        ice_servers: Option<Vec<IceServer>>,
    },
    AvatarConnecting {
        server_sdp: String,
    },
    SpeechStarted {
        item_id: String,
    },
    SpeechStopped {
        item_id: String,
    },
    InputAudioCommitted {
        item_id: String,
    },
    InputTranscriptionCompleted {
        item_id: String,
        transcript: String,
    },
    InputTranscriptionFailed {
        item_id: String,
        message: String,
    },
    ResponseCreated {
        response_id: String,
    },
    OutputItemAdded {
        response_id: String,
        item_id: String,
        kind: OutputItemKind,
    },
    OutputItemDone {
        response_id: String,
        item_id: String,
        arguments: Option<String>,
    },
    ContentPartAdded {
        item_id: String,
        content_index: u32,
        kind: PartKind,
    },
    ContentPartDone {
        item_id: String,
        content_index: u32,
    },
    TextDelta {
        item_id: String,
        content_index: u32,
        delta: String,
    },
    TranscriptDelta {
        item_id: String,
        content_index: u32,
        delta: String,
    },
    /// Base64-encoded PCM16 audio.
    AudioDelta {
        item_id: String,
        content_index: u32,
        delta: String,
    },
    FunctionArgumentsDelta {
        item_id: String,
        delta: String,
    },
    FunctionArgumentsDone {
        item_id: String,
        arguments: String,
    },
    ResponseDone {
        response_id: String,
        status: ResponseStatus,
    },
    Error {
        message: String,
    },
    Unknown {
        event_type: String,
    },
}

impl ServerEvent {
    /// Parse a server event payload into a typed event.
    pub fn from_server_payload(payload: &Value) -> Option<Self> {
        let event_type = payload.get("type")?.as_str()?;
        let item_id = || string_field(payload, "item_id").unwrap_or_default();
        // Absent means the first part; out of range drops the event.
        let content_index = || match payload.get("content_index").and_then(Value::as_u64) {
            Some(index) => u32::try_from(index).ok(),
            None => Some(0),
        };
        let delta = || string_field(payload, "delta").unwrap_or_default();

        let event = match event_type {
            "session.created" => Self::SessionCreated {
                session_id: string_at(payload, &["session", "id"])
                    .unwrap_or_else(|| "unknown".to_string()),
            },
            "session.updated" => Self::SessionUpdated {
                session_id: string_at(payload, &["session", "id"]),
                ice_servers: payload
                    .get("session")
                    .and_then(|session| session.get("avatar"))
                    .and_then(|avatar| avatar.get("ice_servers"))
                    .and_then(Value::as_array)
                    .map(|servers| servers.iter().filter_map(parse_ice_server).collect()),
            },
            "session.avatar.connecting" => Self::AvatarConnecting {
                server_sdp: string_field(payload, "server_sdp")?,
            },
            "input_audio_buffer.speech_started" => Self::SpeechStarted { item_id: item_id() },
            "input_audio_buffer.speech_stopped" => Self::SpeechStopped { item_id: item_id() },
            "input_audio_buffer.committed" => Self::InputAudioCommitted { item_id: item_id() },
            "conversation.item.input_audio_transcription.completed" => {
                Self::InputTranscriptionCompleted {
                    item_id: item_id(),
                    transcript: string_field(payload, "transcript").unwrap_or_default(),
                }
            }
            "conversation.item.input_audio_transcription.failed" => {
                Self::InputTranscriptionFailed {
                    item_id: item_id(),
                    message: string_at(payload, &["error", "message"])
                        .unwrap_or_else(|| "transcription failed".into()),
                }
            }
            "response.created" => Self::ResponseCreated {
                response_id: string_at(payload, &["response", "id"])?,
            },
            "response.output_item.added" => {
                let item = payload.get("item")?;
                Self::OutputItemAdded {
                    response_id: string_field(payload, "response_id").unwrap_or_default(),
                    item_id: string_field(item, "id")?,
                    kind: parse_item_kind(item),
                }
            }
            "response.output_item.done" => {
                let item = payload.get("item")?;
                Self::OutputItemDone {
                    response_id: string_field(payload, "response_id").unwrap_or_default(),
                    item_id: string_field(item, "id")?,
                    arguments: string_field(item, "arguments"),
                }
            }
            "response.content_part.added" => Self::ContentPartAdded {
                item_id: item_id(),
                content_index: content_index()?,
                kind: match string_at(payload, &["part", "type"]).as_deref() {
                    Some("audio") => PartKind::Audio,
                    _ => PartKind::Text,
                },
            },
            "response.content_part.done" => Self::ContentPartDone {
                item_id: item_id(),
                content_index: content_index()?,
            },
            "response.text.delta" => Self::TextDelta {
                item_id: item_id(),
                content_index: content_index()?,
                delta: delta(),
            },
            "response.audio_transcript.delta" => Self::TranscriptDelta {
                item_id: item_id(),
                content_index: content_index()?,
                delta: delta(),
            },
            "response.audio.delta" => Self::AudioDelta {
                item_id: item_id(),
                content_index: content_index()?,
                delta: delta(),
            },
            "response.function_call_arguments.delta" => Self::FunctionArgumentsDelta {
                item_id: item_id(),
                delta: delta(),
            },
            "response.function_call_arguments.done" => Self::FunctionArgumentsDone {
                item_id: item_id(),
                arguments: string_field(payload, "arguments").unwrap_or_default(),
            },
            "response.done" => {
                let response = payload.get("response")?;
                Self::ResponseDone {
                    response_id: string_field(response, "id").unwrap_or_default(),
                    status: parse_status(response),
                }
            }
            "error" => Self::Error {
                message: string_at(payload, &["error", "message"])
                    .or_else(|| string_field(payload, "message"))
                    .unwrap_or_else(|| "Realtime server error".to_string()),
            },
            _ => Self::Unknown {
                event_type: event_type.to_string(),
            },
        };
        Some(event)
    }
}

fn parse_item_kind(item: &Value) -> OutputItemKind {
    match item.get("type").and_then(Value::as_str).unwrap_or_default() {
        "message" => OutputItemKind::Message {
            role: string_field(item, "role").unwrap_or_else(|| "assistant".into()),
        },
        "function_call" => OutputItemKind::FunctionCall {
            name: string_field(item, "name").unwrap_or_default(),
            call_id: string_field(item, "call_id").unwrap_or_default(),
        },
        other => OutputItemKind::Other {
            item_type: other.to_string(),
        },
    }
}

fn parse_status(response: &Value) -> ResponseStatus {
    match response.get("status").and_then(Value::as_str) {
        Some("failed") => {
            let details = response
                .get("status_details")
                .map(|details| {
                    string_at(details, &["error", "message"])
                        .or_else(|| string_field(details, "reason"))
                        .unwrap_or_else(|| details.to_string())
                })
                .unwrap_or_else(|| "unknown failure".into());
            ResponseStatus::Failed { details }
        }
        Some("cancelled") => ResponseStatus::Cancelled,
        Some("incomplete") => ResponseStatus::Incomplete,
        _ => ResponseStatus::Completed,
    }
}

fn parse_ice_server(value: &Value) -> Option<IceServer> {
    let urls = match value.get("urls")? {
        Value::String(url) => vec![url.clone()],
        Value::Array(urls) => urls
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => return None,
    };
    Some(IceServer {
        urls,
        username: string_field(value, "username"),
        credential: string_field(value, "credential"),
    })
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str().map(ToString::to_string)
}

/// A conversation item injected by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: String,
        content: Vec<InputContent>,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl ConversationItem {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message {
            role: "user".into(),
            content: vec![InputContent::InputText { text: text.into() }],
        }
    }

    pub fn system_text(text: impl Into<String>) -> Self {
        Self::Message {
            role: "system".into(),
            content: vec![InputContent::InputText { text: text.into() }],
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputContent {
    InputText { text: String },
}

/// Options for `response.create`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
}

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: Value },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioAppend { audio: String },
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioCommit,
    #[serde(rename = "conversation.item.create")]
    ItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseOptions>,
    },
    #[serde(rename = "session.avatar.connect")]
    AvatarConnect { client_sdp: String },
}

impl ClientEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::InputAudioAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioCommit => "input_audio_buffer.commit",
            Self::ItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate { .. } => "response.create",
            Self::AvatarConnect { .. } => "session.avatar.connect",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_session_updated_with_ice_servers() {
        let event = ServerEvent::from_server_payload(&json!({
            "type": "session.updated",
            "session": {
                "id": "sess-1",
                "avatar": {"ice_servers": [
                    {"urls": ["turn:relay.example:3478"], "username": "u", "credential": "c"},
                    {"urls": "stun:stun.example:3478"}
                ]}
            }
        }))
        .unwrap();

        assert_eq!(
            event,
            ServerEvent::SessionUpdated {
                session_id: Some("sess-1".into()),
                ice_servers: Some(vec![
                    IceServer {
                        urls: vec!["turn:relay.example:3478".into()],
                        username: Some("u".into()),
                        credential: Some("c".into()),
                    },
                    IceServer {
                        urls: vec!["stun:stun.example:3478".into()],
                        username: None,
                        credential: None,
                    },
                ]),
            }
        );
    }

    #[test]
    fn parses_function_call_item() {
        let event = ServerEvent::from_server_payload(&json!({
            "type": "response.output_item.added",
            "response_id": "resp-1",
            "item": {"id": "item-1", "type": "function_call", "name": "get_time", "call_id": "call-1"}
        }))
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::OutputItemAdded {
                response_id: "resp-1".into(),
                item_id: "item-1".into(),
                kind: OutputItemKind::FunctionCall {
                    name: "get_time".into(),
                    call_id: "call-1".into(),
                },
            }
        );
    }

    #[test]
    fn failed_response_carries_details() {
        let event = ServerEvent::from_server_payload(&json!({
            "type": "response.done",
            "response": {
                "id": "resp-2",
                "status": "failed",
                "status_details": {"type": "failed", "error": {"message": "quota exceeded"}}
            }
        }))
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::ResponseDone {
                response_id: "resp-2".into(),
                status: ResponseStatus::Failed {
                    details: "quota exceeded".into()
                },
            }
        );
    }

    #[test]
    fn unknown_types_are_preserved() {
        let event =
            ServerEvent::from_server_payload(&json!({"type": "rate_limits.updated"})).unwrap();
        assert_eq!(
            event,
            ServerEvent::Unknown {
                event_type: "rate_limits.updated".into()
            }
        );
        assert!(ServerEvent::from_server_payload(&json!({"no_type": true})).is_none());
    }

    #[test]
    fn out_of_range_content_index_is_dropped() {
        let delta = |index: Value| {
            ServerEvent::from_server_payload(&json!({
                "type": "response.text.delta",
                "item_id": "i1",
                "content_index": index,
                "delta": "hi"
            }))
        };

        assert!(delta(json!(u64::from(u32::MAX) + 1)).is_none());
        assert_eq!(
            delta(json!(3)),
            Some(ServerEvent::TextDelta {
                item_id: "i1".into(),
                content_index: 3,
                delta: "hi".into()
            })
        );
        let missing = ServerEvent::from_server_payload(&json!({
            "type": "response.content_part.done",
            "item_id": "i1"
        }));
        assert_eq!(
            missing,
            Some(ServerEvent::ContentPartDone {
                item_id: "i1".into(),
                content_index: 0
            })
        );
    }

    #[test]
    fn client_events_serialize_with_wire_tags() {
        let item = ClientEvent::ItemCreate {
            item: ConversationItem::function_output("call-1", "12:00"),
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({
                "type": "conversation.item.create",
                "item": {"type": "function_call_output", "call_id": "call-1", "output": "12:00"}
            })
        );

        let user = serde_json::to_value(ClientEvent::ItemCreate {
            item: ConversationItem::user_text("hello"),
        })
        .unwrap();
        assert_eq!(user["item"]["role"], "user");
        assert_eq!(user["item"]["content"][0]["type"], "input_text");

        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCreate { response: None }).unwrap(),
            json!({"type": "response.create"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::InputAudioCommit).unwrap(),
            json!({"type": "input_audio_buffer.commit"})
        );
    }
}
