//! Demultiplexes the flat server event stream into nested response handles.

use std::collections::HashMap;

use base64::Engine as _;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::events::{IceServer, OutputItemKind, PartKind, ResponseStatus, ServerEvent};
use super::items::{
    AudioPart, ContentPart, FunctionCallItem, InboundEvent, InputAudioHandle, MessageItem,
    ResponseHandle, ResponseItem, Role, TextPart,
};

/// Session-level notifications that are not part of any response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    SessionCreated {
        session_id: String,
    },
    SessionUpdated {
        session_id: Option<String>,
        ice_servers: Option<Vec<IceServer>>,
    },
    AvatarAnswer {
        server_sdp: String,
    },
    ServerError {
        message: String,
    },
    /// The connection ended without a local shutdown request.
    ConnectionLost {
        reason: String,
    },
}

struct OpenResponse {
    items_tx: mpsc::UnboundedSender<ResponseItem>,
    status_tx: oneshot::Sender<ResponseStatus>,
    item_ids: Vec<String>,
}

enum OpenItem {
    Message {
        parts_tx: mpsc::UnboundedSender<ContentPart>,
        part_indexes: Vec<u32>,
    },
    FunctionCall {
        arguments_tx: Option<oneshot::Sender<String>>,
        buffer: String,
    },
}

enum OpenPart {
    Text {
        text_tx: mpsc::UnboundedSender<String>,
    },
    Audio {
        transcript_tx: mpsc::UnboundedSender<String>,
        audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    },
}

/// Routes each server event to the sequence it belongs to.
///
/// Dropping the assembler closes every open sequence.
pub struct ResponseAssembler {
    inbound_tx: mpsc::UnboundedSender<InboundEvent>,
    signals_tx: mpsc::UnboundedSender<SessionSignal>,
    transcription_enabled: bool,
    current_response: Option<String>,
    responses: HashMap<String, OpenResponse>,
    items: HashMap<String, OpenItem>,
    parts: HashMap<(String, u32), OpenPart>,
    pending_input: HashMap<String, oneshot::Sender<String>>,
}

impl ResponseAssembler {
    pub fn new(
        inbound_tx: mpsc::UnboundedSender<InboundEvent>,
        signals_tx: mpsc::UnboundedSender<SessionSignal>,
        transcription_enabled: bool,
    ) -> Self {
        Self {
            inbound_tx,
            signals_tx,
            transcription_enabled,
            current_response: None,
            responses: HashMap::new(),
            items: HashMap::new(),
            parts: HashMap::new(),
            pending_input: HashMap::new(),
        }
    }

    pub fn handle(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionCreated { session_id } => {
                self.signal(SessionSignal::SessionCreated { session_id });
            }
            ServerEvent::SessionUpdated {
                session_id,
                ice_servers,
            } => self.signal(SessionSignal::SessionUpdated {
                session_id,
                ice_servers,
            }),
            ServerEvent::AvatarConnecting { server_sdp } => {
                self.signal(SessionSignal::AvatarAnswer { server_sdp });
            }
            ServerEvent::Error { message } => {
                self.signal(SessionSignal::ServerError { message });
            }
            ServerEvent::SpeechStarted { item_id } => {
                self.open_input(item_id);
            }
            ServerEvent::SpeechStopped { item_id } => {
                tracing::trace!(item_id = %item_id, "speech stopped");
            }
            ServerEvent::InputAudioCommitted { item_id } => {
                if !self.pending_input.contains_key(&item_id) {
                    self.open_input(item_id.clone());
                }
                if !self.transcription_enabled {
                    self.resolve_input(&item_id, String::new());
                }
            }
            ServerEvent::InputTranscriptionCompleted {
                item_id,
                transcript,
            } => self.resolve_input(&item_id, transcript),
            ServerEvent::InputTranscriptionFailed { item_id, message } => {
                tracing::warn!(item_id = %item_id, error = %message, "input transcription failed");
                self.resolve_input(&item_id, String::new());
            }
            ServerEvent::ResponseCreated { response_id } => self.open_response(response_id),
            ServerEvent::OutputItemAdded {
                response_id,
                item_id,
                kind,
            } => self.open_item(response_id, item_id, kind),
            ServerEvent::ContentPartAdded {
                item_id,
                content_index,
                kind,
            } => self.open_part(item_id, content_index, kind),
            ServerEvent::TextDelta {
                item_id,
                content_index,
                delta,
            } => {
                if let Some(OpenPart::Text { text_tx }) = self.parts.get(&(item_id, content_index))
                {
                    let _ = text_tx.send(delta);
                }
            }
            ServerEvent::TranscriptDelta {
                item_id,
                content_index,
                delta,
            } => {
                if let Some(OpenPart::Audio { transcript_tx, .. }) =
                    self.parts.get(&(item_id, content_index))
                {
                    let _ = transcript_tx.send(delta);
                }
            }
            ServerEvent::AudioDelta {
                item_id,
                content_index,
                delta,
            } => {
                if let Some(OpenPart::Audio { audio_tx, .. }) =
                    self.parts.get(&(item_id, content_index))
                {
                    match base64::engine::general_purpose::STANDARD.decode(delta.as_bytes()) {
                        Ok(bytes) => {
                            let _ = audio_tx.send(bytes);
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "dropping undecodable audio delta");
                        }
                    }
                }
            }
            ServerEvent::ContentPartDone {
                item_id,
                content_index,
            } => {
                self.parts.remove(&(item_id, content_index));
            }
            ServerEvent::FunctionArgumentsDelta { item_id, delta } => {
                if let Some(OpenItem::FunctionCall { buffer, .. }) = self.items.get_mut(&item_id) {
                    buffer.push_str(&delta);
                }
            }
            ServerEvent::FunctionArgumentsDone { item_id, arguments } => {
                if let Some(OpenItem::FunctionCall { arguments_tx, .. }) =
                    self.items.get_mut(&item_id)
                {
                    if let Some(tx) = arguments_tx.take() {
                        let _ = tx.send(arguments);
                    }
                }
            }
            ServerEvent::OutputItemDone {
                item_id, arguments, ..
            } => self.close_item(&item_id, arguments),
            ServerEvent::ResponseDone {
                response_id,
                status,
            } => self.close_response(&response_id, status),
            ServerEvent::Unknown { event_type } => {
                tracing::trace!(event_type = %event_type, "ignoring realtime event");
            }
        }
    }

    fn signal(&self, signal: SessionSignal) {
        let _ = self.signals_tx.send(signal);
    }

    fn open_input(&mut self, item_id: String) {
        let (tx, rx) = oneshot::channel();
        self.pending_input.insert(item_id.clone(), tx);
        let _ = self
            .inbound_tx
            .send(InboundEvent::InputAudio(InputAudioHandle::new(item_id, rx)));
    }

    fn resolve_input(&mut self, item_id: &str, transcript: String) {
        if let Some(tx) = self.pending_input.remove(item_id) {
            let _ = tx.send(transcript);
        }
    }

    fn open_response(&mut self, response_id: String) {
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = oneshot::channel();
        self.responses.insert(
            response_id.clone(),
            OpenResponse {
                items_tx,
                status_tx,
                item_ids: Vec::new(),
            },
        );
        self.current_response = Some(response_id.clone());
        let _ = self.inbound_tx.send(InboundEvent::Response(ResponseHandle::new(
            response_id,
            items_rx,
            status_rx,
        )));
    }

    fn open_item(&mut self, response_id: String, item_id: String, kind: OutputItemKind) {
        let response_key = if self.responses.contains_key(&response_id) {
            Some(response_id)
        } else {
            self.current_response.clone()
        };
        let Some(response) = response_key.and_then(|key| self.responses.get_mut(&key)) else {
            tracing::debug!(item_id = %item_id, "output item for unknown response");
            return;
        };

        let (item, open) = match kind {
            OutputItemKind::Message { role } => {
                let (parts_tx, parts_rx) = mpsc::unbounded_channel();
                (
                    ResponseItem::Message(MessageItem {
                        item_id: item_id.clone(),
                        role: Role::parse(&role),
                        parts: UnboundedReceiverStream::new(parts_rx),
                    }),
                    OpenItem::Message {
                        parts_tx,
                        part_indexes: Vec::new(),
                    },
                )
            }
            OutputItemKind::FunctionCall { name, call_id } => {
                let (arguments_tx, arguments_rx) = oneshot::channel();
                (
                    ResponseItem::FunctionCall(FunctionCallItem::new(
                        item_id.clone(),
                        name,
                        call_id,
                        arguments_rx,
                    )),
                    OpenItem::FunctionCall {
                        arguments_tx: Some(arguments_tx),
                        buffer: String::new(),
                    },
                )
            }
            OutputItemKind::Other { item_type } => {
                tracing::debug!(item_type = %item_type, "ignoring unsupported output item");
                return;
            }
        };

        response.item_ids.push(item_id.clone());
        let _ = response.items_tx.send(item);
        self.items.insert(item_id, open);
    }

    fn open_part(&mut self, item_id: String, content_index: u32, kind: PartKind) {
        let Some(OpenItem::Message {
            parts_tx,
            part_indexes,
        }) = self.items.get_mut(&item_id)
        else {
            return;
        };

        let (part, open) = match kind {
            PartKind::Text => {
                let (text_tx, text_rx) = mpsc::unbounded_channel();
                (
                    ContentPart::Text(TextPart {
                        text: UnboundedReceiverStream::new(text_rx),
                    }),
                    OpenPart::Text { text_tx },
                )
            }
            PartKind::Audio => {
                let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
                let (audio_tx, audio_rx) = mpsc::unbounded_channel();
                (
                    ContentPart::Audio(AudioPart {
                        transcript: UnboundedReceiverStream::new(transcript_rx),
                        audio: UnboundedReceiverStream::new(audio_rx),
                    }),
                    OpenPart::Audio {
                        transcript_tx,
                        audio_tx,
                    },
                )
            }
        };

        part_indexes.push(content_index);
        let _ = parts_tx.send(part);
        self.parts.insert((item_id, content_index), open);
    }

    fn close_item(&mut self, item_id: &str, final_arguments: Option<String>) {
        let Some(item) = self.items.remove(item_id) else {
            return;
        };
        match item {
            OpenItem::Message { part_indexes, .. } => {
                for index in part_indexes {
                    self.parts.remove(&(item_id.to_string(), index));
                }
            }
            OpenItem::FunctionCall {
                arguments_tx,
                buffer,
            } => {
                if let Some(tx) = arguments_tx {
                    let _ = tx.send(final_arguments.unwrap_or(buffer));
                }
            }
        }
    }

    fn close_response(&mut self, response_id: &str, status: ResponseStatus) {
        let key = if self.responses.contains_key(response_id) {
            Some(response_id.to_string())
        } else {
            self.current_response.clone()
        };
        let Some(response) = key.as_deref().and_then(|key| self.responses.remove(key)) else {
            return;
        };
        for item_id in &response.item_ids {
            self.close_item(item_id, None);
        }
        if self.current_response.as_deref() == key.as_deref() {
            self.current_response = None;
        }
        let _ = response.status_tx.send(status);
        // items_tx drops here, ending the item sequence.
    }
}
