//! Nested response model: responses yield items, items yield content parts,
//! parts yield fragment sequences.
//!
//! Every sequence here is a single-consumer channel. It ends when the server
//! marks the corresponding unit done, when the response finishes, or when the
//! transport goes away, so consumers never wait on a sequence forever.

use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::events::ResponseStatus;

/// A finite, single-consumer fragment sequence.
pub type Fragments<T> = UnboundedReceiverStream<T>;

/// Conversation role of a message item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Assistant,
    User,
    System,
}

impl Role {
    pub fn parse(role: &str) -> Self {
        match role {
            "user" => Self::User,
            "system" => Self::System,
            _ => Self::Assistant,
        }
    }
}

/// Text content: only the text sequence carries data.
#[derive(Debug)]
pub struct TextPart {
    pub text: Fragments<String>,
}

/// Audio content: a transcript sequence and a PCM16 byte sequence, produced
/// concurrently.
#[derive(Debug)]
pub struct AudioPart {
    pub transcript: Fragments<String>,
    pub audio: Fragments<Vec<u8>>,
}

#[derive(Debug)]
pub enum ContentPart {
    Text(TextPart),
    Audio(AudioPart),
}

#[derive(Debug)]
pub struct MessageItem {
    pub item_id: String,
    pub role: Role,
    pub parts: Fragments<ContentPart>,
}

#[derive(Debug)]
pub struct FunctionCallItem {
    pub item_id: String,
    pub name: String,
    pub call_id: String,
    arguments: oneshot::Receiver<String>,
}

impl FunctionCallItem {
    pub(crate) fn new(
        item_id: String,
        name: String,
        call_id: String,
        arguments: oneshot::Receiver<String>,
    ) -> Self {
        Self {
            item_id,
            name,
            call_id,
            arguments,
        }
    }

    /// Wait until the arguments are complete.
    ///
    /// Returns `None` if the response ended before they were finalized.
    pub async fn arguments(self) -> Option<String> {
        self.arguments.await.ok()
    }
}

#[derive(Debug)]
pub enum ResponseItem {
    Message(MessageItem),
    FunctionCall(FunctionCallItem),
}

/// One server-pushed response. Consumed exactly once.
#[derive(Debug)]
pub struct ResponseHandle {
    pub response_id: String,
    pub items: Fragments<ResponseItem>,
    status: oneshot::Receiver<ResponseStatus>,
}

impl ResponseHandle {
    pub(crate) fn new(
        response_id: String,
        items: mpsc::UnboundedReceiver<ResponseItem>,
        status: oneshot::Receiver<ResponseStatus>,
    ) -> Self {
        Self {
            response_id,
            items: UnboundedReceiverStream::new(items),
            status,
        }
    }

    /// Split into the item sequence and the terminal status.
    pub fn into_parts(self) -> (Fragments<ResponseItem>, ResponseStatusFuture) {
        (self.items, ResponseStatusFuture(self.status))
    }
}

/// Resolves to the terminal status of a response.
#[derive(Debug)]
pub struct ResponseStatusFuture(oneshot::Receiver<ResponseStatus>);

impl ResponseStatusFuture {
    /// `None` means the transport closed before `response.done`.
    pub async fn wait(self) -> Option<ResponseStatus> {
        self.0.await.ok()
    }
}

/// User speech detected by the service.
#[derive(Debug)]
pub struct InputAudioHandle {
    pub item_id: String,
    transcript: oneshot::Receiver<String>,
}

impl InputAudioHandle {
    pub(crate) fn new(item_id: String, transcript: oneshot::Receiver<String>) -> Self {
        Self {
            item_id,
            transcript,
        }
    }

    /// Wait for service-side endpointing and transcription.
    ///
    /// Empty when transcription is unavailable or failed; `None` when the
    /// transport closed first.
    pub async fn transcript(self) -> Option<String> {
        self.transcript.await.ok()
    }
}

/// Top-level inbound events, in server delivery order.
#[derive(Debug)]
pub enum InboundEvent {
    Response(ResponseHandle),
    InputAudio(InputAudioHandle),
}
