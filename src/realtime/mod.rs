//! Realtime conversation protocol: session configuration, wire events,
//! WebSocket transport, and response assembly.

pub mod assembler;
pub mod config;
pub mod events;
pub mod items;
pub mod transport;

pub use assembler::{ResponseAssembler, SessionSignal};
pub use config::{
    AvatarCodec, AvatarConfig, EouDetectionKind, InputTranscription, Modality, SessionConfig,
    TurnDetection, TurnDetectionKind, VideoCrop, Voice, VoiceKind,
};
pub use events::{
    ClientEvent, ConversationItem, IceServer, ResponseOptions, ResponseStatus, ServerEvent,
};
pub use items::{
    AudioPart, ContentPart, Fragments, FunctionCallItem, InboundEvent, InputAudioHandle,
    MessageItem, ResponseHandle, ResponseItem, Role, TextPart,
};
pub use transport::{InboundChannels, RealtimeTransport, TransportParams, TransportSender, TurnSender};
