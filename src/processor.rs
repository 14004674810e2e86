//! Response stream processing.
//!
//! Consumes one server response at a time: assistant content goes to the
//! message log and playback, function calls go through the tool dispatcher
//! and are answered with a function-call-output turn plus a new response
//! request.

use std::sync::Arc;

use futures::StreamExt;

use crate::activity::{ActivitySignal, ActivityTracker};
use crate::audio::AudioPlayback;
use crate::conversation::MessageLog;
use crate::error::ParleyError;
use crate::realtime::{
    AudioPart, ContentPart, ConversationItem, FunctionCallItem, InboundEvent, InputAudioHandle,
    MessageItem, ResponseHandle, ResponseItem, ResponseStatus, Role, TextPart, TurnSender,
};
use crate::tools::ToolDispatcher;

/// Tool-triggered response depth past which a warning is logged.
pub const TOOL_DEPTH_WARNING: usize = 8;
/// Depth at which tool outputs stop requesting new responses.
pub const TOOL_DEPTH_LIMIT: usize = 32;

pub struct ResponseProcessor<S> {
    log: MessageLog,
    dispatcher: Arc<ToolDispatcher>,
    sender: S,
    playback: Arc<dyn AudioPlayback>,
    activity: ActivityTracker,
    /// Consecutive responses that carried function calls.
    tool_depth: usize,
}

impl<S: TurnSender> ResponseProcessor<S> {
    pub fn new(
        log: MessageLog,
        dispatcher: Arc<ToolDispatcher>,
        sender: S,
        playback: Arc<dyn AudioPlayback>,
        activity: ActivityTracker,
    ) -> Self {
        Self {
            log,
            dispatcher,
            sender,
            playback,
            activity,
            tool_depth: 0,
        }
    }

    pub fn tool_depth(&self) -> usize {
        self.tool_depth
    }

    /// Process one inbound event to completion.
    pub async fn process(&mut self, event: InboundEvent) -> Result<(), ParleyError> {
        match event {
            InboundEvent::Response(response) => self.process_response(response).await,
            InboundEvent::InputAudio(input) => {
                self.process_input_audio(input).await;
                Ok(())
            }
        }
    }

    pub async fn process_response(&mut self, response: ResponseHandle) -> Result<(), ParleyError> {
        let response_id = response.response_id.clone();
        let depth = self.tool_depth;
        let mut called_tools = false;
        let (mut items, status) = response.into_parts();

        while let Some(item) = items.next().await {
            match item {
                ResponseItem::Message(message) => self.process_message(message).await,
                ResponseItem::FunctionCall(call) => {
                    called_tools = true;
                    self.tool_depth = depth + 1;
                    self.process_function_call(call).await?;
                }
            }
        }
        if !called_tools {
            self.tool_depth = 0;
        }

        match status.wait().await {
            Some(ResponseStatus::Failed { details }) => {
                let error = ParleyError::UnrecoverableResponse(details);
                tracing::warn!(response_id = %response_id, error = %error, "response failed");
                self.log.push_error(error.to_string());
            }
            Some(status) => {
                tracing::debug!(response_id = %response_id, ?status, "response finished");
            }
            None => {
                tracing::debug!(response_id = %response_id, "response ended with the transport");
            }
        }
        Ok(())
    }

    async fn process_message(&self, mut message: MessageItem) {
        if message.role != Role::Assistant {
            tracing::debug!(item_id = %message.item_id, role = ?message.role, "skipping non-assistant message");
            while message.parts.next().await.is_some() {}
            return;
        }

        self.log.open_assistant();
        while let Some(part) = message.parts.next().await {
            match part {
                ContentPart::Text(TextPart { mut text }) => {
                    while let Some(fragment) = text.next().await {
                        self.log.append_to_open(&fragment);
                    }
                }
                ContentPart::Audio(audio) => self.process_audio_part(audio).await,
            }
        }
        self.log.close_assistant();
    }

    /// Transcript and playback run concurrently; the part is done when both
    /// sequences are drained.
    async fn process_audio_part(&self, part: AudioPart) {
        let AudioPart {
            mut transcript,
            mut audio,
        } = part;

        let log = &self.log;
        let transcribe = async move {
            while let Some(fragment) = transcript.next().await {
                log.append_to_open(&fragment);
            }
        };

        let playback = &self.playback;
        let activity = &self.activity;
        let play = async move {
            if let Err(error) = playback.start().await {
                tracing::warn!(error = %error, "audio playback failed to start");
            }
            while let Some(chunk) = audio.next().await {
                activity.signal(ActivitySignal::AgentSpeaking);
                if let Err(error) = playback.push(chunk).await {
                    tracing::warn!(error = %error, "audio playback rejected a chunk");
                }
            }
        };

        futures::join!(transcribe, play);
    }

    async fn process_function_call(&mut self, call: FunctionCallItem) -> Result<(), ParleyError> {
        let name = call.name.clone();
        let call_id = call.call_id.clone();
        let Some(arguments) = call.arguments().await else {
            tracing::warn!(tool = %name, call_id = %call_id, "function call ended before its arguments completed");
            return Ok(());
        };

        let output = self
            .dispatcher
            .dispatch_to_output(&name, &arguments, &call_id)
            .await;
        self.sender
            .send_item(ConversationItem::function_output(call_id.clone(), output))
            .await?;

        if self.tool_depth >= TOOL_DEPTH_LIMIT {
            tracing::error!(depth = self.tool_depth, tool = %name, "tool call chain too deep, not requesting a response");
            self.log.push_error(format!(
                "Stopped after {TOOL_DEPTH_LIMIT} consecutive tool calls."
            ));
            return Ok(());
        }
        if self.tool_depth > TOOL_DEPTH_WARNING {
            tracing::warn!(depth = self.tool_depth, tool = %name, "deep tool call chain");
        }
        self.sender.generate_response(None).await
    }

    pub async fn process_input_audio(&self, input: InputAudioHandle) {
        self.activity.signal(ActivitySignal::UserSpeaking);
        let item_id = input.item_id.clone();
        match input.transcript().await {
            Some(transcript) => self.log.push_user(transcript),
            None => tracing::debug!(item_id = %item_id, "input audio ended with the transport"),
        }
    }
}
