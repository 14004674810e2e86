//! Outbound microphone path.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::state::SessionState;
use crate::activity::{ActivitySignal, ActivityTracker};
use crate::audio::ChunkSink;
#[cfg(feature = "recording")]
use crate::audio::SessionRecorder;
use crate::error::ParleyError;
use crate::realtime::{ClientEvent, TransportSender};

/// Forwards captured chunks to the transport. Never waits on inbound
/// processing.
#[derive(Clone)]
pub(crate) struct AudioUplink {
    sender: TransportSender,
    state: SessionState,
    activity: ActivityTracker,
    #[cfg(feature = "recording")]
    recorder: Option<Arc<SessionRecorder>>,
}

impl AudioUplink {
    pub(crate) fn new(sender: TransportSender, state: SessionState, activity: ActivityTracker) -> Self {
        Self {
            sender,
            state,
            activity,
            #[cfg(feature = "recording")]
            recorder: None,
        }
    }

    #[cfg(feature = "recording")]
    pub(crate) fn with_recorder(mut self, recorder: Option<Arc<SessionRecorder>>) -> Self {
        self.recorder = recorder;
        self
    }

    pub(crate) fn send_chunk(&self, pcm: Vec<u8>) -> Result<(), ParleyError> {
        if !self.state.recording() {
            return Err(ParleyError::InvalidState("Microphone is not recording".into()));
        }
        if pcm.is_empty() {
            return Ok(());
        }
        #[cfg(feature = "recording")]
        if let Some(recorder) = &self.recorder {
            recorder.push(&pcm);
        }
        self.sender.send_now(ClientEvent::InputAudioAppend {
            audio: STANDARD.encode(&pcm),
        })?;
        self.activity.signal(ActivitySignal::UserSpeaking);
        Ok(())
    }

    /// Sink handed to the capture device.
    pub(crate) fn sink(&self) -> ChunkSink {
        let uplink = self.clone();
        Arc::new(move |pcm| {
            if let Err(error) = uplink.send_chunk(pcm) {
                tracing::trace!(error = %error, "dropping captured audio chunk");
            }
        })
    }
}
