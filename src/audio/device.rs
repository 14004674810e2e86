//! Audio device boundary.
//!
//! The core never touches hardware: capture emits PCM16 chunks into a sink,
//! playback consumes them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ParleyError;

/// Sample rate of PCM16 audio exchanged with the realtime service.
pub const SAMPLE_RATE: u32 = 24_000;

/// Receives captured PCM16 (little-endian, mono) chunks.
pub type ChunkSink = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Microphone capture.
#[async_trait]
pub trait AudioCapture: Send {
    async fn start(&mut self, sink: ChunkSink) -> Result<(), ParleyError>;

    async fn stop(&mut self) -> Result<(), ParleyError>;
}

/// Builds the capture device on first use.
pub trait AudioCaptureFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioCapture>, ParleyError>;
}

/// Speaker output for assistant audio.
#[async_trait]
pub trait AudioPlayback: Send + Sync {
    /// Prepare for a new audio part. Repeated calls are allowed.
    async fn start(&self) -> Result<(), ParleyError>;

    async fn push(&self, pcm: Vec<u8>) -> Result<(), ParleyError>;

    /// Drop anything still queued.
    async fn stop(&self) -> Result<(), ParleyError>;
}

/// Playback that discards audio, for text-only front ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPlayback;

#[async_trait]
impl AudioPlayback for NullPlayback {
    async fn start(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn push(&self, _pcm: Vec<u8>) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}
