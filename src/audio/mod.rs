//! Audio I/O seams and session recording.

pub mod device;
#[cfg(feature = "recording")]
pub mod recorder;

pub use device::{
    AudioCapture, AudioCaptureFactory, AudioPlayback, ChunkSink, NullPlayback, SAMPLE_RATE,
};
#[cfg(feature = "recording")]
pub use recorder::SessionRecorder;
