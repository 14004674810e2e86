//! WAV recording of outbound microphone audio for one connect cycle.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use hound::{SampleFormat, WavSpec, WavWriter};

use super::device::SAMPLE_RATE;
use crate::error::ParleyError;

#[derive(Debug)]
pub struct SessionRecorder {
    dir: PathBuf,
    started_at: DateTime<Local>,
    samples: Mutex<Vec<i16>>,
}

impl SessionRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            started_at: Local::now(),
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Append a PCM16 little-endian chunk. A trailing odd byte is dropped.
    pub fn push(&self, pcm: &[u8]) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.extend(
            pcm.chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn file_name(&self, session_id: Option<&str>) -> String {
        let id: String = session_id
            .unwrap_or("unknown")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            .collect();
        format!(
            "recording-{}-{}.wav",
            self.started_at.format("%Y%m%d-%H%M%S"),
            if id.is_empty() { "unknown" } else { &id }
        )
    }

    /// Write the buffered audio. Returns `None` when nothing was captured.
    pub fn finish(&self, session_id: Option<&str>) -> Result<Option<PathBuf>, ParleyError> {
        let samples = std::mem::take(&mut *self.samples.lock().unwrap_or_else(|e| e.into_inner()));
        if samples.is_empty() {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(self.file_name(session_id));
        write_pcm16(&path, &samples)?;
        tracing::info!(path = %path.display(), samples = samples.len(), "session recording saved");
        Ok(Some(path))
    }
}

fn write_pcm16(path: &Path, samples: &[i16]) -> Result<(), ParleyError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| {
        ParleyError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("WAV write failed: {e}"),
        ))
    };

    let mut writer = WavWriter::create(path, spec).map_err(wav_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(wav_error)?;
    }
    writer.finalize().map_err(wav_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_recording_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let recorder = SessionRecorder::new(dir.path());
        assert_eq!(recorder.finish(Some("sess")).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_name_sanitizes_session_id() {
        let recorder = SessionRecorder::new("/tmp");
        let name = recorder.file_name(Some("sess/../1"));
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with("-sess1.wav"));
        assert!(recorder.file_name(None).ends_with("-unknown.wav"));
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let recorder = SessionRecorder::new("/tmp");
        recorder.push(&[1, 0, 2, 0, 9]);
        assert_eq!(recorder.sample_count(), 2);
    }
}
