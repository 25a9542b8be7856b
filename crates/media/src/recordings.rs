//! Final per-call recordings
//!
//! After a call completes, the synthesized prompt and the captured caller
//! audio are saved as 8 kHz / 16-bit / mono WAVs under `./recordings/tts`
//! and `./recordings/stt`.

use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use voice_gateway_core::{GatewayError, Result, WavSpec};

/// Which side of the call a recording captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    /// The synthesized prompt.
    Tts,
    /// The caller's speech as fed to the recognizer.
    Stt,
}

impl RecordingKind {
    fn dir(&self) -> &'static str {
        match self {
            RecordingKind::Tts => "tts",
            RecordingKind::Stt => "stt",
        }
    }
}

/// Writes final recordings under a fixed root.
#[derive(Debug, Clone)]
pub struct RecordingWriter {
    root: PathBuf,
}

impl Default for RecordingWriter {
    fn default() -> Self {
        Self::new(PathBuf::from("recordings"))
    }
}

impl RecordingWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write `pcm` as `<unique_id>_<caller_id>_<iso_timestamp>_<kind>.wav`,
    /// returning the path it landed at.
    pub async fn write(
        &self,
        kind: RecordingKind,
        unique_id: &str,
        caller_id: &str,
        pcm: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.root.join(kind.dir());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GatewayError::Prompt(format!("recordings dir {}: {e}", dir.display())))?;

        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let path = dir.join(format!(
            "{unique_id}_{caller_id}_{stamp}_{}.wav",
            kind.dir()
        ));
        let wav = WavSpec::telephony().wrap(pcm);

        tokio::fs::write(&path, &wav)
            .await
            .map_err(|e| GatewayError::Prompt(format!("write {}: {e}", path.display())))?;

        info!(path = %path.display(), bytes = pcm.len(), "recording saved");
        Ok(path)
    }
}
