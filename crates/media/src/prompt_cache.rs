//! Prompt cache
//!
//! Synthesized prompt chunks are written as WAV files into a process-wide
//! temporary directory so the switch can play them by media reference. Each
//! artifact lives until its playback completes, then is removed.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use voice_gateway_core::{GatewayError, Result, WavSpec};

/// Name of the cache directory under the OS temp dir.
const CACHE_DIR_NAME: &str = "ari-tts-cache";

/// One cached prompt chunk.
#[derive(Debug, Clone)]
pub struct PromptArtifact {
    /// On-disk path of the WAV file.
    pub path: PathBuf,
    /// Opaque reference the switch dereferences (the extension-less path
    /// behind a `sound:` scheme).
    pub media_ref: String,
}

/// Process-wide store for prompt chunk files.
///
/// Filenames are v4 UUIDs, so concurrent sessions never collide.
#[derive(Debug, Clone)]
pub struct PromptCache {
    dir: PathBuf,
    spec: WavSpec,
}

impl PromptCache {
    /// Create the cache directory (idempotent) and return the cache handle.
    pub async fn init() -> Result<Self> {
        Self::init_at(std::env::temp_dir().join(CACHE_DIR_NAME)).await
    }

    /// Create a cache rooted at an explicit directory.
    pub async fn init_at(dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| GatewayError::Prompt(format!("cache dir {}: {e}", dir.display())))?;
        debug!(dir = %dir.display(), "prompt cache ready");
        Ok(Self {
            dir,
            spec: WavSpec::telephony(),
        })
    }

    /// Wrap a PCM chunk into a WAV, write it under a unique name, and return
    /// the artifact with both the path and the switch-facing media reference.
    pub async fn put(&self, pcm_chunk: &[u8]) -> Result<PromptArtifact> {
        let name = Uuid::new_v4().to_string();
        let path = self.dir.join(format!("{name}.wav"));
        let wav = self.spec.wrap(pcm_chunk);

        tokio::fs::write(&path, &wav)
            .await
            .map_err(|e| GatewayError::Prompt(format!("write {}: {e}", path.display())))?;

        // The switch resolves sound references without the extension.
        let media_ref = format!("sound:{}", self.dir.join(&name).display());
        Ok(PromptArtifact { path, media_ref })
    }

    /// Delete an artifact file. A missing file is not an error.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove prompt artifact"),
        }
    }
}
