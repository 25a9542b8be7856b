//! Process context shared by all sessions
//!
//! Built once at startup and cloned into each session. Holds the external
//! collaborators behind their trait seams plus the process-wide stores.

use std::sync::Arc;

use voice_gateway_config::Settings;
use voice_gateway_core::{CallControl, SpeechRecognizer, SpeechSynthesizer};
use voice_gateway_media::{PromptCache, RecordingWriter};
use voice_gateway_persistence::InteractionStore;

/// Everything a session needs from the process.
#[derive(Clone)]
pub struct SessionContext {
    pub control: Arc<dyn CallControl>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub store: Arc<dyn InteractionStore>,
    pub prompt_cache: PromptCache,
    pub recordings: RecordingWriter,
    /// Process defaults; each call derives its own effective config.
    pub defaults: Settings,
}
