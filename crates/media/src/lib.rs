//! Media path for the voice gateway
//!
//! - [`rtp`]: UDP listener with jitter-buffered playout and a circular
//!   pre-buffer for capturing audio that precedes a voice-start decision
//! - [`prompt_cache`]: scoped temporary store for synthesized prompt chunks
//! - [`recordings`]: final per-call WAV recordings on disk

pub mod prompt_cache;
pub mod recordings;
pub mod rtp;

pub use prompt_cache::{PromptArtifact, PromptCache};
pub use recordings::RecordingWriter;
pub use rtp::RtpReceiver;
