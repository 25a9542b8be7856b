//! Azure Cognitive Services Speech adapters
//!
//! Thin façades over the provider's streaming STT (WebSocket) and TTS (REST)
//! endpoints. Both present the trait seams from `voice-gateway-core`, so the
//! session orchestrator never sees provider wire details.

mod protocol;
mod recognizer;
mod synthesizer;

pub use recognizer::AzureRecognizer;
pub use synthesizer::AzureSynthesizer;
