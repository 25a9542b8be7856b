//! Core types for the voice gateway
//!
//! This crate provides the foundational pieces shared by every other crate:
//! - Telephony audio conversion (G.711 µ-law to linear PCM) and WAV framing
//! - The gateway error taxonomy
//! - Tagged event sets for the RTP, recognizer, and synthesis paths
//! - Trait seams for the call-control switch and the cloud speech service

pub mod audio;
pub mod error;
pub mod events;
pub mod traits;

pub use audio::{ulaw_to_pcm, WavParseError, WavSpec, FRAME_MS, SAMPLE_RATE, ULAW_FRAME_LEN};
pub use error::{GatewayError, Result, TimeoutKind};
pub use events::{RecognitionMode, RecognizerEvent, RtpEvent, SynthesisEvent};
pub use traits::{
    CallControl, PushStream, PushStreamItem, PushStreamReceiver, RecognizerSession,
    SpeechRecognizer, SpeechSynthesizer,
};
