//! Trait seams between the orchestrator and its external collaborators
//!
//! The session state machine only ever talks to the switch and the cloud
//! speech service through these traits, which keeps the per-call logic
//! testable with in-process mocks.

mod call_control;
mod speech;

pub use call_control::CallControl;
pub use speech::{
    PushStream, PushStreamItem, PushStreamReceiver, RecognizerSession, SpeechRecognizer,
    SpeechSynthesizer,
};
