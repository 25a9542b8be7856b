//! Session inbox events
//!
//! Everything that can happen to a call arrives here as one message. The
//! three external sources (switch events, RTP frames, recognizer callbacks)
//! plus synthesis and timers are reconciled by processing one event at a
//! time on the session task.

use voice_gateway_core::{RecognizerEvent, RtpEvent, SynthesisEvent, TimeoutKind};

/// Call-control events relevant to one session, routed by channel id.
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// Talk detect reported voice onset.
    TalkingStarted,
    /// Talk detect reported voice end after `duration_ms`.
    TalkingFinished { duration_ms: i64 },
    /// One keypad digit.
    DtmfReceived { digit: String },
    PlaybackFinished { playback_id: String },
    PlaybackFailed { playback_id: String },
    /// The channel left the application; the session must tear down.
    ChannelLeft,
}

/// The union type carried by the session inbox.
#[derive(Debug)]
pub enum SessionEvent {
    Call(CallEvent),
    Rtp(RtpEvent),
    Recognizer(RecognizerEvent),
    Synthesis(SynthesisEvent),
    /// A session-owned timer expired.
    Timer(TimeoutKind),
    /// Deferred talk-detect arming (activation delay elapsed).
    ArmVad,
}
