//! Tagged event sets for the three media-side input sources
//!
//! Each component publishes a closed enum; consumers match exhaustively. The
//! session state machine receives all of these through a single inbox.

use std::net::SocketAddr;

/// Events from the RTP receiver.
#[derive(Debug, Clone)]
pub enum RtpEvent {
    /// Socket bound and the playout driver is running.
    Listening(SocketAddr),
    /// One reordered 20 ms payload, delivered in live mode.
    Frame(Vec<u8>),
    /// The UDP socket failed; the receiver has closed itself.
    SocketError(String),
}

/// Events from a streaming recognizer session.
#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    /// The provider accepted the stream and audio may be written.
    Ready,
    /// Intermediate hypothesis.
    Partial(String),
    /// Terminal: the space-joined, trimmed concatenation of all final
    /// hypotheses. Emitted exactly once; later provider callbacks are dropped.
    Ended(String),
    /// Provider-side failure. The session resolves as an empty transcript.
    Error(String),
}

/// Events from a synthesis stream.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// One PCM chunk in the negotiated output format.
    Chunk(Vec<u8>),
    /// The stream is complete; no further chunks follow.
    End,
    Error(String),
}

/// How the call resolved, written back to the dialplan and persisted with the
/// interaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    Voice,
    Dtmf,
    NoInput,
    Timeout,
    Error,
}

impl RecognitionMode {
    /// Wire form used for the `RECOGNITION_MODE` channel variable and the
    /// interaction store.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Voice => "VOICE",
            RecognitionMode::Dtmf => "DTMF",
            RecognitionMode::NoInput => "NO_INPUT",
            RecognitionMode::Timeout => "TIMEOUT",
            RecognitionMode::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognition_mode_wire_form() {
        assert_eq!(RecognitionMode::Voice.as_str(), "VOICE");
        assert_eq!(RecognitionMode::NoInput.as_str(), "NO_INPUT");
        assert_eq!(RecognitionMode::Dtmf.to_string(), "DTMF");
    }
}
