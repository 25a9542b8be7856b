//! Gateway error taxonomy

use thiserror::Error;

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Hard per-call ceiling; the channel is hung up.
    Session,
    /// No voice or keypad activity after the detector was armed.
    NoInput,
    /// Keypad entry idle for longer than the completion window.
    KeypadComplete,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::Session => write!(f, "session"),
            TimeoutKind::NoInput => write!(f, "no-input"),
            TimeoutKind::KeypadComplete => write!(f, "keypad-completion"),
        }
    }
}

/// Errors surfaced across the gateway.
///
/// Call-control failures (`SwitchIo`) are retried at most once where the
/// operation is idempotent; everything else either fails the call with outcome
/// ERROR or, for `Recognizer`, resolves the recognition as an empty transcript
/// so the dialplan can decide.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("switch i/o error: {0}")]
    SwitchIo(String),

    #[error("no free UDP port probing upward from {start_port}")]
    Bind { start_port: u16 },

    #[error("udp socket error: {0}")]
    Socket(String),

    #[error("recognizer error: {0}")]
    Recognizer(String),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("{0} timeout expired")]
    Timeout(TimeoutKind),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Bind { start_port: 10000 };
        assert!(err.to_string().contains("10000"));
        assert_eq!(
            GatewayError::Timeout(TimeoutKind::NoInput).to_string(),
            "no-input timeout expired"
        );
    }
}
