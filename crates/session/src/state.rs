//! Call session states

/// The per-call state machine.
///
/// ```text
/// Answering → PlayingPrompt → Listening → Recognizing → Finalizing
///                                  └─(keypad)──────────────┘
/// Terminated is reachable from every state via channel exit or fatal error.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Channel entered, script variables being read, topology being built.
    Answering,
    /// Prompt chunks are playing (or queued).
    PlayingPrompt,
    /// Talk detection armed, waiting for voice or keypad input.
    Listening,
    /// Caller input is streaming to the recognizer, or keypad digits are
    /// accumulating.
    Recognizing,
    /// Outcome is being written back to the switch.
    Finalizing,
    /// Torn down. Nothing further happens to this session.
    Terminated,
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallState::Answering => "answering",
            CallState::PlayingPrompt => "playing-prompt",
            CallState::Listening => "listening",
            CallState::Recognizing => "recognizing",
            CallState::Finalizing => "finalizing",
            CallState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
