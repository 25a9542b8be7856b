//! Azure Speech WebSocket message framing
//!
//! Text messages carry CRLF-separated headers, a blank line, then a JSON
//! body. Binary (audio) messages carry a big-endian u16 header-block length,
//! the same header format, then raw payload bytes.

use chrono::Utc;

/// Well-known message paths used by the recognition endpoint.
pub mod paths {
    pub const SPEECH_CONFIG: &str = "speech.config";
    pub const AUDIO: &str = "audio";
    pub const HYPOTHESIS: &str = "speech.hypothesis";
    pub const PHRASE: &str = "speech.phrase";
    pub const END_DETECTED: &str = "speech.endDetected";
    pub const TURN_END: &str = "turn.end";
}

/// Build a text message for `path` with a JSON body.
pub fn text_message(path: &str, request_id: &str, body: &str) -> String {
    format!(
        "Path: {path}\r\nX-RequestId: {request_id}\r\nX-Timestamp: {}\r\nContent-Type: application/json; charset=utf-8\r\n\r\n{body}",
        Utc::now().to_rfc3339()
    )
}

/// Build a binary audio message. An empty `payload` marks end-of-stream.
pub fn audio_message(request_id: &str, payload: &[u8]) -> Vec<u8> {
    let headers = format!(
        "Path: {}\r\nX-RequestId: {request_id}\r\nX-Timestamp: {}\r\nContent-Type: audio/x-wav\r\n",
        paths::AUDIO,
        Utc::now().to_rfc3339()
    );
    let header_bytes = headers.as_bytes();
    let mut msg = Vec::with_capacity(2 + header_bytes.len() + payload.len());
    msg.extend_from_slice(&(header_bytes.len() as u16).to_be_bytes());
    msg.extend_from_slice(header_bytes);
    msg.extend_from_slice(payload);
    msg
}

/// A parsed server text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub path: String,
    pub body: String,
}

/// Split a server text message into its path header and JSON body.
pub fn parse_server_message(raw: &str) -> Option<ServerMessage> {
    let (headers, body) = raw.split_once("\r\n\r\n")?;
    let path = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("path")
            .then(|| value.trim().to_string())
    })?;
    Some(ServerMessage {
        path,
        body: body.to_string(),
    })
}

/// The `speech.config` body declaring the client context.
pub fn speech_config_body() -> String {
    serde_json::json!({
        "context": {
            "system": {
                "name": "voice-gateway",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "os": {
                "platform": std::env::consts::OS,
                "name": std::env::consts::OS,
                "version": "unknown",
            },
        }
    })
    .to_string()
}

/// A canonical 44-byte WAV header declaring 8 kHz / 16-bit / mono, sent as
/// the audio stream preamble so the service knows the raw format. The data
/// length field is irrelevant for streaming and left at zero.
pub fn wav_preamble() -> Vec<u8> {
    voice_gateway_core::WavSpec::telephony().wrap(&[])
}

/// Accumulates final hypotheses into the terminal transcript.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    finals: Vec<String>,
}

impl TranscriptAccumulator {
    /// Record one final hypothesis; blank results are dropped.
    pub fn push_final(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.finals.push(trimmed.to_string());
        }
    }

    /// Space-joined, trimmed concatenation of everything recognized.
    pub fn finish(self) -> String {
        self.finals.join(" ")
    }
}
