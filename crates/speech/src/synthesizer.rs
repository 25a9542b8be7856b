//! Synthesis adapter
//!
//! One REST call per prompt. The response body streams back as PCM in the
//! configured output format and is forwarded chunk by chunk, so playback of
//! the first chunk can begin while the tail is still being synthesized.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use voice_gateway_config::AzureConfig;
use voice_gateway_core::{Result, SpeechSynthesizer, SynthesisEvent};

const CHUNK_CHANNEL_DEPTH: usize = 32;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Azure TTS REST adapter.
pub struct AzureSynthesizer {
    config: AzureConfig,
    client: reqwest::Client,
}

impl AzureSynthesizer {
    pub fn new(config: AzureConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.config.region
        )
    }

    fn ssml(&self, text: &str) -> String {
        format!(
            "<speak version='1.0' xml:lang='{lang}'><voice xml:lang='{lang}' name='{voice}'>{text}</voice></speak>",
            lang = self.config.tts_language,
            voice = self.config.tts_voice_name,
            text = escape_xml(text),
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<mpsc::Receiver<SynthesisEvent>> {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_DEPTH);

        let request = self
            .client
            .post(self.endpoint())
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", &self.config.tts_output_format)
            .header("User-Agent", "voice-gateway")
            .body(self.ssml(text));

        tokio::spawn(async move {
            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    let _ = tx.send(SynthesisEvent::Error(e.to_string())).await;
                    return;
                }
            };

            if let Err(e) = response.error_for_status_ref() {
                warn!(error = %e, "synthesis request rejected");
                let _ = tx.send(SynthesisEvent::Error(e.to_string())).await;
                return;
            }

            let mut body = response.bytes_stream();
            let mut total = 0usize;
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) if bytes.is_empty() => {}
                    Ok(bytes) => {
                        total += bytes.len();
                        if tx.send(SynthesisEvent::Chunk(bytes.to_vec())).await.is_err() {
                            // Consumer gone (e.g. barge-in teardown); stop pulling.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(SynthesisEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            debug!(bytes = total, "synthesis stream complete");
            let _ = tx.send(SynthesisEvent::End).await;
        });

        Ok(rx)
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
