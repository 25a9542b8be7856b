//! Streaming recognition adapter
//!
//! Opens one provider WebSocket per recognition session, forwards PCM from
//! the push stream, and reduces the provider's message stream to the
//! [`RecognizerEvent`] set. `Ended` is terminal; whatever the provider sends
//! afterwards is dropped.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use voice_gateway_config::AzureConfig;
use voice_gateway_core::{
    GatewayError, PushStream, PushStreamItem, RecognizerEvent, RecognizerSession, Result,
    SpeechRecognizer,
};

use crate::protocol::{self, paths, TranscriptAccumulator};

const EVENT_CHANNEL_DEPTH: usize = 64;
const PUSH_STREAM_DEPTH: usize = 256;

/// Azure streaming STT adapter.
pub struct AzureRecognizer {
    config: AzureConfig,
}

impl AzureRecognizer {
    pub fn new(config: AzureConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        format!(
            "wss://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}&format=simple",
            self.config.region, self.config.stt_language
        )
    }
}

#[async_trait]
impl SpeechRecognizer for AzureRecognizer {
    async fn start(&self) -> Result<RecognizerSession> {
        let request_id = Uuid::new_v4().simple().to_string();

        let mut request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| GatewayError::Recognizer(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Ocp-Apim-Subscription-Key",
            self.config
                .subscription_key
                .parse()
                .map_err(|_| GatewayError::Recognizer("invalid subscription key".into()))?,
        );
        headers.insert(
            "X-ConnectionId",
            request_id
                .parse()
                .map_err(|_| GatewayError::Recognizer("invalid connection id".into()))?,
        );

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| GatewayError::Recognizer(format!("connect: {e}")))?;

        let (stream, commands) = PushStream::channel(PUSH_STREAM_DEPTH);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);

        tokio::spawn(session_loop(ws, commands, event_tx, request_id));

        Ok(RecognizerSession {
            stream,
            events: event_rx,
        })
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn session_loop(
    mut ws: WsStream,
    mut commands: voice_gateway_core::PushStreamReceiver,
    events: mpsc::Sender<RecognizerEvent>,
    request_id: String,
) {
    let mut transcript = TranscriptAccumulator::default();
    let mut ended = false;
    let mut audio_done = false;

    // Declare the client, then the raw-PCM format via a WAV preamble.
    let config_msg =
        protocol::text_message(paths::SPEECH_CONFIG, &request_id, &protocol::speech_config_body());
    if ws.send(Message::Text(config_msg)).await.is_err() {
        let _ = events
            .send(RecognizerEvent::Error("failed to send speech.config".into()))
            .await;
        return;
    }
    let preamble = protocol::audio_message(&request_id, &protocol::wav_preamble());
    if ws.send(Message::Binary(preamble)).await.is_err() {
        let _ = events
            .send(RecognizerEvent::Error("failed to send audio preamble".into()))
            .await;
        return;
    }

    let _ = events.send(RecognizerEvent::Ready).await;

    loop {
        tokio::select! {
            cmd = commands.recv(), if !audio_done => match cmd {
                Some(PushStreamItem::Audio(pcm)) => {
                    let msg = protocol::audio_message(&request_id, &pcm);
                    if let Err(e) = ws.send(Message::Binary(msg)).await {
                        warn!(error = %e, "audio write failed");
                        if !ended {
                            ended = true;
                            let _ = events.send(RecognizerEvent::Error(e.to_string())).await;
                        }
                        break;
                    }
                }
                Some(PushStreamItem::Stop) | None => {
                    // Zero-length audio marks end-of-stream; the provider
                    // answers with the remaining phrases and turn.end.
                    audio_done = true;
                    let end_marker = protocol::audio_message(&request_id, &[]);
                    if ws.send(Message::Binary(end_marker)).await.is_err() && !ended {
                        ended = true;
                        let _ = events
                            .send(RecognizerEvent::Ended(std::mem::take(&mut transcript).finish()))
                            .await;
                        break;
                    }
                }
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(raw))) => {
                    if ended {
                        continue;
                    }
                    let Some(server_msg) = protocol::parse_server_message(&raw) else {
                        debug!("unparsable server message");
                        continue;
                    };
                    match server_msg.path.as_str() {
                        paths::HYPOTHESIS => {
                            if let Some(text) = json_str(&server_msg.body, "Text") {
                                let _ = events.send(RecognizerEvent::Partial(text)).await;
                            }
                        }
                        paths::PHRASE => {
                            let status = json_str(&server_msg.body, "RecognitionStatus");
                            if status.as_deref() == Some("Success") {
                                if let Some(text) = json_str(&server_msg.body, "DisplayText") {
                                    transcript.push_final(&text);
                                }
                            }
                        }
                        paths::END_DETECTED => {
                            debug!("provider detected end of speech");
                        }
                        paths::TURN_END => {
                            ended = true;
                            let _ = events
                                .send(RecognizerEvent::Ended(
                                    std::mem::take(&mut transcript).finish(),
                                ))
                                .await;
                            break;
                        }
                        other => debug!(path = %other, "ignoring provider message"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    if !ended {
                        ended = true;
                        let _ = events
                            .send(RecognizerEvent::Ended(std::mem::take(&mut transcript).finish()))
                            .await;
                    }
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    if !ended {
                        ended = true;
                        let _ = events.send(RecognizerEvent::Error(e.to_string())).await;
                    }
                    break;
                }
            },
        }
    }

    let _ = ws.close(None).await;
}

fn json_str(body: &str, field: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get(field)?
        .as_str()
        .map(str::to_string)
}
