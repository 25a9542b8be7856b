//! End-to-end session flows against mock collaborators
//!
//! The switch, recognizer and synthesizer are in-process mocks; RTP media is
//! real UDP against the session's receiver, discovered through the port the
//! mock switch was asked to point the external media channel at.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use voice_gateway_config::Settings;
use voice_gateway_core::{
    CallControl, GatewayError, PushStream, PushStreamItem, RecognizerEvent, RecognizerSession,
    Result, SpeechRecognizer, SpeechSynthesizer, SynthesisEvent,
};
use voice_gateway_media::{PromptCache, RecordingWriter};
use voice_gateway_persistence::InMemoryInteractionStore;
use voice_gateway_session::{CallEvent, CallSession, SessionContext, SessionEvent};

const MAIN_CHANNEL: &str = "1700000000.42";
const CALLER: &str = "3001";

// ---------------------------------------------------------------------------
// Mock switch

#[derive(Default)]
struct MockControl {
    ops: Mutex<Vec<(String, String)>>,
    script_vars: HashMap<String, String>,
    vars_written: Mutex<HashMap<String, String>>,
    seq: AtomicUsize,
    ext_media_port: Mutex<Option<u16>>,
}

impl MockControl {
    fn new(script_vars: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            script_vars: script_vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    fn log(&self, op: &str, arg: &str) {
        self.ops.lock().push((op.to_string(), arg.to_string()));
    }

    fn ops_named(&self, op: &str) -> Vec<String> {
        self.ops
            .lock()
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, a)| a.clone())
            .collect()
    }

    fn var_written(&self, name: &str) -> Option<String> {
        self.vars_written.lock().get(name).cloned()
    }

    async fn wait_for_op(&self, op: &str, count: usize) -> Vec<String> {
        for _ in 0..200 {
            let found = self.ops_named(op);
            if found.len() >= count {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {count}× {op}; ops: {:?}", self.ops.lock());
    }

    async fn wait_for_ext_media_port(&self) -> u16 {
        for _ in 0..200 {
            if let Some(port) = *self.ext_media_port.lock() {
                return port;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("external media channel never created");
    }
}

#[async_trait]
impl CallControl for MockControl {
    async fn answer(&self, channel_id: &str) -> Result<()> {
        self.log("answer", channel_id);
        Ok(())
    }

    async fn hangup(&self, channel_id: &str) -> Result<()> {
        self.log("hangup", channel_id);
        Ok(())
    }

    async fn get_variable(&self, _channel_id: &str, name: &str) -> Result<Option<String>> {
        Ok(self.script_vars.get(name).cloned())
    }

    async fn get_all_variables(&self, _channel_id: &str) -> Result<HashMap<String, String>> {
        Ok(self.script_vars.clone())
    }

    async fn set_variable(&self, _channel_id: &str, name: &str, value: &str) -> Result<()> {
        self.log("set_variable", name);
        self.vars_written
            .lock()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn continue_in_dialplan(&self, channel_id: &str) -> Result<()> {
        self.log("continue", channel_id);
        Ok(())
    }

    async fn create_bridge(&self) -> Result<String> {
        let id = format!("bridge-{}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.log("create_bridge", &id);
        Ok(id)
    }

    async fn add_channel_to_bridge(&self, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.log("add_to_bridge", &format!("{bridge_id}/{channel_id}"));
        Ok(())
    }

    async fn destroy_bridge(&self, bridge_id: &str) -> Result<()> {
        self.log("destroy_bridge", bridge_id);
        Ok(())
    }

    async fn create_snoop_channel(
        &self,
        channel_id: &str,
        spy: &str,
        app_args: &str,
    ) -> Result<String> {
        assert_eq!(spy, "in");
        assert_eq!(app_args, "internal");
        let id = format!("snoop-{}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.log("create_snoop", &format!("{channel_id}->{id}"));
        Ok(id)
    }

    async fn create_external_media_channel(
        &self,
        _host: &str,
        port: u16,
        format: &str,
        app_args: &str,
    ) -> Result<String> {
        assert_eq!(format, "ulaw");
        assert_eq!(app_args, "internal");
        *self.ext_media_port.lock() = Some(port);
        let id = format!("ext-{}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.log("create_ext_media", &id);
        Ok(id)
    }

    async fn play_on_bridge(
        &self,
        _bridge_id: &str,
        _media_ref: &str,
        playback_id: &str,
    ) -> Result<()> {
        self.log("play", playback_id);
        Ok(())
    }

    async fn stop_playback(&self, playback_id: &str) -> Result<()> {
        self.log("stop_playback", playback_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mock speech service

struct MockRecognizer {
    final_text: String,
    /// When false the session never sees `Ended`, as with a hung provider.
    end_on_stop: bool,
    starts: AtomicUsize,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockRecognizer {
    fn new(final_text: &str) -> Arc<Self> {
        Arc::new(Self {
            final_text: final_text.to_string(),
            end_on_stop: true,
            starts: AtomicUsize::new(0),
            writes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn hung(final_text: &str) -> Arc<Self> {
        Arc::new(Self {
            final_text: final_text.to_string(),
            end_on_stop: false,
            starts: AtomicUsize::new(0),
            writes: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn start(&self) -> Result<RecognizerSession> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (stream, mut commands) = PushStream::channel(64);
        let (events_tx, events_rx) = mpsc::channel(16);
        let writes = self.writes.clone();
        let final_text = self.final_text.clone();
        let end_on_stop = self.end_on_stop;

        tokio::spawn(async move {
            let _ = events_tx.send(RecognizerEvent::Ready).await;
            while let Some(item) = commands.recv().await {
                match item {
                    PushStreamItem::Audio(pcm) => writes.lock().push(pcm),
                    PushStreamItem::Stop => {
                        if end_on_stop {
                            let _ = events_tx
                                .send(RecognizerEvent::Ended(final_text.clone()))
                                .await;
                        }
                        break;
                    }
                }
            }
        });

        Ok(RecognizerSession {
            stream,
            events: events_rx,
        })
    }
}

struct MockSynthesizer {
    chunks: Vec<Vec<u8>>,
    fail: bool,
}

impl MockSynthesizer {
    fn new(chunk_count: usize) -> Arc<Self> {
        // 100 ms of distinct PCM per chunk.
        let chunks = (0..chunk_count)
            .map(|i| vec![i as u8 + 1; 1600])
            .collect();
        Arc::new(Self {
            chunks,
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            chunks: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<mpsc::Receiver<SynthesisEvent>> {
        if self.fail {
            return Err(GatewayError::Prompt("synthesis backend down".into()));
        }
        let (tx, rx) = mpsc::channel(32);
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(SynthesisEvent::Chunk(chunk)).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(SynthesisEvent::End).await;
        });
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Harness

struct Harness {
    control: Arc<MockControl>,
    store: Arc<InMemoryInteractionStore>,
    inbox: mpsc::Sender<SessionEvent>,
    cache_dir: std::path::PathBuf,
    recordings_dir: std::path::PathBuf,
}

async fn make_ctx(
    control: Arc<MockControl>,
    recognizer: Arc<MockRecognizer>,
    synthesizer: Arc<MockSynthesizer>,
    store: Arc<InMemoryInteractionStore>,
    rtp_port: u16,
) -> (SessionContext, std::path::PathBuf, std::path::PathBuf) {
    let scratch = std::env::temp_dir().join(format!(
        "call-flow-{}",
        uuid::Uuid::new_v4().simple()
    ));
    let cache_dir = scratch.join("cache");
    let recordings_dir = scratch.join("recordings");

    let mut defaults = Settings::default();
    defaults.rtp.external_media_ip = "127.0.0.1".into();
    defaults.rtp.external_media_port = rtp_port;

    let ctx = SessionContext {
        control,
        recognizer,
        synthesizer,
        store,
        prompt_cache: PromptCache::init_at(cache_dir.clone()).await.unwrap(),
        recordings: RecordingWriter::new(recordings_dir.clone()),
        defaults,
    };
    (ctx, cache_dir, recordings_dir)
}

impl Harness {
    async fn spawn(
        control: Arc<MockControl>,
        recognizer: Arc<MockRecognizer>,
        synthesizer: Arc<MockSynthesizer>,
        rtp_port: u16,
    ) -> Self {
        let store = Arc::new(InMemoryInteractionStore::new());
        let (ctx, cache_dir, recordings_dir) = make_ctx(
            control.clone(),
            recognizer.clone(),
            synthesizer,
            store.clone(),
            rtp_port,
        )
        .await;

        let channel = voice_gateway_ari::Channel {
            id: MAIN_CHANNEL.to_string(),
            caller: voice_gateway_ari::CallerId {
                name: "Alice".into(),
                number: CALLER.into(),
            },
            ..Default::default()
        };
        let inbox = CallSession::spawn(ctx, channel);

        Self {
            control,
            store,
            inbox,
            cache_dir,
            recordings_dir,
        }
    }

    async fn send(&self, event: CallEvent) {
        self.inbox
            .send(SessionEvent::Call(event))
            .await
            .expect("session inbox open");
    }

    async fn finish_playback(&self, playback_id: &str) {
        self.send(CallEvent::PlaybackFinished {
            playback_id: playback_id.to_string(),
        })
        .await;
    }

    async fn send_rtp_frames(&self, start_seq: u16, count: u16, ulaw_byte: u8) {
        let port = self.control.wait_for_ext_media_port().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..count {
            let mut pkt = vec![0u8; 12];
            pkt[0] = 0x80;
            pkt[2..4].copy_from_slice(&(start_seq + i).to_be_bytes());
            pkt.extend_from_slice(&[ulaw_byte; 160]);
            socket
                .send_to(&pkt, ("127.0.0.1", port))
                .await
                .unwrap();
        }
    }

    fn cache_files(&self) -> usize {
        std::fs::read_dir(&self.cache_dir)
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    async fn wait_until_cache_empty(&self) {
        for _ in 0..200 {
            if self.cache_files() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("prompt cache still holds {} files", self.cache_files());
    }
}

fn base_vars() -> Vec<(&'static str, &'static str)> {
    vec![
        ("TEXT_TO_SPEAK", "hola"),
        ("APP_VAR_VAD_ACTIVATION_MODE", "after_prompt_start"),
        ("APP_VAR_VAD_ACTIVATION_DELAY_MS", "0"),
        ("APP_VAR_NO_INPUT_TIMEOUT_MS", "0"),
        ("APP_VAR_ARI_SESSION_TIMEOUT_MS", "0"),
        ("APP_VAR_DTMF_COMPLETION_TIMEOUT_MS", "300"),
    ]
}

// ---------------------------------------------------------------------------
// Scenarios

#[tokio::test]
async fn test_happy_path_voice() {
    let control = MockControl::new(&base_vars());
    let recognizer = MockRecognizer::new("buenos días");
    let harness = Harness::spawn(
        control.clone(),
        recognizer.clone(),
        MockSynthesizer::new(1),
        42000,
    )
    .await;

    // Prompt chunk plays; finish it.
    let plays = control.wait_for_op("play", 1).await;
    harness.finish_playback(&plays[0]).await;

    // Talk detect was armed with the positional threshold string.
    control.wait_for_op("set_variable", 1).await;
    assert_eq!(
        control.var_written("TALK_DETECT(set)").as_deref(),
        Some("1200,500")
    );

    // Pre-speech audio lands in the pre-buffer before voice onset.
    harness.send_rtp_frames(100, 5, 0xFE).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    harness.send(CallEvent::TalkingStarted).await;

    // Live speech follows, then the caller stops talking.
    harness.send_rtp_frames(105, 5, 0x7E).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    harness
        .send(CallEvent::TalkingFinished { duration_ms: 1850 })
        .await;

    control.wait_for_op("continue", 1).await;
    assert_eq!(
        control.var_written("TRANSCRIPT").as_deref(),
        Some("buenos días")
    );
    assert_eq!(
        control.var_written("RECOGNITION_MODE").as_deref(),
        Some("VOICE")
    );

    // The pre-buffer flush is the first recognizer write, live frames after.
    let writes = recognizer.writes.lock().clone();
    assert!(!writes.is_empty());
    assert_eq!(writes[0].len(), 5 * 160 * 2);
    assert!(writes[0].chunks_exact(2).all(|s| s == [8, 0]));
    assert!(writes[1..]
        .iter()
        .flat_map(|w| w.chunks_exact(2))
        .all(|s| s == 8i16.to_le_bytes() || s == (-8i16).to_le_bytes()));

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;

    // Interaction row and caller recording exist; cache is empty.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let rows = harness.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recognition_mode, "VOICE");
    assert_eq!(rows[0].transcript, "buenos días");
    assert_eq!(rows[0].caller_id, CALLER);
    assert!(!rows[0].stt_audio_path.is_empty());
    assert!(harness.recordings_dir.join("stt").exists());
    harness.wait_until_cache_empty().await;

    // Both internal channels hung up, both bridges destroyed.
    let hangups = control.ops_named("hangup");
    assert!(hangups.iter().any(|c| c.starts_with("snoop-")));
    assert!(hangups.iter().any(|c| c.starts_with("ext-")));
    assert_eq!(control.ops_named("destroy_bridge").len(), 2);
}

#[tokio::test]
async fn test_barge_in_stops_prompt_and_drops_queue() {
    let control = MockControl::new(&base_vars());
    let recognizer = MockRecognizer::new("ya estoy aquí");
    let harness = Harness::spawn(
        control.clone(),
        recognizer.clone(),
        MockSynthesizer::new(5),
        42100,
    )
    .await;

    // Chunk 1 plays and finishes; chunk 2 starts.
    let plays = control.wait_for_op("play", 1).await;
    harness.finish_playback(&plays[0]).await;
    let plays = control.wait_for_op("play", 2).await;
    let second = plays[1].clone();

    // Voice onset mid-chunk-2: stop is requested for exactly that playback.
    harness.send(CallEvent::TalkingStarted).await;
    let stopped = control.wait_for_op("stop_playback", 1).await;
    assert_eq!(stopped[0], second);

    // A duplicate onset must not open a second recognizer.
    harness.send(CallEvent::TalkingStarted).await;

    // The stop surfaces as the playback's finished signal.
    harness.finish_playback(&second).await;

    harness
        .send(CallEvent::TalkingFinished { duration_ms: 900 })
        .await;
    control.wait_for_op("continue", 1).await;

    // Chunks 3..5 never played and their artifacts are gone.
    assert_eq!(control.ops_named("play").len(), 2);
    harness.wait_until_cache_empty().await;
    assert_eq!(recognizer.start_count(), 1);
    assert_eq!(
        control.var_written("TRANSCRIPT").as_deref(),
        Some("ya estoy aquí")
    );

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;
}

#[tokio::test]
async fn test_keypad_preempts_voice() {
    let control = MockControl::new(&base_vars());
    let recognizer = MockRecognizer::new("never used");
    let harness = Harness::spawn(
        control.clone(),
        recognizer.clone(),
        MockSynthesizer::new(3),
        42200,
    )
    .await;

    // First digit arrives while chunk 1 is still playing.
    let plays = control.wait_for_op("play", 1).await;
    harness
        .send(CallEvent::DtmfReceived { digit: "1".into() })
        .await;

    let stopped = control.wait_for_op("stop_playback", 1).await;
    assert_eq!(stopped[0], plays[0]);
    harness.finish_playback(&plays[0]).await;

    // Voice onset after keypad takeover must be ignored.
    harness.send(CallEvent::TalkingStarted).await;

    for digit in ["2", "3"] {
        tokio::time::sleep(Duration::from_millis(100)).await;
        harness
            .send(CallEvent::DtmfReceived {
                digit: digit.into(),
            })
            .await;
    }

    // The completion window (300 ms) expires after the last digit.
    control.wait_for_op("continue", 1).await;
    assert_eq!(control.var_written("DTMF_RESULT").as_deref(), Some("123"));
    assert_eq!(
        control.var_written("RECOGNITION_MODE").as_deref(),
        Some("DTMF")
    );
    assert_eq!(recognizer.start_count(), 0);

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let rows = harness.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recognition_mode, "DTMF");
    assert_eq!(rows[0].keypad_digits, "123");
    // Keypad outcomes produce no caller recording.
    assert!(rows[0].stt_audio_path.is_empty());
}

#[tokio::test]
async fn test_no_input_timeout_hangs_up() {
    let mut vars = base_vars();
    vars.retain(|(k, _)| *k != "APP_VAR_NO_INPUT_TIMEOUT_MS");
    vars.push(("APP_VAR_NO_INPUT_TIMEOUT_MS", "200"));

    let control = MockControl::new(&vars);
    let harness = Harness::spawn(
        control.clone(),
        MockRecognizer::new("unused"),
        MockSynthesizer::new(1),
        42300,
    )
    .await;

    let plays = control.wait_for_op("play", 1).await;
    harness.finish_playback(&plays[0]).await;

    // Nothing happens; the no-input timer fires and the channel is hung up.
    control.wait_for_op("hangup", 1).await;
    assert_eq!(
        control.var_written("RECOGNITION_MODE").as_deref(),
        Some("NO_INPUT")
    );
    assert!(control.ops_named("continue").is_empty());

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let rows = harness.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recognition_mode, "NO_INPUT");
}

#[tokio::test]
async fn test_session_timeout_with_hung_recognizer() {
    let mut vars = base_vars();
    vars.retain(|(k, _)| *k != "APP_VAR_ARI_SESSION_TIMEOUT_MS");
    vars.push(("APP_VAR_ARI_SESSION_TIMEOUT_MS", "500"));

    let control = MockControl::new(&vars);
    let recognizer = MockRecognizer::hung("never delivered");
    let harness = Harness::spawn(
        control.clone(),
        recognizer.clone(),
        MockSynthesizer::new(1),
        42400,
    )
    .await;

    let plays = control.wait_for_op("play", 1).await;
    harness.finish_playback(&plays[0]).await;

    // Voice starts and ends, but the recognizer never completes.
    harness.send(CallEvent::TalkingStarted).await;
    harness
        .send(CallEvent::TalkingFinished { duration_ms: 400 })
        .await;

    // The hard session ceiling tears the call down.
    control.wait_for_op("hangup", 1).await;
    assert!(control.ops_named("continue").is_empty());

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let rows = harness.store.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recognition_mode, "TIMEOUT");
}

#[tokio::test]
async fn test_prompt_failure_still_arms_detection() {
    let control = MockControl::new(&base_vars());
    let harness = Harness::spawn(
        control.clone(),
        MockRecognizer::new("sí"),
        MockSynthesizer::failing(),
        42500,
    )
    .await;

    // No playback ever happens, but talk detection is armed regardless.
    control.wait_for_op("set_variable", 1).await;
    assert!(control.var_written("TALK_DETECT(set)").is_some());
    assert!(control.ops_named("play").is_empty());

    harness.send(CallEvent::TalkingStarted).await;
    harness
        .send(CallEvent::TalkingFinished { duration_ms: 700 })
        .await;

    control.wait_for_op("continue", 1).await;
    assert_eq!(control.var_written("TRANSCRIPT").as_deref(), Some("sí"));

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;
}

#[tokio::test]
async fn test_missing_prompt_text_finalizes_with_error() {
    let vars: Vec<(&str, &str)> = base_vars()
        .into_iter()
        .filter(|(k, _)| *k != "TEXT_TO_SPEAK")
        .collect();
    let control = MockControl::new(&vars);
    let harness = Harness::spawn(
        control.clone(),
        MockRecognizer::new("unused"),
        MockSynthesizer::new(1),
        42600,
    )
    .await;

    control.wait_for_op("continue", 1).await;
    assert_eq!(
        control.var_written("RECOGNITION_MODE").as_deref(),
        Some("ERROR")
    );

    harness.send(CallEvent::ChannelLeft).await;
    // No topology was built, so nothing to destroy; the session still ends
    // cleanly and a second channel-left is simply a closed inbox.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness
        .inbox
        .send(SessionEvent::Call(CallEvent::ChannelLeft))
        .await
        .is_err());
}

#[tokio::test]
async fn test_dispatch_ignores_internal_channels() {
    use std::sync::Arc as StdArc;
    use voice_gateway_session::{dispatch_event, SessionRegistry};

    let control = MockControl::new(&base_vars());
    let store = Arc::new(InMemoryInteractionStore::new());
    let (ctx, _cache, _rec) = make_ctx(
        control.clone(),
        MockRecognizer::new("unused"),
        MockSynthesizer::new(1),
        store,
        42800,
    )
    .await;
    let registry = StdArc::new(SessionRegistry::new());

    // A snoop channel entering with the internal marker is answered and
    // never becomes a session.
    let internal = voice_gateway_ari::AriEvent::StasisStart {
        channel: voice_gateway_ari::Channel {
            id: "snoop-99".into(),
            ..Default::default()
        },
        args: vec!["internal".into()],
    };
    dispatch_event(&registry, &ctx, internal).await;
    assert_eq!(registry.count(), 0);
    assert_eq!(control.ops_named("answer"), vec!["snoop-99".to_string()]);

    // A real caller spawns a session.
    let caller = voice_gateway_ari::AriEvent::StasisStart {
        channel: voice_gateway_ari::Channel {
            id: MAIN_CHANNEL.into(),
            ..Default::default()
        },
        args: Vec::new(),
    };
    dispatch_event(&registry, &ctx, caller).await;
    assert_eq!(registry.count(), 1);
    control.wait_for_op("create_bridge", 1).await;

    // Its exit removes the registry entry.
    let exit = voice_gateway_ari::AriEvent::StasisEnd {
        channel: voice_gateway_ari::Channel {
            id: MAIN_CHANNEL.into(),
            ..Default::default()
        },
    };
    dispatch_event(&registry, &ctx, exit).await;
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_teardown_happens_exactly_once() {
    let control = MockControl::new(&base_vars());
    let harness = Harness::spawn(
        control.clone(),
        MockRecognizer::new("unused"),
        MockSynthesizer::new(1),
        42700,
    )
    .await;

    let plays = control.wait_for_op("play", 1).await;
    harness.finish_playback(&plays[0]).await;

    harness.send(CallEvent::ChannelLeft).await;
    control.wait_for_op("destroy_bridge", 2).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Exactly two bridges destroyed and two internal channels hung up, even
    // though the session saw several teardown-adjacent events.
    assert_eq!(control.ops_named("destroy_bridge").len(), 2);
    let hangups = control.ops_named("hangup");
    assert_eq!(
        hangups
            .iter()
            .filter(|c| c.starts_with("snoop-") || c.starts_with("ext-"))
            .count(),
        2
    );
}
