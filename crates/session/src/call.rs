//! The per-call orchestrator
//!
//! One `CallSession` task per inbound channel. The task answers the channel,
//! builds the audio snooping topology, drives prompt playback, arms talk
//! detection, multiplexes voice against keypad input, marshals the outcome
//! back to the switch, and tears everything down exactly once.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use voice_gateway_ari::Channel;
use voice_gateway_config::{apply_script_overrides, EffectiveConfig, PromptMode, VadActivationMode};
use voice_gateway_core::{
    ulaw_to_pcm, PushStream, RecognitionMode, RecognizerEvent, RtpEvent, SynthesisEvent,
    TimeoutKind,
};
use voice_gateway_media::recordings::RecordingKind;
use voice_gateway_media::{PromptArtifact, RtpReceiver};
use voice_gateway_persistence::InteractionRecord;

use crate::context::SessionContext;
use crate::event::{CallEvent, SessionEvent};
use crate::registry::INTERNAL_CHANNEL_ARG;
use crate::state::CallState;

const INBOX_DEPTH: usize = 512;
const LIVE_FRAME_DEPTH: usize = 256;

/// Variable holding the prompt text; required when the prompt mode is tts.
const TEXT_TO_SPEAK_VAR: &str = "TEXT_TO_SPEAK";

/// Per-name fallback list used when the bulk variable read is unsupported.
const SCRIPT_VARIABLE_NAMES: &[&str] = &[
    TEXT_TO_SPEAK_VAR,
    "APP_VAR_ARI_URL",
    "APP_VAR_ARI_USERNAME",
    "APP_VAR_ARI_PASSWORD",
    "APP_VAR_ARI_APP_NAME",
    "APP_VAR_AZURE_SPEECH_SUBSCRIPTION_KEY",
    "APP_VAR_AZURE_SPEECH_REGION",
    "APP_VAR_AZURE_TTS_LANGUAGE",
    "APP_VAR_AZURE_TTS_VOICE_NAME",
    "APP_VAR_AZURE_TTS_OUTPUT_FORMAT",
    "APP_VAR_AZURE_STT_LANGUAGE",
    "APP_VAR_VAD_ACTIVATION_MODE",
    "APP_VAR_VAD_ACTIVATION_DELAY_MS",
    "APP_VAR_TALK_DETECT_SILENCE_THRESHOLD",
    "APP_VAR_TALK_DETECT_SPEECH_THRESHOLD",
    "APP_VAR_PROMPT_MODE",
    "APP_VAR_PLAYBACK_FILE_PATH",
    "APP_VAR_ARI_SESSION_TIMEOUT_MS",
    "APP_VAR_NO_INPUT_TIMEOUT_MS",
    "APP_VAR_RTP_PREBUFFER_SIZE",
    "APP_VAR_ENABLE_DTMF",
    "APP_VAR_DTMF_COMPLETION_TIMEOUT_MS",
    "APP_VAR_EXTERNAL_MEDIA_SERVER_IP",
    "APP_VAR_EXTERNAL_MEDIA_SERVER_PORT",
    "APP_VAR_EXTERNAL_MEDIA_AUDIO_FORMAT",
    "APP_VAR_LOG_LEVEL",
];

/// Which input path won the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Idle,
    Voice,
    Keypad,
}

/// One call's state, owned exclusively by its task.
pub struct CallSession {
    ctx: SessionContext,
    channel_id: String,
    caller_id: String,
    cfg: EffectiveConfig,
    state: CallState,
    inbox_tx: mpsc::Sender<SessionEvent>,

    // Media topology, torn down in reverse creation order.
    user_bridge: Option<String>,
    snoop_bridge: Option<String>,
    snoop_channel: Option<String>,
    extmedia_channel: Option<String>,
    rtp: Option<RtpReceiver>,

    // Prompt playback.
    text_to_speak: String,
    prompt_queue: VecDeque<PromptArtifact>,
    current_playback: Option<(String, Option<PathBuf>)>,
    prompt_stopped: bool,
    synthesis_done: bool,
    any_chunk_played: bool,
    tts_pcm: Vec<u8>,
    tts_recording_path: String,

    // Caller input.
    vad_armed: bool,
    input_mode: InputMode,
    recognizer_stream: Option<PushStream>,
    discard_recognizer: bool,
    stt_ulaw: Vec<u8>,
    stt_recording_path: String,
    keypad_buffer: String,
    transcript: String,

    finalized: bool,
    cleaned_up: bool,

    session_timer: Option<JoinHandle<()>>,
    no_input_timer: Option<JoinHandle<()>>,
    keypad_timer: Option<JoinHandle<()>>,
    vad_delay_timer: Option<JoinHandle<()>>,
}

impl CallSession {
    /// Spawn the session task for a fresh channel and hand back its inbox.
    pub fn spawn(ctx: SessionContext, channel: Channel) -> mpsc::Sender<SessionEvent> {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_DEPTH);
        let span = info_span!(
            "call",
            unique_id = %channel.id,
            caller_id = %channel.caller.number
        );

        let session = Self {
            cfg: ctx.defaults.clone(),
            ctx,
            channel_id: channel.id,
            caller_id: channel.caller.number,
            state: CallState::Answering,
            inbox_tx: inbox_tx.clone(),
            user_bridge: None,
            snoop_bridge: None,
            snoop_channel: None,
            extmedia_channel: None,
            rtp: None,
            text_to_speak: String::new(),
            prompt_queue: VecDeque::new(),
            current_playback: None,
            prompt_stopped: false,
            synthesis_done: false,
            any_chunk_played: false,
            tts_pcm: Vec::new(),
            tts_recording_path: String::new(),
            vad_armed: false,
            input_mode: InputMode::Idle,
            recognizer_stream: None,
            discard_recognizer: false,
            stt_ulaw: Vec::new(),
            stt_recording_path: String::new(),
            keypad_buffer: String::new(),
            transcript: String::new(),
            finalized: false,
            cleaned_up: false,
            session_timer: None,
            no_input_timer: None,
            keypad_timer: None,
            vad_delay_timer: None,
        };

        tokio::spawn(session.run(inbox_rx).instrument(span));
        inbox_tx
    }

    async fn run(mut self, mut inbox: mpsc::Receiver<SessionEvent>) {
        if let Err(e) = self.initialize().await {
            error!(error = %e, "session initialization failed");
            self.finalize(RecognitionMode::Error).await;
        }

        while let Some(event) = inbox.recv().await {
            if matches!(event, SessionEvent::Call(CallEvent::ChannelLeft)) {
                debug!("channel left the application");
                break;
            }
            if self.state == CallState::Terminated {
                continue;
            }
            self.handle_event(event).await;
        }

        self.cleanup().await;
    }

    // ------------------------------------------------------------------
    // Setup

    async fn initialize(&mut self) -> voice_gateway_core::Result<()> {
        let vars = self.read_script_variables().await;
        self.cfg = apply_script_overrides(&self.ctx.defaults, &vars);
        self.text_to_speak = vars.get(TEXT_TO_SPEAK_VAR).cloned().unwrap_or_default();

        if self.cfg.timeouts.session_ms > 0 {
            self.session_timer =
                Some(self.start_timer(TimeoutKind::Session, self.cfg.timeouts.session_ms));
        }

        self.ctx.control.answer(&self.channel_id).await?;

        if self.cfg.prompt.mode == PromptMode::Tts && self.text_to_speak.is_empty() {
            warn!("TEXT_TO_SPEAK missing; cannot run prompt");
            self.finalize(RecognitionMode::Error).await;
            return Ok(());
        }

        self.build_topology().await?;
        self.start_prompt().await;
        Ok(())
    }

    /// Bulk variable read with a per-name fallback, since not every switch
    /// version supports the bulk getter.
    async fn read_script_variables(&self) -> HashMap<String, String> {
        match self.ctx.control.get_all_variables(&self.channel_id).await {
            Ok(vars) => vars,
            Err(e) => {
                debug!(error = %e, "bulk variable read unsupported; falling back to per-name reads");
                let mut vars = HashMap::new();
                for name in SCRIPT_VARIABLE_NAMES {
                    match self.ctx.control.get_variable(&self.channel_id, name).await {
                        Ok(Some(value)) => {
                            vars.insert(name.to_string(), value);
                        }
                        Ok(None) => {}
                        Err(e) => debug!(var = name, error = %e, "variable read failed"),
                    }
                }
                vars
            }
        }
    }

    /// Build the audio snooping topology: user bridge with the caller, a
    /// snoop channel tapping the caller's inbound audio, an external media
    /// channel pointed at our RTP receiver, and a snoop bridge joining them.
    async fn build_topology(&mut self) -> voice_gateway_core::Result<()> {
        let control = self.ctx.control.clone();

        let user_bridge = control.create_bridge().await?;
        self.user_bridge = Some(user_bridge.clone());
        control
            .add_channel_to_bridge(&user_bridge, &self.channel_id)
            .await?;

        let (rtp, rtp_events) = RtpReceiver::bind(
            &self.cfg.rtp.external_media_ip,
            self.cfg.rtp.external_media_port,
        )
        .await?;
        let rtp_port = rtp.local_addr().port();
        self.rtp = Some(rtp);
        self.forward_rtp_events(rtp_events);

        let snoop = control
            .create_snoop_channel(&self.channel_id, "in", INTERNAL_CHANNEL_ARG)
            .await?;
        self.snoop_channel = Some(snoop.clone());

        let extmedia = control
            .create_external_media_channel(
                &self.cfg.rtp.external_media_ip,
                rtp_port,
                &self.cfg.rtp.audio_format,
                INTERNAL_CHANNEL_ARG,
            )
            .await?;
        self.extmedia_channel = Some(extmedia.clone());

        let snoop_bridge = control.create_bridge().await?;
        self.snoop_bridge = Some(snoop_bridge.clone());
        control.add_channel_to_bridge(&snoop_bridge, &snoop).await?;
        control
            .add_channel_to_bridge(&snoop_bridge, &extmedia)
            .await?;

        info!(rtp_port, "audio snooping topology ready");
        Ok(())
    }

    fn forward_rtp_events(&self, mut events: mpsc::Receiver<RtpEvent>) {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if inbox.send(SessionEvent::Rtp(event)).await.is_err() {
                    break;
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Prompt

    async fn start_prompt(&mut self) {
        self.state = CallState::PlayingPrompt;

        match self.cfg.prompt.mode {
            PromptMode::Playback => {
                // Single pre-recorded file; no synthesis stream to wait for.
                self.synthesis_done = true;
                let media_ref = self.cfg.prompt.playback_file_path.clone();
                let playback_id = self.mint_playback_id();
                let bridge = self.user_bridge.clone().unwrap_or_default();
                match self
                    .ctx
                    .control
                    .play_on_bridge(&bridge, &media_ref, &playback_id)
                    .await
                {
                    Ok(()) => {
                        self.current_playback = Some((playback_id, None));
                        self.any_chunk_played = true;
                        if self.cfg.vad.activation_mode == VadActivationMode::AfterPromptStart {
                            self.schedule_vad_arm().await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "prompt playback failed; arming detection anyway");
                        self.abandon_prompt().await;
                    }
                }
            }
            PromptMode::Tts => {
                match self.ctx.synthesizer.synthesize(&self.text_to_speak).await {
                    Ok(mut chunks) => {
                        let inbox = self.inbox_tx.clone();
                        tokio::spawn(async move {
                            while let Some(event) = chunks.recv().await {
                                if inbox.send(SessionEvent::Synthesis(event)).await.is_err() {
                                    break;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "synthesis failed to start; arming detection anyway");
                        self.abandon_prompt().await;
                    }
                }
            }
        }
    }

    async fn handle_synthesis(&mut self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Chunk(pcm) => {
                // The full prompt is kept for the final recording even when
                // barge-in stops playback early.
                self.tts_pcm.extend_from_slice(&pcm);
                if self.prompt_stopped {
                    return;
                }
                match self.ctx.prompt_cache.put(&pcm).await {
                    Ok(artifact) => {
                        self.prompt_queue.push_back(artifact);
                        if self.current_playback.is_none() {
                            self.start_next_chunk().await;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to cache prompt chunk"),
                }
            }
            SynthesisEvent::End => {
                self.synthesis_done = true;
                if !self.tts_pcm.is_empty() {
                    match self
                        .ctx
                        .recordings
                        .write(
                            RecordingKind::Tts,
                            &self.channel_id,
                            &self.caller_id,
                            &self.tts_pcm,
                        )
                        .await
                    {
                        Ok(path) => self.tts_recording_path = path.display().to_string(),
                        Err(e) => warn!(error = %e, "failed to save prompt recording"),
                    }
                }
                if self.current_playback.is_none() && self.prompt_queue.is_empty() {
                    self.on_prompt_complete().await;
                }
            }
            SynthesisEvent::Error(e) => {
                warn!(error = %e, "synthesis failed mid-stream");
                self.synthesis_done = true;
                if self.current_playback.is_none() && self.prompt_queue.is_empty() {
                    self.abandon_prompt().await;
                }
            }
        }
    }

    /// Start the next queued chunk. Playback is serialized: chunk N+1 starts
    /// only after chunk N's finished (or failed) signal.
    async fn start_next_chunk(&mut self) {
        while self.current_playback.is_none() && !self.prompt_stopped {
            let Some(artifact) = self.prompt_queue.pop_front() else {
                if self.synthesis_done {
                    self.on_prompt_complete().await;
                }
                return;
            };

            let playback_id = self.mint_playback_id();
            let bridge = self.user_bridge.clone().unwrap_or_default();
            match self
                .ctx
                .control
                .play_on_bridge(&bridge, &artifact.media_ref, &playback_id)
                .await
            {
                Ok(()) => {
                    let first = !self.any_chunk_played;
                    self.any_chunk_played = true;
                    self.current_playback = Some((playback_id, Some(artifact.path)));
                    if first
                        && self.cfg.vad.activation_mode == VadActivationMode::AfterPromptStart
                    {
                        self.schedule_vad_arm().await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "chunk playback failed; skipping");
                    self.ctx.prompt_cache.remove(&artifact.path).await;
                }
            }
        }
    }

    async fn handle_playback_signal(&mut self, playback_id: &str, failed: bool) {
        let matches_current = self
            .current_playback
            .as_ref()
            .is_some_and(|(id, _)| id == playback_id);
        if !matches_current {
            debug!(playback_id, "signal for unknown playback");
            return;
        }

        let (_, path) = self.current_playback.take().expect("checked above");
        if let Some(path) = path {
            self.ctx.prompt_cache.remove(&path).await;
        }
        if failed {
            warn!(playback_id, "playback failed");
        }
        if self.prompt_stopped {
            return;
        }
        self.start_next_chunk().await;
    }

    /// Every prompt chunk has played (or the single file finished).
    async fn on_prompt_complete(&mut self) {
        if self.state == CallState::PlayingPrompt {
            self.state = CallState::Listening;
        }
        if self.cfg.vad.activation_mode == VadActivationMode::AfterPromptEnd && !self.vad_armed {
            self.schedule_vad_arm().await;
        }
    }

    /// Prompt delivery failed entirely. Detection is still armed so the call
    /// can proceed; the script decides what a silent prompt means.
    async fn abandon_prompt(&mut self) {
        self.synthesis_done = true;
        if self.state == CallState::PlayingPrompt {
            self.state = CallState::Listening;
        }
        if !self.vad_armed {
            self.schedule_vad_arm().await;
        }
    }

    /// Barge-in: stop the in-flight playback and drop the queue. Queued
    /// chunks never started, so no completion signal will ever name them;
    /// their files are removed here.
    async fn barge_in_prompt(&mut self) {
        if self.current_playback.is_none() && self.prompt_queue.is_empty() {
            return;
        }
        self.prompt_stopped = true;

        if let Some((playback_id, _)) = &self.current_playback {
            info!(playback_id = %playback_id, "barge-in: stopping prompt");
            if let Err(e) = self.ctx.control.stop_playback(playback_id).await {
                warn!(error = %e, "failed to stop playback");
            }
        }

        let residual: Vec<PromptArtifact> = self.prompt_queue.drain(..).collect();
        for artifact in residual {
            self.ctx.prompt_cache.remove(&artifact.path).await;
        }

        if self.state == CallState::PlayingPrompt {
            self.state = CallState::Listening;
        }
    }

    // ------------------------------------------------------------------
    // Voice activity

    async fn schedule_vad_arm(&mut self) {
        if self.vad_armed || self.vad_delay_timer.is_some() {
            return;
        }
        let delay = self.cfg.vad.activation_delay_ms;
        if delay == 0 {
            self.arm_vad().await;
            return;
        }
        let inbox = self.inbox_tx.clone();
        self.vad_delay_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let _ = inbox.send(SessionEvent::ArmVad).await;
        }));
    }

    /// Arm talk detection: pre-buffer the RTP path, enable the switch's
    /// talk-detect feature, and start the no-input timer.
    async fn arm_vad(&mut self) {
        if self.vad_armed || self.finalized {
            return;
        }
        self.vad_armed = true;

        if let Some(rtp) = &self.rtp {
            rtp.start_pre_buffering(self.cfg.rtp.prebuffer_size);
        }

        let thresholds = format!(
            "{},{}",
            self.cfg.vad.silence_threshold_ms, self.cfg.vad.speech_threshold_ms
        );
        if let Err(e) = self
            .ctx
            .control
            .set_variable(&self.channel_id, "TALK_DETECT(set)", &thresholds)
            .await
        {
            warn!(error = %e, "failed to enable talk detection");
        }

        if self.cfg.timeouts.no_input_ms > 0 {
            self.no_input_timer =
                Some(self.start_timer(TimeoutKind::NoInput, self.cfg.timeouts.no_input_ms));
        }

        info!(thresholds = %thresholds, "talk detection armed");
    }

    /// Voice onset: one-shot. Performs barge-in, flushes the pre-buffer into
    /// a fresh recognizer session, and routes live frames after it.
    async fn on_voice_start(&mut self) {
        if !self.vad_armed || self.input_mode != InputMode::Idle {
            return;
        }
        self.input_mode = InputMode::Voice;
        abort_timer(&mut self.no_input_timer);

        self.barge_in_prompt().await;

        // Register the live sink before flushing so no frame can slip
        // between the flushed bytes and the live stream.
        let (live_tx, mut live_rx) = mpsc::channel(LIVE_FRAME_DEPTH);
        let flushed = match &self.rtp {
            Some(rtp) => {
                rtp.subscribe_live(live_tx);
                rtp.stop_pre_buffering_and_flush()
            }
            None => Vec::new(),
        };
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = live_rx.recv().await {
                if inbox.send(SessionEvent::Rtp(RtpEvent::Frame(frame))).await.is_err() {
                    break;
                }
            }
        });

        match self.ctx.recognizer.start().await {
            Ok(session) => {
                let mut events = session.events;
                let inbox = self.inbox_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if inbox.send(SessionEvent::Recognizer(event)).await.is_err() {
                            break;
                        }
                    }
                });

                if !flushed.is_empty() {
                    self.stt_ulaw.extend_from_slice(&flushed);
                    if let Err(e) = session.stream.write(ulaw_to_pcm(&flushed)).await {
                        warn!(error = %e, "failed to write pre-buffer to recognizer");
                    }
                }
                self.recognizer_stream = Some(session.stream);
                self.state = CallState::Recognizing;
                info!(prebuffered_bytes = flushed.len(), "recognition started");
            }
            Err(e) => {
                error!(error = %e, "recognizer failed to open; resolving with empty transcript");
                self.transcript.clear();
                self.finalize(RecognitionMode::Voice).await;
            }
        }
    }

    async fn on_voice_end(&mut self, duration_ms: i64) {
        if self.input_mode != InputMode::Voice {
            return;
        }
        info!(duration_ms, "voice ended; draining recognizer");
        if let Some(stream) = &self.recognizer_stream {
            stream.stop().await;
        }
    }

    async fn on_live_frame(&mut self, ulaw: Vec<u8>) {
        if self.input_mode != InputMode::Voice {
            return;
        }
        if let Some(stream) = &self.recognizer_stream {
            // Raw µ-law is retained for the post-call recording; the
            // recognizer gets the linear PCM conversion.
            self.stt_ulaw.extend_from_slice(&ulaw);
            if let Err(e) = stream.write(ulaw_to_pcm(&ulaw)).await {
                debug!(error = %e, "live frame write failed");
            }
        }
    }

    async fn handle_recognizer(&mut self, event: RecognizerEvent) {
        if self.discard_recognizer {
            debug!("dropping recognizer event after keypad preemption");
            return;
        }
        match event {
            RecognizerEvent::Ready => debug!("recognizer accepted the stream"),
            RecognizerEvent::Partial(text) => debug!(partial = %text, "hypothesis"),
            RecognizerEvent::Ended(text) => {
                self.recognizer_stream = None;
                self.transcript = text;
                self.finalize(RecognitionMode::Voice).await;
            }
            RecognizerEvent::Error(e) => {
                warn!(error = %e, "recognition failed; resolving with empty transcript");
                self.recognizer_stream = None;
                self.transcript.clear();
                self.finalize(RecognitionMode::Voice).await;
            }
        }
    }

    // ------------------------------------------------------------------
    // Keypad

    async fn on_dtmf(&mut self, digit: String) {
        if !self.cfg.dtmf.enabled || self.finalized {
            return;
        }

        if self.input_mode != InputMode::Keypad {
            // First digit preempts the voice path entirely.
            self.input_mode = InputMode::Keypad;
            abort_timer(&mut self.no_input_timer);
            abort_timer(&mut self.vad_delay_timer);

            if let Some(stream) = self.recognizer_stream.take() {
                self.discard_recognizer = true;
                stream.stop().await;
            }
            self.barge_in_prompt().await;
            self.state = CallState::Recognizing;
            info!("keypad input preempting voice path");
        }

        self.keypad_buffer.push_str(&digit);
        debug!(digits = %self.keypad_buffer, "keypad digit");

        // Each digit restarts the completion window.
        abort_timer(&mut self.keypad_timer);
        self.keypad_timer = Some(self.start_timer(
            TimeoutKind::KeypadComplete,
            self.cfg.timeouts.dtmf_completion_ms,
        ));
    }

    // ------------------------------------------------------------------
    // Timers

    fn start_timer(&self, kind: TimeoutKind, ms: u64) -> JoinHandle<()> {
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let _ = inbox.send(SessionEvent::Timer(kind)).await;
        })
    }

    async fn on_timer(&mut self, kind: TimeoutKind) {
        if self.finalized {
            return;
        }
        match kind {
            TimeoutKind::Session => {
                warn!("session timeout; hanging up");
                self.finalize(RecognitionMode::Timeout).await;
            }
            TimeoutKind::NoInput => {
                if self.input_mode == InputMode::Idle {
                    info!("no input before timeout; hanging up");
                    self.finalize(RecognitionMode::NoInput).await;
                }
            }
            TimeoutKind::KeypadComplete => {
                if self.input_mode == InputMode::Keypad {
                    self.finalize(RecognitionMode::Dtmf).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Outcome

    /// Write the outcome back to the switch and persist the interaction.
    /// Runs at most once per session.
    async fn finalize(&mut self, mode: RecognitionMode) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.state = CallState::Finalizing;

        abort_timer(&mut self.no_input_timer);
        abort_timer(&mut self.keypad_timer);
        abort_timer(&mut self.vad_delay_timer);

        // Keypad-only calls produce no speech capture worth saving.
        if mode == RecognitionMode::Voice && !self.stt_ulaw.is_empty() {
            let pcm = ulaw_to_pcm(&self.stt_ulaw);
            match self
                .ctx
                .recordings
                .write(RecordingKind::Stt, &self.channel_id, &self.caller_id, &pcm)
                .await
            {
                Ok(path) => self.stt_recording_path = path.display().to_string(),
                Err(e) => warn!(error = %e, "failed to save caller recording"),
            }
        }

        match mode {
            RecognitionMode::Voice => {
                self.set_variable_logged("TRANSCRIPT", &self.transcript.clone()).await;
                self.set_variable_logged("RECOGNITION_MODE", mode.as_str()).await;
            }
            RecognitionMode::Dtmf => {
                self.set_variable_logged("DTMF_RESULT", &self.keypad_buffer.clone()).await;
                self.set_variable_logged("RECOGNITION_MODE", mode.as_str()).await;
            }
            RecognitionMode::NoInput | RecognitionMode::Error => {
                self.set_variable_logged("RECOGNITION_MODE", mode.as_str()).await;
            }
            RecognitionMode::Timeout => {
                // The channel is about to be torn down; nothing to report.
            }
        }

        self.persist_interaction(mode);

        match mode {
            RecognitionMode::Voice | RecognitionMode::Dtmf | RecognitionMode::Error => {
                if let Err(e) = self.ctx.control.continue_in_dialplan(&self.channel_id).await {
                    warn!(error = %e, "failed to continue dialplan");
                }
            }
            RecognitionMode::NoInput | RecognitionMode::Timeout => {
                if let Err(e) = self.ctx.control.hangup(&self.channel_id).await {
                    warn!(error = %e, "failed to hang up");
                }
            }
        }

        info!(outcome = %mode, transcript = %self.transcript, "call finalized");
    }

    async fn set_variable_logged(&self, name: &str, value: &str) {
        if let Err(e) = self
            .ctx
            .control
            .set_variable(&self.channel_id, name, value)
            .await
        {
            warn!(var = name, error = %e, "failed to write result variable");
        }
    }

    /// Fire-and-forget: a store failure must never affect the call.
    fn persist_interaction(&self, mode: RecognitionMode) {
        let record = InteractionRecord {
            unique_id: self.channel_id.clone(),
            caller_id: self.caller_id.clone(),
            text_to_synthesize: self.text_to_speak.clone(),
            synthesized_audio_path: self.tts_recording_path.clone(),
            stt_audio_path: self.stt_recording_path.clone(),
            recognition_mode: mode.as_str().to_string(),
            transcript: self.transcript.clone(),
            keypad_digits: self.keypad_buffer.clone(),
            created_at: chrono::Utc::now(),
        };
        let store = self.ctx.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.record(&record).await {
                warn!(error = %e, "failed to persist interaction record");
            }
        });
    }

    // ------------------------------------------------------------------
    // Teardown

    /// Release every resource. Idempotent: a second invocation finds all
    /// handles already taken and returns immediately.
    async fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        abort_timer(&mut self.session_timer);
        abort_timer(&mut self.no_input_timer);
        abort_timer(&mut self.keypad_timer);
        abort_timer(&mut self.vad_delay_timer);

        if let Some(stream) = self.recognizer_stream.take() {
            stream.stop().await;
        }

        if let Some((_, Some(path))) = self.current_playback.take() {
            self.ctx.prompt_cache.remove(&path).await;
        }
        let residual: Vec<PromptArtifact> = self.prompt_queue.drain(..).collect();
        for artifact in residual {
            self.ctx.prompt_cache.remove(&artifact.path).await;
        }

        for channel in [self.snoop_channel.take(), self.extmedia_channel.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.ctx.control.hangup(&channel).await {
                debug!(channel_id = %channel, error = %e, "internal channel hangup failed");
            }
        }

        for bridge in [self.snoop_bridge.take(), self.user_bridge.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.ctx.control.destroy_bridge(&bridge).await {
                debug!(bridge_id = %bridge, error = %e, "bridge destroy failed");
            }
        }

        if let Some(rtp) = self.rtp.take() {
            rtp.close();
        }

        self.state = CallState::Terminated;
        info!("session resources released");
    }

    // ------------------------------------------------------------------
    // Event loop body

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Call(call) => match call {
                CallEvent::TalkingStarted => self.on_voice_start().await,
                CallEvent::TalkingFinished { duration_ms } => self.on_voice_end(duration_ms).await,
                CallEvent::DtmfReceived { digit } => self.on_dtmf(digit).await,
                CallEvent::PlaybackFinished { playback_id } => {
                    self.handle_playback_signal(&playback_id, false).await
                }
                CallEvent::PlaybackFailed { playback_id } => {
                    self.handle_playback_signal(&playback_id, true).await
                }
                CallEvent::ChannelLeft => unreachable!("handled by the run loop"),
            },
            SessionEvent::Rtp(rtp) => match rtp {
                RtpEvent::Listening(addr) => debug!(%addr, "rtp receiver listening"),
                RtpEvent::Frame(ulaw) => self.on_live_frame(ulaw).await,
                RtpEvent::SocketError(e) => {
                    error!(error = %e, "rtp socket failed");
                    self.finalize(RecognitionMode::Error).await;
                }
            },
            SessionEvent::Recognizer(event) => self.handle_recognizer(event).await,
            SessionEvent::Synthesis(event) => self.handle_synthesis(event).await,
            SessionEvent::Timer(kind) => self.on_timer(kind).await,
            SessionEvent::ArmVad => {
                self.vad_delay_timer = None;
                self.arm_vad().await;
            }
        }
    }

    fn mint_playback_id(&self) -> String {
        format!("{}:{}", self.channel_id, Uuid::new_v4().simple())
    }
}

fn abort_timer(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}
