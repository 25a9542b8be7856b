//! Process settings
//!
//! Loaded once at startup. Priority (highest to lowest):
//! 1. Environment variables (`VOICE_GATEWAY` prefix, `__` separator)
//! 2. `config/{env}.yaml` (if an environment name is given)
//! 3. `config/default.yaml`
//! 4. Built-in defaults

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required value: {field}")]
    MissingValue { field: String },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Call-control (ARI) connection
    #[serde(default)]
    pub ari: AriConfig,

    /// Cloud speech service
    #[serde(default)]
    pub azure: AzureConfig,

    /// Voice activity detection
    #[serde(default)]
    pub vad: VadConfig,

    /// Prompt delivery
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Per-call timers
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// RTP capture side
    #[serde(default)]
    pub rtp: RtpConfig,

    /// Keypad input
    #[serde(default)]
    pub dtmf: DtmfConfig,

    /// Logging
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Interaction record store
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Settings {
    /// Validate startup requirements. Credentials must be present before the
    /// gateway connects anywhere; everything else has workable defaults.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ari.url.is_empty() {
            return Err(ConfigError::MissingValue {
                field: "ari.url".into(),
            });
        }
        if self.ari.username.is_empty() || self.ari.password.is_empty() {
            return Err(ConfigError::MissingValue {
                field: "ari.username/ari.password".into(),
            });
        }
        if self.azure.subscription_key.is_empty() {
            return Err(ConfigError::MissingValue {
                field: "azure.subscription_key".into(),
            });
        }
        if self.azure.region.is_empty() {
            return Err(ConfigError::MissingValue {
                field: "azure.region".into(),
            });
        }
        if self.rtp.prebuffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "rtp.prebuffer_size".into(),
                message: "must be at least 1 frame".into(),
            });
        }
        if self.prompt.mode == PromptMode::Playback && self.prompt.playback_file_path.is_empty() {
            return Err(ConfigError::MissingValue {
                field: "prompt.playback_file_path".into(),
            });
        }
        Ok(())
    }
}

/// ARI connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AriConfig {
    /// Base REST URL, e.g. `http://127.0.0.1:8088/ari`
    #[serde(default = "default_ari_url")]
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Stasis application name the gateway registers as.
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_ari_url() -> String {
    "http://127.0.0.1:8088/ari".to_string()
}
fn default_app_name() -> String {
    "voice-gateway".to_string()
}

impl Default for AriConfig {
    fn default() -> Self {
        Self {
            url: default_ari_url(),
            username: String::new(),
            password: String::new(),
            app_name: default_app_name(),
        }
    }
}

/// Azure Cognitive Services Speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default)]
    pub subscription_key: String,

    #[serde(default)]
    pub region: String,

    #[serde(default = "default_tts_language")]
    pub tts_language: String,

    #[serde(default = "default_tts_voice")]
    pub tts_voice_name: String,

    /// Provider output format identifier for synthesis.
    #[serde(default = "default_tts_output_format")]
    pub tts_output_format: String,

    #[serde(default = "default_stt_language")]
    pub stt_language: String,
}

fn default_tts_language() -> String {
    "es-ES".to_string()
}
fn default_tts_voice() -> String {
    "es-ES-ElviraNeural".to_string()
}
fn default_tts_output_format() -> String {
    "raw-8khz-16bit-mono-pcm".to_string()
}
fn default_stt_language() -> String {
    "es-ES".to_string()
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            subscription_key: String::new(),
            region: String::new(),
            tts_language: default_tts_language(),
            tts_voice_name: default_tts_voice(),
            tts_output_format: default_tts_output_format(),
            stt_language: default_stt_language(),
        }
    }
}

/// When the talk detector is armed relative to prompt playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VadActivationMode {
    /// Arm once the first prompt chunk begins (barge-in from the start).
    #[default]
    AfterPromptStart,
    /// Arm only after the last prompt chunk finished playing.
    AfterPromptEnd,
}

impl std::str::FromStr for VadActivationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "after_prompt_start" => Ok(Self::AfterPromptStart),
            "after_prompt_end" => Ok(Self::AfterPromptEnd),
            other => Err(format!("unknown vad activation mode '{other}'")),
        }
    }
}

/// Voice activity detection settings.
///
/// The thresholds are handed to the switch's talk-detect feature in the
/// positional `"<silence>,<speech>"` form. Some switch builds also accept a
/// keyed form; the gateway only ever emits the positional one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default)]
    pub activation_mode: VadActivationMode,

    /// Delay between the arming trigger and talk-detect actually enabling.
    #[serde(default)]
    pub activation_delay_ms: u64,

    /// Milliseconds of silence before voice-end fires.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold_ms: u32,

    /// Minimum milliseconds of energy before voice-start fires.
    #[serde(default = "default_speech_threshold")]
    pub speech_threshold_ms: u32,
}

fn default_silence_threshold() -> u32 {
    1200
}
fn default_speech_threshold() -> u32 {
    500
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            activation_mode: VadActivationMode::default(),
            activation_delay_ms: 0,
            silence_threshold_ms: default_silence_threshold(),
            speech_threshold_ms: default_speech_threshold(),
        }
    }
}

/// Prompt delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Synthesize `TEXT_TO_SPEAK` chunk by chunk.
    #[default]
    Tts,
    /// Play a pre-recorded file.
    Playback,
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tts" => Ok(Self::Tts),
            "playback" => Ok(Self::Playback),
            other => Err(format!("unknown prompt mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptConfig {
    #[serde(default)]
    pub mode: PromptMode,

    /// Media path for [`PromptMode::Playback`].
    #[serde(default)]
    pub playback_file_path: String,
}

/// Per-call timers, all in milliseconds. Zero disables a timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_session_timeout")]
    pub session_ms: u64,

    #[serde(default = "default_no_input_timeout")]
    pub no_input_ms: u64,

    #[serde(default = "default_dtmf_completion_timeout")]
    pub dtmf_completion_ms: u64,
}

fn default_session_timeout() -> u64 {
    300_000
}
fn default_no_input_timeout() -> u64 {
    10_000
}
fn default_dtmf_completion_timeout() -> u64 {
    2_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            session_ms: default_session_timeout(),
            no_input_ms: default_no_input_timeout(),
            dtmf_completion_ms: default_dtmf_completion_timeout(),
        }
    }
}

/// RTP capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtpConfig {
    /// Address the external media channel is pointed at. Must be reachable
    /// from the switch.
    #[serde(default = "default_external_media_ip")]
    pub external_media_ip: String,

    /// First UDP port probed; each call binds the next free port upward.
    #[serde(default = "default_external_media_port")]
    pub external_media_port: u16,

    /// Wire format requested from the switch.
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Circular pre-buffer capacity in 20 ms frames.
    #[serde(default = "default_prebuffer_size")]
    pub prebuffer_size: usize,
}

fn default_external_media_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_external_media_port() -> u16 {
    10_000
}
fn default_audio_format() -> String {
    "ulaw".to_string()
}
fn default_prebuffer_size() -> usize {
    100
}

impl Default for RtpConfig {
    fn default() -> Self {
        Self {
            external_media_ip: default_external_media_ip(),
            external_media_port: default_external_media_port(),
            audio_format: default_audio_format(),
            prebuffer_size: default_prebuffer_size(),
        }
    }
}

/// Keypad input settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DtmfConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Interaction store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Enable the ScyllaDB store (false = in-memory only).
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_scylla_hosts")]
    pub scylla_hosts: Vec<String>,

    #[serde(default = "default_scylla_keyspace")]
    pub keyspace: String,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: u8,
}

fn default_scylla_hosts() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}
fn default_scylla_keyspace() -> String {
    "voice_gateway".to_string()
}
fn default_replication_factor() -> u8 {
    1
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scylla_hosts: default_scylla_hosts(),
            keyspace: default_scylla_keyspace(),
            replication_factor: default_replication_factor(),
        }
    }
}

/// Load settings from files and environment.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("VOICE_GATEWAY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    Ok(settings)
}
