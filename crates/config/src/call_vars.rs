//! Per-call configuration merge
//!
//! The dialplan can override most process settings for a single call by
//! setting `APP_VAR_*` channel variables before handing the channel over.
//! Overrides are applied to a deep clone of the process defaults through a
//! declarative name → field mapping; unknown keys are logged and ignored,
//! unparsable values are logged and dropped.

use crate::settings::{PromptMode, Settings, VadActivationMode};
use std::collections::HashMap;
use tracing::warn;

/// The immutable configuration one call runs under.
pub type EffectiveConfig = Settings;

const APP_VAR_PREFIX: &str = "APP_VAR_";

/// Build an [`EffectiveConfig`] from process defaults plus script variables.
pub fn apply_script_overrides(
    defaults: &Settings,
    vars: &HashMap<String, String>,
) -> EffectiveConfig {
    let mut cfg = defaults.clone();

    for (key, value) in vars {
        let Some(name) = key.strip_prefix(APP_VAR_PREFIX) else {
            // Not an override (TEXT_TO_SPEAK and friends travel in the same map).
            continue;
        };
        apply_one(&mut cfg, name, value);
    }

    cfg
}

fn apply_one(cfg: &mut Settings, name: &str, value: &str) {
    match name {
        "ARI_URL" => cfg.ari.url = value.to_string(),
        "ARI_USERNAME" => cfg.ari.username = value.to_string(),
        "ARI_PASSWORD" => cfg.ari.password = value.to_string(),
        "ARI_APP_NAME" => cfg.ari.app_name = value.to_string(),
        "AZURE_SPEECH_SUBSCRIPTION_KEY" => cfg.azure.subscription_key = value.to_string(),
        "AZURE_SPEECH_REGION" => cfg.azure.region = value.to_string(),
        "AZURE_TTS_LANGUAGE" => cfg.azure.tts_language = value.to_string(),
        "AZURE_TTS_VOICE_NAME" => cfg.azure.tts_voice_name = value.to_string(),
        "AZURE_TTS_OUTPUT_FORMAT" => cfg.azure.tts_output_format = value.to_string(),
        "AZURE_STT_LANGUAGE" => cfg.azure.stt_language = value.to_string(),
        "VAD_ACTIVATION_MODE" => {
            if let Some(mode) = parse_enum::<VadActivationMode>(name, value) {
                cfg.vad.activation_mode = mode;
            }
        }
        "VAD_ACTIVATION_DELAY_MS" => {
            if let Some(v) = parse_int::<u64>(name, value) {
                cfg.vad.activation_delay_ms = v;
            }
        }
        "TALK_DETECT_SILENCE_THRESHOLD" => {
            if let Some(v) = parse_int::<u32>(name, value) {
                cfg.vad.silence_threshold_ms = v;
            }
        }
        "TALK_DETECT_SPEECH_THRESHOLD" => {
            if let Some(v) = parse_int::<u32>(name, value) {
                cfg.vad.speech_threshold_ms = v;
            }
        }
        "PROMPT_MODE" => {
            if let Some(mode) = parse_enum::<PromptMode>(name, value) {
                cfg.prompt.mode = mode;
            }
        }
        "PLAYBACK_FILE_PATH" => cfg.prompt.playback_file_path = value.to_string(),
        "ARI_SESSION_TIMEOUT_MS" => {
            if let Some(v) = parse_int::<u64>(name, value) {
                cfg.timeouts.session_ms = v;
            }
        }
        "NO_INPUT_TIMEOUT_MS" => {
            if let Some(v) = parse_int::<u64>(name, value) {
                cfg.timeouts.no_input_ms = v;
            }
        }
        "DTMF_COMPLETION_TIMEOUT_MS" => {
            if let Some(v) = parse_int::<u64>(name, value) {
                cfg.timeouts.dtmf_completion_ms = v;
            }
        }
        "RTP_PREBUFFER_SIZE" => {
            if let Some(v) = parse_int::<usize>(name, value) {
                cfg.rtp.prebuffer_size = v;
            }
        }
        "ENABLE_DTMF" => {
            if let Some(v) = parse_bool(name, value) {
                cfg.dtmf.enabled = v;
            }
        }
        "EXTERNAL_MEDIA_SERVER_IP" => cfg.rtp.external_media_ip = value.to_string(),
        "EXTERNAL_MEDIA_SERVER_PORT" => {
            if let Some(v) = parse_int::<u16>(name, value) {
                cfg.rtp.external_media_port = v;
            }
        }
        "EXTERNAL_MEDIA_AUDIO_FORMAT" => cfg.rtp.audio_format = value.to_string(),
        "LOG_LEVEL" => cfg.observability.log_level = value.to_string(),
        unknown => {
            warn!(var = %unknown, "ignoring unknown APP_VAR_ override");
        }
    }
}

fn parse_int<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = %name, value = %value, "dropping unparsable integer override");
            None
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            warn!(var = %name, value = %value, "dropping unparsable boolean override");
            None
        }
    }
}

fn parse_enum<T>(name: &str, value: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(var = %name, value = %value, error = %e, "dropping unparsable override");
            None
        }
    }
}
