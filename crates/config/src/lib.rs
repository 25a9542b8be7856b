//! Configuration for the voice gateway
//!
//! Process settings are layered from files and environment variables; each
//! call then gets its own [`EffectiveConfig`] by cloning the process defaults
//! and applying the `APP_VAR_*` overrides the dialplan passed on the channel.

mod call_vars;
mod settings;

pub use call_vars::{apply_script_overrides, EffectiveConfig};
pub use settings::{
    load_settings, AriConfig, AzureConfig, ConfigError, DtmfConfig, ObservabilityConfig,
    PersistenceConfig, PromptConfig, PromptMode, RtpConfig, Settings, TimeoutConfig,
    VadActivationMode, VadConfig,
};
