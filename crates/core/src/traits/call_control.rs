//! Call-control contract
//!
//! The abstract surface of the telephony switch as the orchestrator sees it.
//! Channels, bridges and playbacks are referred to by their switch-assigned
//! string ids; the concrete REST client lives in its own crate.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Operations the orchestrator invokes on the switch.
///
/// Every method may suspend; failures map to [`crate::GatewayError::SwitchIo`].
#[async_trait]
pub trait CallControl: Send + Sync {
    async fn answer(&self, channel_id: &str) -> Result<()>;

    async fn hangup(&self, channel_id: &str) -> Result<()>;

    /// Read one channel variable; `Ok(None)` when the variable is unset.
    async fn get_variable(&self, channel_id: &str, name: &str) -> Result<Option<String>>;

    /// Bulk variable read. Not every switch version supports this; callers
    /// fall back to per-name [`CallControl::get_variable`] on failure.
    async fn get_all_variables(&self, channel_id: &str) -> Result<HashMap<String, String>>;

    async fn set_variable(&self, channel_id: &str, name: &str, value: &str) -> Result<()>;

    /// Hand the channel back to the dialplan.
    async fn continue_in_dialplan(&self, channel_id: &str) -> Result<()>;

    /// Create a mixing bridge, returning its id.
    async fn create_bridge(&self) -> Result<String>;

    async fn add_channel_to_bridge(&self, bridge_id: &str, channel_id: &str) -> Result<()>;

    async fn destroy_bridge(&self, bridge_id: &str) -> Result<()>;

    /// Create a snoop channel on `channel_id`, returning the snoop channel id.
    /// `spy` selects the tapped direction; `app_args` is delivered back with
    /// the snoop channel's own entry event.
    async fn create_snoop_channel(
        &self,
        channel_id: &str,
        spy: &str,
        app_args: &str,
    ) -> Result<String>;

    /// Create an external media channel whose far end is `host:port`,
    /// returning the channel id.
    async fn create_external_media_channel(
        &self,
        host: &str,
        port: u16,
        format: &str,
        app_args: &str,
    ) -> Result<String>;

    /// Start playback of `media_ref` on a bridge under the caller-supplied
    /// `playback_id`, so it can be stopped by id later.
    async fn play_on_bridge(
        &self,
        bridge_id: &str,
        media_ref: &str,
        playback_id: &str,
    ) -> Result<()>;

    /// Stop an in-flight playback by id.
    async fn stop_playback(&self, playback_id: &str) -> Result<()>;
}
