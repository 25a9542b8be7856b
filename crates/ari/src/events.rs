//! Typed ARI application events
//!
//! Only the events the gateway consumes are modeled; everything else lands
//! in [`AriEvent::Unknown`] and is dropped by the dispatcher with a debug log.

use serde::Deserialize;

use crate::models::{Channel, Playback};

/// Events delivered on the application WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AriEvent {
    /// A channel entered the application. `args` carries the dialplan
    /// arguments; internally created channels are marked there.
    StasisStart {
        channel: Channel,
        #[serde(default)]
        args: Vec<String>,
    },

    /// A channel left the application.
    StasisEnd { channel: Channel },

    /// Talk detect: voice activity began.
    ChannelTalkingStarted { channel: Channel },

    /// Talk detect: voice activity ended after `duration` ms.
    ChannelTalkingFinished {
        channel: Channel,
        #[serde(default)]
        duration: i64,
    },

    /// A keypad digit arrived in-band.
    ChannelDtmfReceived { channel: Channel, digit: String },

    PlaybackFinished { playback: Playback },

    PlaybackFailed { playback: Playback },

    /// Any event type the gateway does not consume.
    #[serde(other)]
    Unknown,
}

impl AriEvent {
    /// The channel id this event concerns, if any. Used by the dispatcher to
    /// route into the owning session's inbox.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            AriEvent::StasisStart { channel, .. }
            | AriEvent::StasisEnd { channel }
            | AriEvent::ChannelTalkingStarted { channel }
            | AriEvent::ChannelTalkingFinished { channel, .. }
            | AriEvent::ChannelDtmfReceived { channel, .. } => Some(&channel.id),
            AriEvent::PlaybackFinished { .. }
            | AriEvent::PlaybackFailed { .. }
            | AriEvent::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stasis_start_with_args() {
        let json = r#"{"type":"StasisStart","args":["internal"],"channel":{"id":"snoop-1"}}"#;
        match serde_json::from_str::<AriEvent>(json).unwrap() {
            AriEvent::StasisStart { channel, args } => {
                assert_eq!(channel.id, "snoop-1");
                assert_eq!(args, vec!["internal"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dtmf_event() {
        let json = r#"{"type":"ChannelDtmfReceived","digit":"5","channel":{"id":"c1"}}"#;
        match serde_json::from_str::<AriEvent>(json).unwrap() {
            AriEvent::ChannelDtmfReceived { digit, .. } => assert_eq!(digit, "5"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_talking_finished_duration() {
        let json =
            r#"{"type":"ChannelTalkingFinished","duration":1850,"channel":{"id":"c1"}}"#;
        match serde_json::from_str::<AriEvent>(json).unwrap() {
            AriEvent::ChannelTalkingFinished { duration, .. } => assert_eq!(duration, 1850),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type() {
        let json = r#"{"type":"ChannelVarset","variable":"X","value":"1"}"#;
        assert!(matches!(
            serde_json::from_str::<AriEvent>(json).unwrap(),
            AriEvent::Unknown
        ));
    }

    #[test]
    fn test_playback_events_carry_no_channel() {
        let json = r#"{"type":"PlaybackFinished","playback":{"id":"pb-1"}}"#;
        let event = serde_json::from_str::<AriEvent>(json).unwrap();
        assert!(event.channel_id().is_none());
    }
}
