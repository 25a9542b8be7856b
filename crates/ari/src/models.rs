//! ARI resource DTOs

use serde::{Deserialize, Serialize};

/// Caller identification attached to a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallerId {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
}

/// A channel as reported by the switch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub caller: CallerId,
}

/// A mixing bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bridge {
    pub id: String,
    #[serde(default)]
    pub bridge_type: String,
}

/// An in-flight playback operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playback {
    pub id: String,
    #[serde(default)]
    pub media_uri: String,
    #[serde(default)]
    pub state: String,
}

/// Body of a channel variable read.
#[derive(Debug, Deserialize)]
pub(crate) struct VariableValue {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_deserializes_with_missing_fields() {
        let channel: Channel = serde_json::from_str(r#"{"id":"123.456"}"#).unwrap();
        assert_eq!(channel.id, "123.456");
        assert!(channel.caller.number.is_empty());
    }

    #[test]
    fn test_channel_with_caller() {
        let json = r#"{"id":"1700.1","name":"PJSIP/3001-0001","state":"Ring","caller":{"name":"Alice","number":"3001"}}"#;
        let channel: Channel = serde_json::from_str(json).unwrap();
        assert_eq!(channel.caller.number, "3001");
        assert_eq!(channel.state, "Ring");
    }
}
