//! Session registry and event dispatch
//!
//! Maps channel ids to session inboxes. The dispatcher runs on the process
//! event loop: it spawns sessions for fresh channels, acknowledges and
//! ignores the channels the gateway itself created, and routes everything
//! else to the owning inbox.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use voice_gateway_ari::AriEvent;

use crate::call::CallSession;
use crate::context::SessionContext;
use crate::event::{CallEvent, SessionEvent};

/// Marker app-argument set on snoop and external media channels at creation
/// time, so their own entry events can be told apart from real callers.
pub const INTERNAL_CHANNEL_ARG: &str = "internal";

/// Channel id → session inbox.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, mpsc::Sender<SessionEvent>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel_id: String, inbox: mpsc::Sender<SessionEvent>) {
        self.sessions.write().insert(channel_id, inbox);
    }

    pub fn remove(&self, channel_id: &str) -> Option<mpsc::Sender<SessionEvent>> {
        self.sessions.write().remove(channel_id)
    }

    pub fn get(&self, channel_id: &str) -> Option<mpsc::Sender<SessionEvent>> {
        self.sessions.read().get(channel_id).cloned()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    async fn route(&self, channel_id: &str, event: SessionEvent) {
        match self.get(channel_id) {
            Some(inbox) => {
                if inbox.send(event).await.is_err() {
                    debug!(channel_id, "session inbox closed; dropping event");
                }
            }
            None => debug!(channel_id, "no session for event; dropping"),
        }
    }
}

/// Process one switch event.
pub async fn dispatch_event(
    registry: &Arc<SessionRegistry>,
    ctx: &SessionContext,
    event: AriEvent,
) {
    match event {
        AriEvent::StasisStart { channel, args } => {
            if args.iter().any(|a| a == INTERNAL_CHANNEL_ARG) {
                // Snoop or external media channel the gateway created: it
                // must be answered, then plays no part in dispatch.
                if let Err(e) = ctx.control.answer(&channel.id).await {
                    warn!(channel_id = %channel.id, error = %e, "failed to answer internal channel");
                }
                return;
            }

            info!(
                channel_id = %channel.id,
                caller = %channel.caller.number,
                active = registry.count() + 1,
                "channel entered application"
            );
            let inbox = CallSession::spawn(ctx.clone(), channel.clone());
            registry.insert(channel.id, inbox);
        }

        AriEvent::StasisEnd { channel } => {
            if let Some(inbox) = registry.remove(&channel.id) {
                let _ = inbox.send(SessionEvent::Call(CallEvent::ChannelLeft)).await;
            }
        }

        AriEvent::ChannelTalkingStarted { channel } => {
            registry
                .route(&channel.id, SessionEvent::Call(CallEvent::TalkingStarted))
                .await;
        }

        AriEvent::ChannelTalkingFinished { channel, duration } => {
            registry
                .route(
                    &channel.id,
                    SessionEvent::Call(CallEvent::TalkingFinished {
                        duration_ms: duration,
                    }),
                )
                .await;
        }

        AriEvent::ChannelDtmfReceived { channel, digit } => {
            registry
                .route(&channel.id, SessionEvent::Call(CallEvent::DtmfReceived { digit }))
                .await;
        }

        AriEvent::PlaybackFinished { playback } => {
            if let Some(channel_id) = owner_of_playback(&playback.id) {
                registry
                    .route(
                        channel_id,
                        SessionEvent::Call(CallEvent::PlaybackFinished {
                            playback_id: playback.id.clone(),
                        }),
                    )
                    .await;
            }
        }

        AriEvent::PlaybackFailed { playback } => {
            if let Some(channel_id) = owner_of_playback(&playback.id) {
                registry
                    .route(
                        channel_id,
                        SessionEvent::Call(CallEvent::PlaybackFailed {
                            playback_id: playback.id.clone(),
                        }),
                    )
                    .await;
            }
        }

        AriEvent::Unknown => {}
    }
}

/// Sessions mint playback ids as `<channel_id>:<uuid>`, so playback events
/// (which carry no channel) can be routed without shared bookkeeping.
fn owner_of_playback(playback_id: &str) -> Option<&str> {
    playback_id.split_once(':').map(|(channel_id, _)| channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_of_playback() {
        assert_eq!(
            owner_of_playback("1700000000.42:5f3a"),
            Some("1700000000.42")
        );
        assert_eq!(owner_of_playback("no-separator"), None);
    }

    #[tokio::test]
    async fn test_registry_insert_get_remove() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.insert("c1".into(), tx);
        assert!(registry.get("c1").is_some());
        assert_eq!(registry.count(), 1);
        assert!(registry.remove("c1").is_some());
        assert!(registry.get("c1").is_none());
    }
}
