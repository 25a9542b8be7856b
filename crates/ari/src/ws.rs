//! ARI application event WebSocket
//!
//! Connects once at startup and pumps typed events into an mpsc channel.
//! Closure of the socket ends the channel, which the binary treats as a
//! fatal condition.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use voice_gateway_config::AriConfig;
use voice_gateway_core::{GatewayError, Result};

use crate::events::AriEvent;

const EVENT_CHANNEL_DEPTH: usize = 512;

/// Derive the events WebSocket URL from the REST base URL.
fn events_url(config: &AriConfig) -> String {
    let ws_base = if let Some(rest) = config.url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = config.url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        config.url.clone()
    };
    format!(
        "{ws_base}/events?api_key={}:{}&app={}&subscribeAll=true",
        config.username, config.password, config.app_name
    )
}

/// Connect the application event stream.
///
/// Returns a receiver of typed events; the pump task ends (closing the
/// receiver) when the switch closes the socket.
pub async fn connect_events(config: &AriConfig) -> Result<mpsc::Receiver<AriEvent>> {
    let url = events_url(config);
    let (ws, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| GatewayError::SwitchIo(format!("event websocket connect: {e}")))?;

    info!(app = %config.app_name, "call-control event stream connected");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
    tokio::spawn(async move {
        let (_write, mut read) = ws.split();
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(raw)) => match serde_json::from_str::<AriEvent>(&raw) {
                    Ok(AriEvent::Unknown) => debug!("ignoring unconsumed event type"),
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "undecodable event payload"),
                },
                Ok(Message::Close(frame)) => {
                    warn!(?frame, "event websocket closed by switch");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "event websocket failed");
                    break;
                }
            }
        }
    });

    Ok(rx)
}
