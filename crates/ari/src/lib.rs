//! Asterisk REST Interface (ARI) client
//!
//! REST operations plus the application event WebSocket, reduced to the
//! typed [`AriEvent`] set. [`AriClient`] implements the core `CallControl`
//! trait, which is the only surface the session orchestrator sees.

mod client;
mod events;
mod models;
mod ws;

pub use client::AriClient;
pub use events::AriEvent;
pub use models::{Bridge, CallerId, Channel, Playback};
pub use ws::connect_events;
