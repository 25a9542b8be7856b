//! Interaction records
//!
//! One record per call, written after finalization. Pluggable store trait
//! with an in-memory default and a ScyllaDB backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Everything the gateway knows about one completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub unique_id: String,
    pub caller_id: String,
    pub text_to_synthesize: String,
    pub synthesized_audio_path: String,
    pub stt_audio_path: String,
    /// One of VOICE, DTMF, NO_INPUT, TIMEOUT, ERROR.
    pub recognition_mode: String,
    pub transcript: String,
    pub keypad_digits: String,
    pub created_at: DateTime<Utc>,
}

/// Store trait for pluggable backends.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    /// Persist one interaction row.
    async fn record(&self, interaction: &InteractionRecord) -> Result<(), PersistenceError>;
}

/// In-memory store (default). Rows do not survive restarts.
#[derive(Default)]
pub struct InMemoryInteractionStore {
    rows: RwLock<Vec<InteractionRecord>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded rows, oldest first.
    pub fn all(&self) -> Vec<InteractionRecord> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn record(&self, interaction: &InteractionRecord) -> Result<(), PersistenceError> {
        self.rows.write().push(interaction.clone());
        Ok(())
    }
}

/// ScyllaDB-backed store for durable deployments.
pub struct ScyllaInteractionStore {
    client: Arc<ScyllaClient>,
}

impl ScyllaInteractionStore {
    pub fn new(client: Arc<ScyllaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InteractionStore for ScyllaInteractionStore {
    async fn record(&self, interaction: &InteractionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.interactions \
             (unique_id, caller_id, text_to_synthesize, synthesized_audio_path, \
              stt_audio_path, recognition_mode, transcript, keypad_digits, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query(
                query,
                (
                    &interaction.unique_id,
                    &interaction.caller_id,
                    &interaction.text_to_synthesize,
                    &interaction.synthesized_audio_path,
                    &interaction.stt_audio_path,
                    &interaction.recognition_mode,
                    &interaction.transcript,
                    &interaction.keypad_digits,
                    interaction.created_at,
                ),
            )
            .await?;

        tracing::debug!(
            unique_id = %interaction.unique_id,
            mode = %interaction.recognition_mode,
            "interaction persisted"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InteractionRecord {
        InteractionRecord {
            unique_id: "1700000000.42".into(),
            caller_id: "3001".into(),
            text_to_synthesize: "hola".into(),
            synthesized_audio_path: "recordings/tts/x.wav".into(),
            stt_audio_path: "recordings/stt/x.wav".into(),
            recognition_mode: "VOICE".into(),
            transcript: "buenos días".into(),
            keypad_digits: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_store_records() {
        let store = InMemoryInteractionStore::new();
        store.record(&sample()).await.unwrap();
        store.record(&sample()).await.unwrap();

        let rows = store.all();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].transcript, "buenos días");
        assert_eq!(rows[0].recognition_mode, "VOICE");
    }
}
