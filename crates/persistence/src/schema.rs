//! Schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist.
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

/// Create all required tables.
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let interactions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.interactions (
            unique_id TEXT,
            caller_id TEXT,
            text_to_synthesize TEXT,
            synthesized_audio_path TEXT,
            stt_audio_path TEXT,
            recognition_mode TEXT,
            transcript TEXT,
            keypad_digits TEXT,
            created_at TIMESTAMP,
            PRIMARY KEY (unique_id)
        )
    "#,
        keyspace
    );

    session
        .query(interactions_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create interactions table: {e}")))?;

    Ok(())
}
