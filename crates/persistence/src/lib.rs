//! Interaction record persistence
//!
//! One row per completed call. The store is a pluggable trait with an
//! in-memory default and a ScyllaDB backend for durable deployments; the
//! orchestrator writes fire-and-forget, so a store failure never affects the
//! call itself.

mod client;
mod error;
mod interactions;
mod schema;

pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use interactions::{
    InMemoryInteractionStore, InteractionRecord, InteractionStore, ScyllaInteractionStore,
};

use std::sync::Arc;

/// Connect to ScyllaDB, ensure the schema, and return the durable store.
pub async fn init(config: ScyllaConfig) -> Result<ScyllaInteractionStore, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok(ScyllaInteractionStore::new(Arc::new(client)))
}
