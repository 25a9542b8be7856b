//! Persistence error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(#[from] scylla::transport::errors::NewSessionError),

    #[error("query error: {0}")]
    Query(#[from] scylla::transport::errors::QueryError),

    #[error("schema error: {0}")]
    Schema(String),
}
