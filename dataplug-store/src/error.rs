//! Error types for connection management and prepared commands.

use dataplug_engine::EngineError;
use dataplug_migrate::MigrationError;
use thiserror::Error;

/// All errors surfaced to plugin code.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Parameter arity or declared types do not match the command text.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The error persisted after one reconnect and retry.
    #[error("Connection error after reconnect: {0}")]
    TransientConnection(#[source] EngineError),

    #[error("Internal error: schema for table {table} requested while disconnected")]
    Schema { table: String },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

pub type StoreResult<T> = Result<T, StoreError>;
