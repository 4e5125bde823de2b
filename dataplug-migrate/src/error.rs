//! Error types for schema migration.

use dataplug_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A `:VERSION` marker whose number does not parse.
    #[error("Invalid version marker in {resource} line {line}: {text:?}")]
    Parse {
        resource: String,
        line: usize,
        text: String,
    },

    /// A script batch failed; the store stays at the last fully applied
    /// version.
    #[error("Migration of {store} to version {version} failed: {source}")]
    Execution {
        store: String,
        version: i64,
        sql: String,
        #[source]
        source: EngineError,
    },

    #[error("Script resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid script name pattern: {0}")]
    Pattern(#[from] regex_lite::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MigrationResult<T> = Result<T, MigrationError>;
