//! Error types for engine adapters and native drivers.

use thiserror::Error;

/// All errors raised while talking to a native database driver.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A stored value could not be converted to the requested type.
    #[error("Format error: {0}")]
    Format(String),

    #[error("Invalid connection string: {0}")]
    ConnectionString(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Driver-level failure not covered by a concrete engine error.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl EngineError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
