//! How an engine reads the applied schema version of a store.

use crate::driver::NativeConnection;
use crate::error::EngineResult;
use crate::types::{DbValue, Row};
use tracing::{debug, warn};

/// Shared metadata table holding one `(name, version)` row per store.
pub const MIGRATIONS_TABLE: &str = "migrations";

const SELECT_VERSION: &str =
    "SELECT version FROM migrations WHERE name = ? ORDER BY version DESC";

pub trait MigrationDialect: Send + Sync {
    fn name(&self) -> &str;

    /// Applied version of `store`, or 0 when it cannot be determined.
    fn find_version(&self, conn: &mut dyn NativeConnection, store: &str) -> i64;
}

/// Reads the metadata table directly; any failure (including a missing
/// table) counts as version 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl MigrationDialect for StandardDialect {
    fn name(&self) -> &str {
        "standard"
    }

    fn find_version(&self, conn: &mut dyn NativeConnection, store: &str) -> i64 {
        read_version(conn, store).unwrap_or_else(|e| {
            debug!(store, error = %e, "No migration version recorded");
            0
        })
    }
}

/// Probes `information_schema.tables` before reading, so a missing
/// metadata table never raises an engine error.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogDialect;

impl CatalogDialect {
    fn table_exists(conn: &mut dyn NativeConnection, table: &str) -> EngineResult<bool> {
        let mut count = 0;
        conn.query(
            "SELECT COUNT(*) FROM information_schema.tables WHERE lower(table_name) = lower(?)",
            &[DbValue::Text(table.to_string())],
            true,
            &mut |row: &Row| {
                count = row.get(0).and_then(DbValue::as_i64).unwrap_or(0);
                false
            },
        )?;
        Ok(count > 0)
    }
}

impl MigrationDialect for CatalogDialect {
    fn name(&self) -> &str {
        "catalog"
    }

    fn find_version(&self, conn: &mut dyn NativeConnection, store: &str) -> i64 {
        match Self::table_exists(conn, MIGRATIONS_TABLE) {
            Ok(true) => read_version(conn, store).unwrap_or_else(|e| {
                warn!(store, error = %e, "Failed to read migration version");
                0
            }),
            Ok(false) => 0,
            Err(e) => {
                warn!(store, error = %e, "Failed to probe for the migrations table");
                0
            }
        }
    }
}

/// Highest recorded version for `store`, 0 if it has no row.
pub fn read_version(conn: &mut dyn NativeConnection, store: &str) -> EngineResult<i64> {
    let mut version = 0;
    conn.query(
        SELECT_VERSION,
        &[DbValue::Text(store.to_string())],
        true,
        &mut |row: &Row| {
            version = row.get(0).and_then(DbValue::as_i64).unwrap_or(0);
            false
        },
    )?;
    Ok(version)
}
