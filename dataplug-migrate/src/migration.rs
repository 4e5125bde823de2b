//! Applies pending script versions to one logical store.

use crate::discovery::resolve_pending;
use crate::error::{MigrationError, MigrationResult};
use crate::source::ScriptSource;
use dataplug_engine::{DbValue, MIGRATIONS_TABLE, MigrationDialect, NativeConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const CREATE_MIGRATIONS_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS migrations (name VARCHAR(100), version INTEGER);";
const INSERT_VERSION: &str = "INSERT INTO migrations (name, version) VALUES (?, ?)";
const UPDATE_VERSION: &str = "UPDATE migrations SET version = ? WHERE name = ?";

/// Version of the metadata table layout itself.
const METADATA_VERSION: i64 = 1;

/// Outcome of one [`Migration::update`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub store: String,
    pub from: i64,
    pub to: i64,
    /// Versions applied during this run, ascending.
    pub applied: Vec<i64>,
}

impl MigrationReport {
    pub fn is_up_to_date(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Migration engine for one store on one connection.
pub struct Migration<'a> {
    conn: &'a mut dyn NativeConnection,
    scripts: &'a dyn ScriptSource,
    store: String,
    dialect: Box<dyn MigrationDialect>,
}

impl<'a> Migration<'a> {
    /// Bind to a store, creating the shared metadata table on first use.
    pub fn initialize(
        conn: &'a mut dyn NativeConnection,
        scripts: &'a dyn ScriptSource,
        store: impl Into<String>,
        dialect: Box<dyn MigrationDialect>,
    ) -> MigrationResult<Self> {
        let mut migration = Self {
            conn,
            scripts,
            store: store.into(),
            dialect,
        };
        migration.bootstrap()?;
        Ok(migration)
    }

    pub fn store(&self) -> &str {
        &self.store
    }

    fn bootstrap(&mut self) -> MigrationResult<()> {
        if self.dialect.find_version(self.conn, MIGRATIONS_TABLE) > 0 {
            return Ok(());
        }
        info!(dialect = self.dialect.name(), "Creating migrations table");
        self.conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;
        write_version(self.conn, MIGRATIONS_TABLE, METADATA_VERSION)?;
        Ok(())
    }

    /// Applied version of the store, 0 when unversioned.
    pub fn version(&mut self) -> i64 {
        self.dialect.find_version(self.conn, &self.store)
    }

    /// Record `version` as applied, inserting the row if needed.
    pub fn set_version(&mut self, version: i64) -> MigrationResult<()> {
        write_version(self.conn, &self.store, version)?;
        Ok(())
    }

    /// Apply every pending version in ascending order.
    ///
    /// The recorded version advances after each fully applied version. The
    /// first failing batch stops the run; batches of that version that
    /// already ran are not undone.
    pub fn update(&mut self) -> MigrationResult<MigrationReport> {
        let from = self.version();
        let pending = resolve_pending(self.scripts, &self.store, from)?;

        let mut report = MigrationReport {
            store: self.store.clone(),
            from,
            to: from,
            applied: Vec::new(),
        };

        let Some(target) = pending.keys().next_back().copied() else {
            info!(store = %self.store, version = from, "Store is up to date, no migrations to apply");
            return Ok(report);
        };

        info!(
            store = %self.store,
            from,
            to = target,
            "Upgrading store, this may take a while; do not interrupt"
        );
        self.conn.set_command_timeout(None)?;

        for (version, batches) in pending {
            for sql in &batches {
                if let Err(e) = self.conn.execute_batch(sql) {
                    error!(store = %self.store, version, sql = %sql, error = %e, "Migration batch failed");
                    if let Err(rb) = self.conn.execute_batch("ROLLBACK;") {
                        debug!(store = %self.store, error = %rb, "Rollback after failed batch did not apply");
                    }
                    return Err(MigrationError::Execution {
                        store: self.store.clone(),
                        version,
                        sql: sql.clone(),
                        source: e,
                    });
                }
            }
            write_version(self.conn, &self.store, version)?;
            info!(store = %self.store, version, batches = batches.len(), "Applied migration");
            report.applied.push(version);
            report.to = version;
        }

        Ok(report)
    }
}

fn write_version(conn: &mut dyn NativeConnection, name: &str, version: i64) -> MigrationResult<()> {
    let updated = conn.execute(
        UPDATE_VERSION,
        &[DbValue::Int(version), DbValue::Text(name.to_string())],
    )?;
    if updated == 0 {
        conn.execute(
            INSERT_VERSION,
            &[DbValue::Text(name.to_string()), DbValue::Int(version)],
        )?;
    }
    Ok(())
}
