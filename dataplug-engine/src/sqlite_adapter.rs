//! SQLite engine via rusqlite.
//!
//! Recognised connection-string keys:
//!
//! - `Data Source` (aliases `DataSource`, `Database`, `URI` with an optional
//!   `file:` prefix): database path or `:memory:`
//! - `Cache Size`: prepared statement cache capacity (default 32)
//! - `Busy Timeout`: milliseconds to wait on a locked database
//! - `Foreign Keys`: enable foreign key enforcement

use crate::adapter::{EngineAdapter, native_type_for_type_name};
use crate::codec::parse_bool_text;
use crate::conn_string::ConnectionString;
use crate::driver::NativeConnection;
use crate::error::{EngineError, EngineResult};
use crate::schema::{ColumnSchema, TableSchema};
use crate::types::{DbValue, NativeType, Row};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, ErrorCode, params_from_iter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CACHE_SIZE: usize = 32;

/// Settings parsed from a SQLite connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteSettings {
    pub path: String,
    pub cache_size: usize,
    pub busy_timeout: Option<Duration>,
    pub foreign_keys: Option<bool>,
}

impl SqliteSettings {
    pub fn from_connection_string(conn_str: &str) -> EngineResult<Self> {
        let cs = ConnectionString::parse(conn_str);
        let path = cs
            .get(&["Data Source", "Database", "URI"])
            .map(|p| p.strip_prefix("file:").unwrap_or(p).to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                EngineError::ConnectionString(format!("missing Data Source in {conn_str:?}"))
            })?;
        let cache_size = match cs.get(&["Cache Size"]) {
            Some(v) => v.parse().map_err(|_| {
                EngineError::ConnectionString(format!("invalid Cache Size {v:?}"))
            })?,
            None => DEFAULT_CACHE_SIZE,
        };
        let busy_timeout = match cs.get(&["Busy Timeout"]) {
            Some(v) => Some(Duration::from_millis(v.parse().map_err(|_| {
                EngineError::ConnectionString(format!("invalid Busy Timeout {v:?}"))
            })?)),
            None => None,
        };
        let foreign_keys = match cs.get(&["Foreign Keys"]) {
            Some(v) => Some(parse_bool_text(v).ok_or_else(|| {
                EngineError::ConnectionString(format!("invalid Foreign Keys {v:?}"))
            })?),
            None => None,
        };
        Ok(Self {
            path,
            cache_size,
            busy_timeout,
            foreign_keys,
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Engine adapter for SQLite. UUIDs are stored as text; columns declared
/// `UUID`/`GUID`/`UNIQUEIDENTIFIER` still validate bound text as a UUID.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl SqliteAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl EngineAdapter for SqliteAdapter {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn open(&self, conn_str: &str) -> EngineResult<Box<dyn NativeConnection>> {
        let settings = SqliteSettings::from_connection_string(conn_str)?;
        Ok(Box::new(SqliteConnection::open(&settings)?))
    }

    fn native_type_for_column(&self, column: &ColumnSchema) -> NativeType {
        native_type_for_type_name(&column.type_name, NativeType::Guid)
    }

    fn needs_reconnect(&self, _sql: &str, error: &EngineError) -> bool {
        match error {
            EngineError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::SchemaChanged
            ),
            EngineError::Io(_) => true,
            _ => false,
        }
    }
}

/// An open SQLite database.
pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    pub fn open(settings: &SqliteSettings) -> EngineResult<Self> {
        let conn = if settings.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(&settings.path);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(path)?
        };
        conn.set_prepared_statement_cache_capacity(settings.cache_size);
        if let Some(timeout) = settings.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if let Some(on) = settings.foreign_keys {
            conn.execute_batch(if on {
                "PRAGMA foreign_keys = ON;"
            } else {
                "PRAGMA foreign_keys = OFF;"
            })?;
        }
        debug!(path = %settings.path, "Opened SQLite connection");
        Ok(Self { conn })
    }
}

impl NativeConnection for SqliteConnection {
    fn execute_batch(&mut self, sql: &str) -> EngineResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> EngineResult<()> {
        self.conn.prepare_cached(sql)?;
        Ok(())
    }

    fn execute(&mut self, sql: &str, values: &[DbValue]) -> EngineResult<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let affected = stmt.execute(params_from_iter(values.iter().map(to_sqlite)))?;
        Ok(affected)
    }

    fn query(
        &mut self,
        sql: &str,
        values: &[DbValue],
        _single_row: bool,
        on_row: &mut dyn FnMut(&Row) -> bool,
    ) -> EngineResult<usize> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns: Arc<[String]> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(values.iter().map(to_sqlite)))?;
        let mut delivered = 0;
        while let Some(row) = rows.next()? {
            let mut row_values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                row_values.push(from_sqlite(row.get_ref(i)?));
            }
            delivered += 1;
            if !on_row(&Row::new(Arc::clone(&columns), row_values)) {
                break;
            }
        }
        Ok(delivered)
    }

    fn table_schema(&mut self, table: &str) -> EngineResult<TableSchema> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map([table], |row| {
                let name: String = row.get(0)?;
                let declared: String = row.get(1)?;
                let not_null: i64 = row.get(2)?;
                Ok(ColumnSchema::from_declared(name, &declared, not_null == 0))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(EngineError::UnknownTable(table.to_string()));
        }
        Ok(TableSchema::new(table, columns))
    }

    fn set_command_timeout(&mut self, timeout: Option<Duration>) -> EngineResult<()> {
        let timeout = timeout.unwrap_or(Duration::from_millis(i32::MAX as u64));
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }
}

fn to_sqlite(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Integer(i64::from(*b)),
        DbValue::Int(i) => Value::Integer(*i),
        DbValue::Float(f) => Value::Real(*f),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Blob(b) => Value::Blob(b.clone()),
        DbValue::Uuid(u) => Value::Text(u.hyphenated().to_string()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> DbValue {
    match value {
        ValueRef::Null => DbValue::Null,
        ValueRef::Integer(i) => DbValue::Int(i),
        ValueRef::Real(f) => DbValue::Float(f),
        ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
    }
}
