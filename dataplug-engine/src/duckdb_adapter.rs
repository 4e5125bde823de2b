//! DuckDB engine.
//!
//! Recognised connection-string keys:
//!
//! - `Data Source` (aliases `DataSource`, `Database`): database path or
//!   `:memory:`
//! - `Memory Limit`: DuckDB memory cap (default `256MB`)
//! - `Threads`: worker threads (default 2)

use crate::adapter::{EngineAdapter, native_type_for_type_name};
use crate::codec::UuidRepr;
use crate::conn_string::ConnectionString;
use crate::dialect::{CatalogDialect, MigrationDialect};
use crate::driver::NativeConnection;
use crate::error::{EngineError, EngineResult};
use crate::placeholders::rewrite_positional;
use crate::schema::{ColumnSchema, TableSchema};
use crate::types::{DbValue, NativeType, Row};
use duckdb::types::{Value, ValueRef};
use duckdb::{Connection, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MEMORY_LIMIT: &str = "256MB";
const DEFAULT_THREADS: u32 = 2;

/// Settings parsed from a DuckDB connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuckDbSettings {
    pub path: String,
    pub memory_limit: String,
    pub threads: u32,
}

impl DuckDbSettings {
    pub fn from_connection_string(conn_str: &str) -> EngineResult<Self> {
        let cs = ConnectionString::parse(conn_str);
        let path = cs
            .get(&["Data Source", "Database"])
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::ConnectionString(format!("missing Data Source in {conn_str:?}"))
            })?;
        let memory_limit = cs
            .get(&["Memory Limit"])
            .unwrap_or(DEFAULT_MEMORY_LIMIT)
            .to_string();
        if !memory_limit.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
            return Err(EngineError::ConnectionString(format!(
                "invalid Memory Limit {memory_limit:?}"
            )));
        }
        let threads = match cs.get(&["Threads"]) {
            Some(v) => v
                .parse()
                .map_err(|_| EngineError::ConnectionString(format!("invalid Threads {v:?}")))?,
            None => DEFAULT_THREADS,
        };
        Ok(Self {
            path,
            memory_limit,
            threads,
        })
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

/// Engine adapter for DuckDB. UUIDs use the native `UUID` type and commands
/// are rewritten to `$n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbAdapter;

impl DuckDbAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl EngineAdapter for DuckDbAdapter {
    fn name(&self) -> &str {
        "duckdb"
    }

    fn open(&self, conn_str: &str) -> EngineResult<Box<dyn NativeConnection>> {
        let settings = DuckDbSettings::from_connection_string(conn_str)?;
        Ok(Box::new(DuckDbConnection::open(&settings)?))
    }

    fn needs_reconnect(&self, _sql: &str, error: &EngineError) -> bool {
        match error {
            EngineError::DuckDb(e) => {
                let msg = e.to_string().to_lowercase();
                msg.contains("connection")
                    || msg.contains("io error")
                    || msg.contains("invalidated")
                    || msg.contains("closed")
            }
            EngineError::Io(_) => true,
            _ => false,
        }
    }

    fn native_sql(&self, sql: &str, names: &[String]) -> String {
        rewrite_positional(sql, names, "$")
    }

    fn native_type_for_column(&self, column: &ColumnSchema) -> NativeType {
        native_type_for_type_name(&column.type_name, NativeType::Guid)
    }

    fn uuid_native_type(&self) -> NativeType {
        NativeType::Guid
    }

    fn uuid_repr(&self) -> UuidRepr {
        UuidRepr::Guid
    }

    fn select_migration_dialect(&self) -> Box<dyn MigrationDialect> {
        Box::new(CatalogDialect)
    }
}

/// An open DuckDB database.
pub struct DuckDbConnection {
    conn: Connection,
}

impl DuckDbConnection {
    /// Open the configured database and apply its resource limits.
    ///
    /// A file database that fails to open is retried once after removing a
    /// stale `<file>.wal` left behind by an unclean shutdown.
    pub fn open(settings: &DuckDbSettings) -> EngineResult<Self> {
        let conn = if settings.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(&settings.path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Self::open_file(path)?
        };
        conn.execute_batch(&format!(
            "PRAGMA memory_limit='{}'; PRAGMA threads={};",
            settings.memory_limit, settings.threads
        ))?;
        debug!(
            path = %settings.path,
            memory_limit = %settings.memory_limit,
            threads = settings.threads,
            "Opened DuckDB connection"
        );
        Ok(Self { conn })
    }

    fn open_file(path: &Path) -> EngineResult<Connection> {
        let error = match Connection::open(path) {
            Ok(conn) => return Ok(conn),
            Err(e) => e,
        };
        let mut wal = path.as_os_str().to_owned();
        wal.push(".wal");
        let wal = PathBuf::from(wal);
        if !wal.is_file() {
            return Err(error.into());
        }
        warn!(wal = %wal.display(), %error, "Removing stale DuckDB WAL and reopening");
        std::fs::remove_file(&wal)?;
        Ok(Connection::open(path)?)
    }
}

impl NativeConnection for DuckDbConnection {
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
        let affected = stmt.execute(params_from_iter(values.iter().map(to_duckdb)))?;
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
        let mut rows = stmt.query(params_from_iter(values.iter().map(to_duckdb)))?;
        // Column metadata is only available once the statement has run.
        let columns: Arc<[String]> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default()
            .into_iter()
            .collect();
        let mut delivered = 0;
        while let Some(row) = rows.next()? {
            let mut row_values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                row_values.push(read_value(row, i)?);
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
            "SELECT column_name, data_type, character_maximum_length, numeric_precision, \
             numeric_scale, is_nullable \
             FROM information_schema.columns \
             WHERE lower(table_name) = lower(?) \
             ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map([table], |row| {
                let name: String = row.get(0)?;
                let data_type: String = row.get(1)?;
                let size: Option<i64> = row.get(2)?;
                let precision: Option<i64> = row.get(3)?;
                let scale: Option<i64> = row.get(4)?;
                let nullable: String = row.get(5)?;
                Ok(ColumnSchema::from_catalog(
                    name,
                    &data_type,
                    size,
                    precision,
                    scale,
                    nullable.eq_ignore_ascii_case("YES"),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(EngineError::UnknownTable(table.to_string()));
        }
        Ok(TableSchema::new(table, columns))
    }
}

fn to_duckdb(value: &DbValue) -> Value {
    match value {
        DbValue::Null => Value::Null,
        DbValue::Bool(b) => Value::Boolean(*b),
        DbValue::Int(i) => Value::BigInt(*i),
        DbValue::Float(f) => Value::Double(*f),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Blob(b) => Value::Blob(b.clone()),
        DbValue::Uuid(u) => Value::Text(u.hyphenated().to_string()),
    }
}

fn read_value(row: &duckdb::Row<'_>, idx: usize) -> EngineResult<DbValue> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null => DbValue::Null,
        ValueRef::Boolean(b) => DbValue::Bool(b),
        ValueRef::TinyInt(i) => DbValue::Int(i64::from(i)),
        ValueRef::SmallInt(i) => DbValue::Int(i64::from(i)),
        ValueRef::Int(i) => DbValue::Int(i64::from(i)),
        ValueRef::BigInt(i) => DbValue::Int(i),
        ValueRef::UTinyInt(i) => DbValue::Int(i64::from(i)),
        ValueRef::USmallInt(i) => DbValue::Int(i64::from(i)),
        ValueRef::UInt(i) => DbValue::Int(i64::from(i)),
        ValueRef::UBigInt(i) => match i64::try_from(i) {
            Ok(v) => DbValue::Int(v),
            Err(_) => DbValue::Text(i.to_string()),
        },
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => DbValue::Int(v),
            Err(_) => DbValue::Text(i.to_string()),
        },
        ValueRef::Float(f) => DbValue::Float(f64::from(f)),
        ValueRef::Double(f) => DbValue::Float(f),
        ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
        // Decimals, temporals and nested types: best-effort text or float.
        _ => {
            if let Ok(v) = row.get::<_, String>(idx) {
                DbValue::Text(v)
            } else if let Ok(v) = row.get::<_, f64>(idx) {
                DbValue::Float(v)
            } else {
                DbValue::Null
            }
        }
    };
    Ok(value)
}
