#![allow(dead_code)]

use dataplug_engine::{
    DbValue, EngineAdapter, EngineError, EngineResult, NativeConnection, ParamType, Row,
    SqliteAdapter, TableSchema,
};
use dataplug_migrate::{DirectoryScripts, EmbeddedScripts, ScriptSource};
use dataplug_store::{
    CommandSpec, ConnectionManager, DataPlugin, PluginSettings, PreparedCommand, StoreResult,
};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("dataplug_store=debug"))
        .with_test_writer()
        .try_init();
}

pub fn sqlite_conn_str(dir: &Path, extra: &str) -> String {
    format!("Data Source={};{extra}", dir.join("store.db").display())
}

pub fn resources(engine: &str) -> Arc<dyn ScriptSource> {
    Arc::new(DirectoryScripts::new(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("resources")
            .join(engine),
    ))
}

pub fn counter_scripts() -> Arc<dyn ScriptSource> {
    Arc::new(EmbeddedScripts::new().with(
        "Counters.migrations",
        ":VERSION 1\nCREATE TABLE counters (name VARCHAR(32) PRIMARY KEY, hits INTEGER NOT NULL);\n",
    ))
}

// ── Fault injection ──────────────────────────────────────────────

/// Shared switches for [`FlakyAdapter`].
#[derive(Default)]
pub struct Faults {
    pub opens: AtomicUsize,
    /// Number of upcoming execute/query calls that fail before touching the
    /// database.
    pub fail_next: AtomicUsize,
    /// Fail the next query after its first row has been delivered.
    pub fail_after_first_row: AtomicBool,
}

impl Faults {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn injected() -> EngineError {
    EngineError::Driver("connection reset by peer".into())
}

/// SQLite adapter whose connections fail on demand. Every failure is
/// classified as worth a reconnect.
pub struct FlakyAdapter {
    inner: SqliteAdapter,
    faults: Arc<Faults>,
}

impl FlakyAdapter {
    pub fn new(faults: Arc<Faults>) -> Self {
        Self {
            inner: SqliteAdapter::new(),
            faults,
        }
    }
}

impl EngineAdapter for FlakyAdapter {
    fn name(&self) -> &str {
        "flaky-sqlite"
    }

    fn open(&self, conn_str: &str) -> EngineResult<Box<dyn NativeConnection>> {
        self.faults.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyConnection {
            inner: self.inner.open(conn_str)?,
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn NativeConnection>,
    faults: Arc<Faults>,
}

impl NativeConnection for FlakyConnection {
    fn execute_batch(&mut self, sql: &str) -> EngineResult<()> {
        self.inner.execute_batch(sql)
    }

    fn prepare(&mut self, sql: &str) -> EngineResult<()> {
        self.inner.prepare(sql)
    }

    fn execute(&mut self, sql: &str, values: &[DbValue]) -> EngineResult<usize> {
        if self.faults.take() {
            return Err(injected());
        }
        self.inner.execute(sql, values)
    }

    fn query(
        &mut self,
        sql: &str,
        values: &[DbValue],
        single_row: bool,
        on_row: &mut dyn FnMut(&Row) -> bool,
    ) -> EngineResult<usize> {
        if self.faults.take() {
            return Err(injected());
        }
        if self.faults.fail_after_first_row.swap(false, Ordering::SeqCst) {
            self.inner.query(sql, values, single_row, &mut |row: &Row| {
                on_row(row);
                false
            })?;
            return Err(injected());
        }
        self.inner.query(sql, values, single_row, on_row)
    }

    fn table_schema(&mut self, table: &str) -> EngineResult<TableSchema> {
        self.inner.table_schema(table)
    }
}

// ── Asset store fixture plugin ───────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
    pub asset_type: i8,
    pub local: bool,
    pub temporary: bool,
    pub creator_id: Uuid,
    pub data: Vec<u8>,
}

impl Asset {
    pub fn sample(name: &str, asset_type: i8) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            asset_type,
            local: asset_type % 2 == 0,
            temporary: false,
            creator_id: Uuid::new_v4(),
            data: name.as_bytes().to_vec(),
        }
    }
}

pub struct AssetStore {
    manager: ConnectionManager,
    delete: PreparedCommand,
    insert: PreparedCommand,
    fetch: PreparedCommand,
    by_type: PreparedCommand,
    count: PreparedCommand,
}

impl AssetStore {
    pub fn new(adapter: Arc<dyn EngineAdapter>, scripts: Arc<dyn ScriptSource>) -> StoreResult<Self> {
        let manager = ConnectionManager::new(
            adapter,
            PluginSettings::new("AssetStore", scripts).default_table("assets"),
        );
        Ok(Self {
            delete: manager.register(CommandSpec::new(
                "DELETE FROM assets WHERE id = @id",
                &[ParamType::Uuid],
            ))?,
            insert: manager.register(CommandSpec::new(
                "INSERT INTO assets (id, name, asset_type, local, temporary, creator_id, data) \
                 VALUES (@id, @name, @asset_type, @local, @temporary, @creator_id, @data)",
                &[
                    ParamType::Uuid,
                    ParamType::String,
                    ParamType::Int8,
                    ParamType::Bool,
                    ParamType::Bool,
                    ParamType::Uuid,
                    ParamType::Bytes,
                ],
            ))?,
            fetch: manager.register(CommandSpec::new(
                "SELECT id, name, asset_type, local, temporary, creator_id, data \
                 FROM assets WHERE id = @id",
                &[ParamType::Uuid],
            ))?,
            by_type: manager.register(CommandSpec::new(
                "SELECT id FROM assets WHERE asset_type = @asset_type ORDER BY name",
                &[ParamType::Int8],
            ))?,
            count: manager.register(CommandSpec::new("SELECT COUNT(*) AS n FROM assets", &[]))?,
            manager,
        })
    }

    pub fn store(&self, asset: &Asset) -> StoreResult<()> {
        self.delete.execute_for_effect(&[asset.id.into()])?;
        self.insert.execute_for_effect(&[
            asset.id.into(),
            asset.name.clone().into(),
            asset.asset_type.into(),
            asset.local.into(),
            asset.temporary.into(),
            asset.creator_id.into(),
            asset.data.clone().into(),
        ])?;
        Ok(())
    }

    pub fn fetch(&self, id: Uuid) -> StoreResult<Option<Asset>> {
        let adapter = self.manager.adapter();
        let Some(row) = self.fetch.query_one(&[id.into()])? else {
            return Ok(None);
        };
        let value = |name: &str| row.value(name).cloned().unwrap_or(DbValue::Null);
        Ok(Some(Asset {
            id: adapter.storage_to_uuid(&value("id"))?,
            name: row.text("name").unwrap_or_default().to_string(),
            asset_type: row.int("asset_type").unwrap_or_default() as i8,
            local: adapter.storage_to_bool(&value("local"))?,
            temporary: adapter.storage_to_bool(&value("temporary"))?,
            creator_id: adapter.storage_to_uuid(&value("creator_id"))?,
            data: row.blob("data").unwrap_or_default().to_vec(),
        }))
    }

    pub fn ids_of_type(&self, asset_type: i8) -> StoreResult<Vec<Uuid>> {
        let adapter = self.manager.adapter();
        let mut ids = Vec::new();
        let mut decode_error = None;
        self.by_type
            .execute_for_rows(&[asset_type.into()], false, |row| {
                match adapter.storage_to_uuid(row.value("id").unwrap_or(&DbValue::Null)) {
                    Ok(id) => {
                        ids.push(id);
                        true
                    }
                    Err(e) => {
                        decode_error = Some(e);
                        false
                    }
                }
            })?;
        match decode_error {
            Some(e) => Err(e.into()),
            None => Ok(ids),
        }
    }

    pub fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.delete.execute_for_effect(&[id.into()])? > 0)
    }

    pub fn count(&self) -> StoreResult<i64> {
        Ok(self
            .count
            .query_one(&[])?
            .and_then(|row| row.int("n"))
            .unwrap_or_default())
    }

    pub fn commands(&self) -> [&PreparedCommand; 5] {
        [&self.delete, &self.insert, &self.fetch, &self.by_type, &self.count]
    }
}

impl DataPlugin for AssetStore {
    fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}
