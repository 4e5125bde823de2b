//! Connection manager shared by every prepared command of one plugin.
//!
//! A single mutex guards the native connection, the schema cache and every
//! command's native statement, so one manager serialises all native calls.
//! Row callbacks run while that lock is held and must not call back into
//! the same manager.

use crate::command::{CommandSpec, CommandTemplate, PreparedCommand};
use crate::error::{StoreError, StoreResult};
use crate::options::ConnectionOptions;
use dataplug_engine::{
    DbValue, EngineAdapter, EngineError, EngineResult, NativeConnection, NativeStatement,
    TableSchema,
};
use dataplug_migrate::{Migration, MigrationReport, ScriptSource};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Static description of a plugin.
#[derive(Clone)]
pub struct PluginSettings {
    pub name: String,
    /// Logical store name used for migrations.
    pub migration_store: String,
    /// Table every command is bound to unless it names its own.
    pub default_table: Option<String>,
    pub scripts: Arc<dyn ScriptSource>,
}

impl PluginSettings {
    pub fn new(name: impl Into<String>, scripts: Arc<dyn ScriptSource>) -> Self {
        let name = name.into();
        Self {
            migration_store: name.clone(),
            name,
            default_table: None,
            scripts,
        }
    }

    pub fn migration_store(mut self, store: impl Into<String>) -> Self {
        self.migration_store = store.into();
        self
    }

    pub fn default_table(mut self, table: impl Into<String>) -> Self {
        self.default_table = Some(table.into());
        self
    }
}

/// A failed attempt, and whether it may be retried on a fresh connection.
pub(crate) struct Failure {
    pub(crate) error: EngineError,
    pub(crate) retryable: bool,
}

impl Failure {
    pub(crate) fn retryable(error: EngineError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

struct CommandSlot {
    template: Arc<CommandTemplate>,
    table: Option<String>,
    handle: Option<NativeStatement>,
}

struct State {
    conn_str: String,
    keep_alive: bool,
    initialised: bool,
    conn: Option<Box<dyn NativeConnection>>,
    schemas: HashMap<String, Arc<TableSchema>>,
    commands: Vec<CommandSlot>,
}

impl State {
    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn open(&mut self, adapter: &dyn EngineAdapter) -> StoreResult<()> {
        if self.conn.is_none() {
            self.conn = Some(adapter.open(&self.conn_str)?);
            debug!(engine = adapter.name(), "Connection opened");
        }
        Ok(())
    }

    /// Release every command handle, the schema cache and the connection.
    fn close(&mut self) {
        for slot in &mut self.commands {
            slot.handle = None;
        }
        self.schemas.clear();
        if self.conn.take().is_some() {
            debug!("Connection closed");
        }
    }

    fn conn_mut(&mut self) -> StoreResult<&mut (dyn NativeConnection + 'static)> {
        match self.conn.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(StoreError::Internal("connection is not open".into())),
        }
    }

    fn slot(&self, id: usize) -> StoreResult<&CommandSlot> {
        self.commands
            .get(id)
            .ok_or_else(|| StoreError::Internal(format!("unknown command {id}")))
    }

    fn slot_mut(&mut self, id: usize) -> StoreResult<&mut CommandSlot> {
        self.commands
            .get_mut(id)
            .ok_or_else(|| StoreError::Internal(format!("unknown command {id}")))
    }

    fn table_schema(&mut self, table: &str) -> StoreResult<Arc<TableSchema>> {
        if let Some(schema) = self.schemas.get(table) {
            return Ok(Arc::clone(schema));
        }
        let Some(conn) = self.conn.as_deref_mut() else {
            return Err(StoreError::Schema {
                table: table.to_string(),
            });
        };
        let schema = Arc::new(conn.table_schema(table)?);
        debug!(table, columns = schema.len(), "Cached table schema");
        self.schemas.insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Open the connection if needed and build the command's native
    /// statement if it has none.
    fn connect_command(&mut self, adapter: &dyn EngineAdapter, id: usize) -> StoreResult<()> {
        self.open(adapter)?;
        let slot = self.slot(id)?;
        if slot.handle.is_some() {
            return Ok(());
        }
        let template = Arc::clone(&slot.template);
        let table = slot.table.clone();

        let schema = match table {
            Some(table) => Some(self.table_schema(&table)?),
            None => None,
        };
        let params = template
            .names
            .iter()
            .zip(&template.types)
            .map(|(name, declared)| {
                let column = schema.as_deref().and_then(|s| s.column(name));
                adapter.build_parameter(name, *declared, column)
            })
            .collect();
        let sql = adapter.native_sql(&template.sql, &template.names);
        self.conn_mut()?.prepare(&sql)?;
        self.slot_mut(id)?.handle = Some(NativeStatement::new(sql, params));
        Ok(())
    }

    /// Convert and store `values` on the command's native statement.
    fn bind_values(
        &mut self,
        adapter: &dyn EngineAdapter,
        id: usize,
        values: &[DbValue],
    ) -> StoreResult<()> {
        let slot = self.slot_mut(id)?;
        let Some(handle) = slot.handle.as_mut() else {
            return Err(StoreError::Internal("command is not prepared".into()));
        };
        if values.len() != handle.params().len() {
            return Err(StoreError::Configuration(format!(
                "command expects {} parameters, got {}: {}",
                handle.params().len(),
                values.len(),
                slot.template.sql
            )));
        }
        let bound = handle
            .params()
            .iter()
            .zip(values)
            .map(|(param, value)| adapter.set_parameter_value(param, value.clone()))
            .collect::<EngineResult<Vec<_>>>()?;
        handle.set_values(bound);
        Ok(())
    }

    fn attempt<T>(
        &mut self,
        id: usize,
        op: &mut dyn FnMut(&mut dyn NativeConnection, &NativeStatement) -> Result<T, Failure>,
    ) -> StoreResult<Result<T, Failure>> {
        let State { conn, commands, .. } = self;
        let Some(conn) = conn.as_deref_mut() else {
            return Err(StoreError::Internal("connection is not open".into()));
        };
        let Some(handle) = commands.get(id).and_then(|slot| slot.handle.as_ref()) else {
            return Err(StoreError::Internal("command is not prepared".into()));
        };
        Ok(op(conn, handle))
    }
}

pub(crate) struct Shared {
    adapter: Arc<dyn EngineAdapter>,
    settings: PluginSettings,
    state: Mutex<State>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!(plugin = %self.settings.name, "Recovering poisoned connection lock");
            poisoned.into_inner()
        })
    }

    /// Honour keep-alive after a public call; always close after an error.
    fn finish<T>(&self, state: &mut State, result: StoreResult<T>) -> StoreResult<T> {
        match &result {
            Ok(_) if state.keep_alive => {}
            Ok(_) => state.close(),
            Err(e) => {
                debug!(plugin = %self.settings.name, error = %e, "Closing connection after error");
                state.close();
            }
        }
        result
    }

    pub(crate) fn command_table(&self, id: usize) -> Option<String> {
        self.lock_state().slot(id).ok().and_then(|s| s.table.clone())
    }

    pub(crate) fn command_prepared(&self, id: usize) -> bool {
        self.lock_state()
            .slot(id)
            .is_ok_and(|s| s.handle.is_some())
    }

    pub(crate) fn connect_command(&self, id: usize) -> StoreResult<()> {
        let mut state = self.lock_state();
        let result = state.connect_command(self.adapter.as_ref(), id);
        if result.is_err() {
            state.close();
        }
        result
    }

    pub(crate) fn disconnect_command(&self, id: usize) {
        if let Ok(slot) = self.lock_state().slot_mut(id) {
            slot.handle = None;
        }
    }

    /// Connect, bind, run `op`; on a retryable failure of an already-open
    /// connection, reconnect, rebind and run it exactly once more.
    pub(crate) fn execute<T>(
        &self,
        id: usize,
        values: &[DbValue],
        op: &mut dyn FnMut(&mut dyn NativeConnection, &NativeStatement) -> Result<T, Failure>,
    ) -> StoreResult<T> {
        let mut state = self.lock_state();
        let result = self.execute_locked(&mut state, id, values, op);
        self.finish(&mut state, result)
    }

    fn execute_locked<T>(
        &self,
        state: &mut State,
        id: usize,
        values: &[DbValue],
        op: &mut dyn FnMut(&mut dyn NativeConnection, &NativeStatement) -> Result<T, Failure>,
    ) -> StoreResult<T> {
        let adapter = self.adapter.as_ref();
        let was_open = state.is_open();

        state.connect_command(adapter, id)?;
        state.bind_values(adapter, id, values)?;
        let failure = match state.attempt(id, op)? {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        let sql = state.slot(id)?.template.sql.clone();
        if !(was_open && failure.retryable && adapter.needs_reconnect(&sql, &failure.error)) {
            return Err(failure.error.into());
        }

        warn!(
            plugin = %self.settings.name,
            error = %failure.error,
            "Command failed on an open connection, reconnecting"
        );
        state.close();
        state.connect_command(adapter, id)?;
        state.bind_values(adapter, id, values)?;
        match state.attempt(id, op)? {
            Ok(value) => {
                info!(plugin = %self.settings.name, "Command succeeded after reconnect");
                Ok(value)
            }
            Err(retry) if adapter.needs_reconnect(&sql, &retry.error) => {
                Err(StoreError::TransientConnection(retry.error))
            }
            Err(retry) => Err(retry.error.into()),
        }
    }
}

/// Owns one plugin's native connection, schema cache and command handles.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(adapter: Arc<dyn EngineAdapter>, settings: PluginSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                adapter,
                settings,
                state: Mutex::new(State {
                    conn_str: String::new(),
                    keep_alive: true,
                    initialised: false,
                    conn: None,
                    schemas: HashMap::new(),
                    commands: Vec::new(),
                }),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.settings.name
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.shared.settings
    }

    /// Engine adapter, for UUID and boolean storage conversions.
    pub fn adapter(&self) -> &dyn EngineAdapter {
        self.shared.adapter.as_ref()
    }

    /// Register a command. Fails before touching the database when the
    /// declared types do not match the command's parameters.
    pub fn register(&self, spec: CommandSpec) -> StoreResult<PreparedCommand> {
        let template = Arc::new(CommandTemplate::parse(spec)?);
        let mut state = self.shared.lock_state();
        let table = if state.initialised {
            self.resolve_table(&template)
        } else {
            None
        };
        let id = state.commands.len();
        state.commands.push(CommandSlot {
            template: Arc::clone(&template),
            table,
            handle: None,
        });
        Ok(PreparedCommand::new(Arc::clone(&self.shared), id, template))
    }

    fn resolve_table(&self, template: &CommandTemplate) -> Option<String> {
        template
            .table
            .clone()
            .or_else(|| self.shared.settings.default_table.clone())
    }

    /// Apply connection options, bring the store schema up to date on a
    /// transient connection, then bind commands to their tables.
    pub fn initialise(&self, connection_string: &str) -> StoreResult<MigrationReport> {
        let options = ConnectionOptions::parse(connection_string);
        let settings = &self.shared.settings;
        let adapter = self.shared.adapter.as_ref();

        let mut state = self.shared.lock_state();
        state.close();
        state.keep_alive = options.keep_alive;
        state.conn_str = options.connection_string.clone();

        let report = {
            let mut conn = adapter.open(&options.connection_string)?;
            let mut migration = Migration::initialize(
                conn.as_mut(),
                settings.scripts.as_ref(),
                settings.migration_store.clone(),
                adapter.select_migration_dialect(),
            )?;
            migration.update()?
        };

        for slot in &mut state.commands {
            slot.table = slot
                .template
                .table
                .clone()
                .or_else(|| settings.default_table.clone());
        }
        state.initialised = true;

        info!(
            plugin = %settings.name,
            engine = adapter.name(),
            store = %report.store,
            version = report.to,
            keep_alive = options.keep_alive,
            "Data plugin initialised"
        );
        Ok(report)
    }

    pub fn connect(&self) -> StoreResult<()> {
        let mut state = self.shared.lock_state();
        let result = state.open(self.shared.adapter.as_ref());
        if result.is_err() {
            state.close();
        }
        result
    }

    /// Release every command handle, then the connection. Safe when closed.
    pub fn disconnect(&self) {
        self.shared.lock_state().close();
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock_state().is_open()
    }

    pub fn keep_alive(&self) -> bool {
        self.shared.lock_state().keep_alive
    }

    /// Turning keep-alive off closes the connection now.
    pub fn set_keep_alive(&self, keep_alive: bool) {
        let mut state = self.shared.lock_state();
        state.keep_alive = keep_alive;
        if !keep_alive {
            state.close();
        }
    }

    /// Cached column metadata for `table`. The connection must be open.
    pub fn table_schema(&self, table: &str) -> StoreResult<Arc<TableSchema>> {
        self.shared.lock_state().table_schema(table)
    }

    /// Run raw SQL without parameters, honouring keep-alive.
    pub fn exec_sql(&self, sql: &str) -> StoreResult<()> {
        let mut state = self.shared.lock_state();
        let result = state.open(self.shared.adapter.as_ref()).and_then(|()| {
            state.conn_mut()?.execute_batch(sql)?;
            Ok(())
        });
        self.shared.finish(&mut state, result)
    }

    /// Snapshot of connection state for diagnostics.
    pub fn diagnostics(&self) -> serde_json::Value {
        let state = self.shared.lock_state();
        let mut cached: Vec<&String> = state.schemas.keys().collect();
        cached.sort();
        serde_json::json!({
            "plugin": self.shared.settings.name,
            "engine": self.shared.adapter.name(),
            "store": self.shared.settings.migration_store,
            "open": state.is_open(),
            "keep_alive": state.keep_alive,
            "initialised": state.initialised,
            "cached_schemas": cached,
            "commands": state.commands.iter().map(|slot| serde_json::json!({
                "sql": slot.template.sql,
                "table": slot.table,
                "prepared": slot.handle.is_some(),
            })).collect::<Vec<_>>(),
        })
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("plugin", &self.shared.settings.name)
            .field("engine", &self.shared.adapter.name())
            .finish()
    }
}
