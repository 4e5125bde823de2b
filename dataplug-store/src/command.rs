//! Named-parameter commands registered by a plugin.

use crate::error::{StoreError, StoreResult};
use crate::manager::{Failure, Shared};
use dataplug_engine::{DbValue, NativeConnection, NativeStatement, ParamType, Row, param_names};
use std::sync::Arc;

/// What a plugin registers: command text, declared parameter types and an
/// optional table whose live schema drives parameter types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub(crate) sql: String,
    pub(crate) types: Vec<ParamType>,
    pub(crate) table: Option<String>,
}

impl CommandSpec {
    pub fn new(sql: impl Into<String>, types: &[ParamType]) -> Self {
        Self {
            sql: sql.into(),
            types: types.to_vec(),
            table: None,
        }
    }

    /// Bind this command to a table, overriding the plugin default.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }
}

/// Validated command text with its distinct parameter names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    pub sql: String,
    pub names: Vec<String>,
    pub types: Vec<ParamType>,
    pub table: Option<String>,
}

impl CommandTemplate {
    /// Extract `@name` markers and check them against the declared types.
    pub fn parse(spec: CommandSpec) -> StoreResult<Self> {
        let names = param_names(&spec.sql);
        if names.len() != spec.types.len() {
            return Err(StoreError::Configuration(format!(
                "command declares {} parameter types but uses {} parameters ({}): {}",
                spec.types.len(),
                names.len(),
                names.join(", "),
                spec.sql
            )));
        }
        Ok(Self {
            sql: spec.sql,
            names,
            types: spec.types,
            table: spec.table,
        })
    }
}

/// A long-lived command handle. Its native statement is rebuilt whenever
/// the owning connection is reopened.
#[derive(Clone)]
pub struct PreparedCommand {
    shared: Arc<Shared>,
    id: usize,
    template: Arc<CommandTemplate>,
}

impl std::fmt::Debug for PreparedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCommand")
            .field("id", &self.id)
            .field("sql", &self.template.sql)
            .finish()
    }
}

impl PreparedCommand {
    pub(crate) fn new(shared: Arc<Shared>, id: usize, template: Arc<CommandTemplate>) -> Self {
        Self {
            shared,
            id,
            template,
        }
    }

    pub fn sql(&self) -> &str {
        &self.template.sql
    }

    pub fn param_names(&self) -> &[String] {
        &self.template.names
    }

    pub fn param_types(&self) -> &[ParamType] {
        &self.template.types
    }

    /// Table this command is bound to after initialisation.
    pub fn table(&self) -> Option<String> {
        self.shared.command_table(self.id)
    }

    pub fn is_prepared(&self) -> bool {
        self.shared.command_prepared(self.id)
    }

    /// Open the owning connection if needed and prepare the native statement.
    pub fn connect(&self) -> StoreResult<()> {
        self.shared.connect_command(self.id)
    }

    /// Release the native statement only.
    pub fn disconnect(&self) {
        self.shared.disconnect_command(self.id);
    }

    /// Execute for side effects. Returns the affected row count reported by
    /// the engine.
    pub fn execute_for_effect(&self, values: &[DbValue]) -> StoreResult<usize> {
        self.shared
            .execute(self.id, values, &mut |conn: &mut dyn NativeConnection, stmt: &NativeStatement| {
                conn.execute(stmt.sql(), stmt.values())
                    .map_err(Failure::retryable)
            })
    }

    /// Stream rows to `on_row` until it returns `false`. Returns the number
    /// of rows delivered. A failed attempt is only retried when no row had
    /// been delivered yet.
    pub fn execute_for_rows<F>(
        &self,
        values: &[DbValue],
        single_row: bool,
        mut on_row: F,
    ) -> StoreResult<usize>
    where
        F: FnMut(&Row) -> bool,
    {
        self.shared
            .execute(self.id, values, &mut |conn: &mut dyn NativeConnection, stmt: &NativeStatement| {
                let mut delivered = 0usize;
                let result = conn.query(stmt.sql(), stmt.values(), single_row, &mut |row: &Row| {
                    delivered += 1;
                    on_row(row)
                });
                result.map_err(|error| Failure {
                    error,
                    retryable: delivered == 0,
                })
            })
    }

    /// Collect every row. Convenience over [`Self::execute_for_rows`].
    pub fn query_all(&self, values: &[DbValue]) -> StoreResult<Vec<Row>> {
        let mut rows = Vec::new();
        self.execute_for_rows(values, false, |row| {
            rows.push(row.clone());
            true
        })?;
        Ok(rows)
    }

    /// First row, if any.
    pub fn query_one(&self, values: &[DbValue]) -> StoreResult<Option<Row>> {
        let mut first = None;
        self.execute_for_rows(values, true, |row| {
            first = Some(row.clone());
            false
        })?;
        Ok(first)
    }
}
