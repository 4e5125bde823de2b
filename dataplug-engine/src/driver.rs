//! The native connection seam every engine implements.

use crate::error::EngineResult;
use crate::schema::TableSchema;
use crate::types::{DbValue, NativeParam, Row};
use std::time::Duration;

/// An open connection to one database engine.
///
/// Parameters are bound positionally: `values[k]` belongs to the k-th
/// distinct parameter of the command.
pub trait NativeConnection: Send {
    /// Run one or more statements without parameters.
    fn execute_batch(&mut self, sql: &str) -> EngineResult<()>;

    /// Compile `sql` into the connection's statement cache.
    fn prepare(&mut self, sql: &str) -> EngineResult<()>;

    /// Execute a statement for its side effect and return the number of
    /// affected rows as reported by the engine.
    fn execute(&mut self, sql: &str, values: &[DbValue]) -> EngineResult<usize>;

    /// Stream result rows to `on_row` until it returns `false` or the rows
    /// run out. Returns the number of rows delivered.
    fn query(
        &mut self,
        sql: &str,
        values: &[DbValue],
        single_row: bool,
        on_row: &mut dyn FnMut(&Row) -> bool,
    ) -> EngineResult<usize>;

    /// Column metadata for `table`, or `UnknownTable` when it does not exist.
    fn table_schema(&mut self, table: &str) -> EngineResult<TableSchema>;

    /// `None` removes the limit.
    fn set_command_timeout(&mut self, timeout: Option<Duration>) -> EngineResult<()> {
        let _ = timeout;
        Ok(())
    }
}

/// A prepared command handle: native SQL, native parameter descriptors and
/// the most recently bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeStatement {
    sql: String,
    params: Vec<NativeParam>,
    values: Vec<DbValue>,
}

impl NativeStatement {
    pub fn new(sql: String, params: Vec<NativeParam>) -> Self {
        let values = vec![DbValue::Null; params.len()];
        Self {
            sql,
            params,
            values,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[NativeParam] {
        &self.params
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    pub fn set_values(&mut self, values: Vec<DbValue>) {
        self.values = values;
    }
}
