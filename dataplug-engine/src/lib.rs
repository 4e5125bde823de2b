//! Database engine layer for dataplug.
//!
//! Everything engine-specific sits behind two seams:
//!
//! - [`NativeConnection`]: an open connection that executes SQL, streams
//!   rows and reports table schemas
//! - [`EngineAdapter`]: how one engine opens connections, maps parameter
//!   types, encodes UUIDs and booleans, and reads migration versions
//!
//! Two engines ship here: SQLite (rusqlite) and DuckDB.

mod adapter;
mod codec;
mod conn_string;
mod dialect;
mod driver;
mod duckdb_adapter;
mod error;
mod placeholders;
mod schema;
mod sqlite_adapter;
mod types;

pub use adapter::{EngineAdapter, bind_value, default_native_type, native_type_for_type_name};
pub use codec::{
    UuidRepr, bool_to_storage, parse_bool_text, storage_to_bool, storage_to_uuid,
    storage_to_uuid_string, uuid_to_storage,
};
pub use conn_string::{ConnectionString, extract_param, parse_bool_option};
pub use dialect::{CatalogDialect, MIGRATIONS_TABLE, MigrationDialect, StandardDialect, read_version};
pub use driver::{NativeConnection, NativeStatement};
pub use duckdb_adapter::{DuckDbAdapter, DuckDbConnection, DuckDbSettings};
pub use error::{EngineError, EngineResult};
pub use placeholders::{param_names, rewrite_positional};
pub use schema::{ColumnSchema, TableSchema};
pub use sqlite_adapter::{SqliteAdapter, SqliteConnection, SqliteSettings};
pub use types::{DbValue, NativeParam, NativeType, ParamType, Row};
